//! Pipeline composition
//!
//! What this module provides
//! - Tower middleware assembling the pipeline every outbound provider
//!   call traverses: admission (reject early) → cache (return on hit) →
//!   execute (bounded retry/timeout) → provider service
//!
//! Exports
//! - Models
//!   - `ProviderRequest { service, operation, payload, client_key, cost_points }`
//!   - `ProviderResponse { payload }`
//! - Layers
//!   - `AdmissionLayer` (per-client windowed budget gate)
//!   - `CacheLayer` (content-keyed memoization, hit short-circuits)
//!   - `ExecuteLayer` (retry/timeout contract around the inner call)
//!
//! Composition
//! - `ServiceBuilder::new().layer(AdmissionLayer::new(gate)).layer(CacheLayer::new(cache)).layer(ExecuteLayer::new(policy)).service(provider)`
//!
//! Testing strategy
//! - Fake providers via `tower::service_fn` erroring in scripted patterns;
//!   assert attempt counts, cache hits, and denial shapes

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tower::{Layer, Service, ServiceExt};

use crate::admission::AdmissionController;
use crate::cache::{CacheKey, ResultCache};
use crate::error::{InvokeError, Result};
use crate::executor::{execute, RetryPolicy};

/// One call to an external provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Named external dependency, e.g. "image-gen"
    pub service: String,
    /// Operation within that dependency, e.g. "generate"
    pub operation: String,
    /// Semantically relevant call inputs; feeds the cache key
    pub payload: Value,
    /// Client identity charged for the call
    pub client_key: String,
    /// Admission budget weight for this endpoint
    pub cost_points: u32,
}

impl ProviderRequest {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            payload,
            client_key: "anonymous".to_string(),
            cost_points: 1,
        }
    }

    pub fn with_client_key(mut self, client_key: impl Into<String>) -> Self {
        self.client_key = client_key.into();
        self
    }

    pub fn with_cost_points(mut self, cost_points: u32) -> Self {
        self.cost_points = cost_points;
        self
    }

    /// Content-derived cache key; client identity and cost are incidental
    /// and deliberately excluded.
    pub fn cache_key(&self) -> String {
        CacheKey::for_operation(&self.service, &self.operation)
            .payload(&self.payload)
            .finish()
    }
}

/// Result of a provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub payload: Value,
}

type BoxedResultFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

// ===== Admission =====

/// Layer placing the admission gate first in the stack: an over-budget
/// client is denied before any inner work runs.
pub struct AdmissionLayer {
    controller: Arc<AdmissionController>,
}

impl AdmissionLayer {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self { controller }
    }
}

pub struct Admission<S> {
    inner: S,
    controller: Arc<AdmissionController>,
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = Admission<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Admission {
            inner,
            controller: self.controller.clone(),
        }
    }
}

impl<S> Service<ProviderRequest> for Admission<S>
where
    S: Service<ProviderRequest, Response = ProviderResponse, Error = InvokeError>
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = ProviderResponse;
    type Error = InvokeError;
    type Future = BoxedResultFuture;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ProviderRequest) -> Self::Future {
        if let Err(denied) = self.controller.check(&req.client_key, req.cost_points) {
            return Box::pin(async move { Err(denied) });
        }
        let fut = self.inner.call(req);
        Box::pin(fut)
    }
}

// ===== Cache =====

/// Layer memoizing successful responses by content-derived key. A hit
/// short-circuits; a miss forwards and populates with the cache's default
/// TTL. Concurrent misses on one key are not coalesced.
pub struct CacheLayer {
    cache: ResultCache,
}

impl CacheLayer {
    pub fn new(cache: ResultCache) -> Self {
        Self { cache }
    }
}

pub struct Cached<S> {
    inner: Arc<Mutex<S>>,
    cache: ResultCache,
}

impl<S> Layer<S> for CacheLayer {
    type Service = Cached<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Cached {
            inner: Arc::new(Mutex::new(inner)),
            cache: self.cache.clone(),
        }
    }
}

impl<S> Service<ProviderRequest> for Cached<S>
where
    S: Service<ProviderRequest, Response = ProviderResponse, Error = InvokeError>
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = ProviderResponse;
    type Error = InvokeError;
    type Future = BoxedResultFuture;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ProviderRequest) -> Self::Future {
        let inner = self.inner.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let key = req.cache_key();
            if let Some(hit) = cache.get(&key).await {
                return Ok(ProviderResponse { payload: hit });
            }
            let resp = {
                let mut guard = inner.lock().await;
                ServiceExt::ready(&mut *guard).await?.call(req).await?
            };
            cache.set_default(&key, resp.payload.clone()).await;
            Ok(resp)
        })
    }
}

// ===== Execute =====

/// Layer applying the retry/timeout execution contract to the inner
/// provider call. Requests are cloned per attempt for reissue.
pub struct ExecuteLayer {
    policy: RetryPolicy,
}

impl ExecuteLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

pub struct Execute<S> {
    inner: Arc<Mutex<S>>,
    policy: RetryPolicy,
}

impl<S> Layer<S> for ExecuteLayer {
    type Service = Execute<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Execute {
            inner: Arc::new(Mutex::new(inner)),
            policy: self.policy,
        }
    }
}

impl<S> Service<ProviderRequest> for Execute<S>
where
    S: Service<ProviderRequest, Response = ProviderResponse, Error = InvokeError>
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = ProviderResponse;
    type Error = InvokeError;
    type Future = BoxedResultFuture;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ProviderRequest) -> Self::Future {
        let inner = self.inner.clone();
        let policy = self.policy;
        Box::pin(async move {
            let service = req.service.clone();
            execute(&service, &policy, || {
                let inner = inner.clone();
                let req = req.clone();
                async move {
                    let mut guard = inner.lock().await;
                    ServiceExt::ready(&mut *guard).await?.call(req).await
                }
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionPolicy;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;
    use tower::service_fn;

    #[tokio::test]
    async fn admission_layer_denies_over_budget_clients() {
        let gate = Arc::new(AdmissionController::new(AdmissionPolicy::new(
            Duration::from_secs(60),
            2,
        )));
        let provider = service_fn(|req: ProviderRequest| async move {
            Ok::<_, InvokeError>(ProviderResponse {
                payload: req.payload,
            })
        });
        let mut svc = AdmissionLayer::new(gate).layer(provider);

        for _ in 0..2 {
            let req = ProviderRequest::new("image-gen", "generate", json!({"p": 1}))
                .with_client_key("tenant-1");
            ServiceExt::ready(&mut svc)
                .await
                .unwrap()
                .call(req)
                .await
                .unwrap();
        }
        let req = ProviderRequest::new("image-gen", "generate", json!({"p": 1}))
            .with_client_key("tenant-1");
        let err = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(req)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 429);
    }

    #[tokio::test]
    async fn cache_layer_short_circuits_repeat_requests() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cl = calls.clone();
        let provider = service_fn(move |req: ProviderRequest| {
            let calls = calls_cl.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, InvokeError>(ProviderResponse {
                    payload: req.payload,
                })
            }
        });
        let cache = ResultCache::in_memory(Duration::from_secs(60));
        let mut svc = CacheLayer::new(cache).layer(provider);

        let req = || ProviderRequest::new("image-gen", "generate", json!({"prompt": "sunset"}));
        let first = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(req())
            .await
            .unwrap();
        let second = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(req())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // a different payload is a different key
        let other = ProviderRequest::new("image-gen", "generate", json!({"prompt": "sunrise"}));
        ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(other)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_layer_does_not_store_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cl = calls.clone();
        let provider = service_fn(move |_req: ProviderRequest| {
            let calls = calls_cl.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<ProviderResponse, _>(InvokeError::external("image-gen", "boom"))
            }
        });
        let cache = ResultCache::in_memory(Duration::from_secs(60));
        let mut svc = CacheLayer::new(cache).layer(provider);

        let req = || ProviderRequest::new("image-gen", "generate", json!({"p": 1}));
        for _ in 0..2 {
            let _ = ServiceExt::ready(&mut svc).await.unwrap().call(req()).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn execute_layer_retries_flaky_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cl = calls.clone();
        let provider = service_fn(move |req: ProviderRequest| {
            let calls = calls_cl.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(InvokeError::external("image-gen", "transient"))
                } else {
                    Ok(ProviderResponse {
                        payload: req.payload,
                    })
                }
            }
        });
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(200));
        let mut svc = ExecuteLayer::new(policy).layer(provider);

        let req = ProviderRequest::new("image-gen", "generate", json!({"p": 1}));
        let resp = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(req)
            .await
            .unwrap();
        assert_eq!(resp.payload, json!({"p": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn execute_layer_times_out_hung_provider() {
        let provider = service_fn(|_req: ProviderRequest| async move {
            sleep(Duration::from_millis(50)).await;
            Ok::<_, InvokeError>(ProviderResponse {
                payload: json!(null),
            })
        });
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(5));
        let mut svc = ExecuteLayer::new(policy).layer(provider);

        let req = ProviderRequest::new("license-check", "verify", json!({"asset": "a1"}));
        let err = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(req)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("license-check"));
    }

    #[tokio::test]
    async fn concurrent_cold_misses_both_recompute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cl = calls.clone();
        let provider = service_fn(move |req: ProviderRequest| {
            let calls = calls_cl.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                Ok::<_, InvokeError>(ProviderResponse {
                    payload: req.payload,
                })
            }
        });
        let cache = ResultCache::in_memory(Duration::from_secs(60));
        let layer = CacheLayer::new(cache);
        let svc = layer.layer(provider);
        let mut a = Cached {
            inner: svc.inner.clone(),
            cache: svc.cache.clone(),
        };
        let mut b = Cached {
            inner: svc.inner.clone(),
            cache: svc.cache.clone(),
        };

        let req = || ProviderRequest::new("image-gen", "generate", json!({"p": 1}));
        let (ra, rb) = tokio::join!(
            async { ServiceExt::ready(&mut a).await.unwrap().call(req()).await },
            async { ServiceExt::ready(&mut b).await.unwrap().call(req()).await },
        );
        ra.unwrap();
        rb.unwrap();
        // no in-flight coalescing: both cold misses hit the provider
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

//! # tower-invoke
//!
//! A Tower-based resilient invocation layer for paid, unreliable,
//! rate-limited external dependencies: generative-AI providers, license
//! verification, masking services. Every outbound call traverses the same
//! pipeline: an admission gate rejects over-budget clients early, a
//! result cache collapses repeated work, a retry-timeout executor bounds
//! each attempt, and a closed error taxonomy guarantees that whatever
//! fails reaches the client as a stable, safe JSON shape.
//!
//! ## Core Concepts
//!
//! - **Executor**: [`execute`] wraps one external call with a
//!   bounded-time, bounded-retry contract under a per-call [`RetryPolicy`]
//! - **Admission**: [`AdmissionController`] enforces weighted per-client
//!   budgets over fixed windows
//! - **Cache**: [`ResultCache`] memoizes expensive idempotent outcomes
//!   with time-based expiry; outages degrade to misses
//! - **Boundary**: [`render`] is the single terminal translator from
//!   [`InvokeError`] to an HTTP-style response and log entry
//! - **Layers**: Tower middleware composing all of the above around any
//!   provider service
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use tower::{Service, ServiceBuilder, ServiceExt};
//! use tower_invoke::{
//!     AdmissionController, AdmissionLayer, AdmissionPolicy, CacheLayer, ExecuteLayer,
//!     InvokeError, ProviderRequest, ProviderResponse, ResultCache, RetryPolicy,
//! };
//!
//! # async fn example() -> Result<(), InvokeError> {
//! let gate = Arc::new(AdmissionController::new(AdmissionPolicy::new(
//!     Duration::from_secs(60),
//!     300,
//! )));
//! let cache = ResultCache::in_memory(Duration::from_secs(3600));
//! let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(30));
//!
//! // The innermost service performs the actual provider call.
//! let provider = tower::service_fn(|req: ProviderRequest| async move {
//!     Ok::<_, InvokeError>(ProviderResponse { payload: req.payload })
//! });
//!
//! let mut stack = ServiceBuilder::new()
//!     .layer(AdmissionLayer::new(gate))
//!     .layer(CacheLayer::new(cache))
//!     .layer(ExecuteLayer::new(policy))
//!     .service(provider);
//!
//! let request = ProviderRequest::new("image-gen", "generate", json!({"prompt": "sunset"}))
//!     .with_client_key("tenant-7")
//!     .with_cost_points(5);
//! let response = stack.ready().await?.call(request).await?;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod boundary;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod pipeline;

// Public re-exports for convenience
pub use admission::{AdmissionController, AdmissionPolicy, Decision};
pub use boundary::{
    render, Environment, ErrorBody, ErrorResponse, RateLimitInfo, RequestContext,
};
pub use cache::{CacheKey, CacheStore, MemoryStore, ResultCache};
pub use config::{
    from_env, from_file, AdmissionConfig, CacheConfig, ConfigBuilder, InvokeConfig, RetryConfig,
    Tier, TierLimits,
};
pub use error::{InvokeError, Result};
pub use executor::{execute, Backoff, BackoffKind, RetryPolicy};
pub use pipeline::{
    AdmissionLayer, CacheLayer, ExecuteLayer, ProviderRequest, ProviderResponse,
};

// Re-export Tower traits that users need
pub use tower::{Layer, Service, ServiceExt};

//! Retry-timeout executor
//!
//! Wraps a single call to an external provider with a bounded-time,
//! bounded-retry execution contract. Every attempt races the operation
//! against a timer; a timer win counts as a failed attempt classified as a
//! timeout-shaped [`InvokeError::ExternalApi`]. The error from the final
//! attempt is propagated unchanged, message intact.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{InvokeError, Result};

/// Backoff schedule between attempts.
#[derive(Debug, Clone, Copy)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub initial: Duration,
    pub factor: f32,
    pub max: Duration,
    pub jitter: bool,
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            initial: delay,
            factor: 1.0,
            max: delay,
            jitter: false,
        }
    }

    pub fn exponential(initial: Duration, factor: f32, max: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            initial,
            factor,
            max,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before the retry following attempt `attempt` (zero-based).
    /// Never exceeds `max`, so the executor's worst-case latency stays
    /// bounded by `(max_retries + 1) * timeout + max_retries * max`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = match self.kind {
            BackoffKind::Fixed => self.initial,
            BackoffKind::Exponential => {
                let mult = self.factor.powi(attempt as i32);
                self.initial.mul_f32(mult)
            }
        };
        let mut delay = base.min(self.max);
        if self.jitter {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            let fraction: f64 = rng.gen_range(0.0..0.3);
            let jitter_ms = (delay.as_millis() as f64 * fraction) as u64;
            delay = (delay + Duration::from_millis(jitter_ms)).min(self.max);
        }
        delay
    }
}

/// Per-call retry policy. Supplied by the call site; nothing is assumed
/// beyond what the caller specifies.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means exactly one attempt.
    pub max_retries: usize,
    /// Delay before each retry under the default fixed schedule.
    pub initial_delay: Duration,
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            timeout,
            backoff: Backoff::fixed(initial_delay),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fail fast on a policy that could never execute sensibly.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(InvokeError::config("attempt timeout must be positive"));
        }
        Ok(())
    }
}

/// Execute `operation` against the named service under `policy`.
///
/// Performs attempts `0..=max_retries`, each raced against
/// `policy.timeout`. A timed-out attempt's future is dropped: the
/// executor stops waiting, but no transport-level abort of an
/// already-issued call is promised. Every failed attempt is retried until
/// the budget is exhausted; whether the operation is safe to reissue is
/// the call site's responsibility.
pub async fn execute<F, Fut, T>(service: &str, policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    policy.validate()?;

    let mut attempt: usize = 0;
    loop {
        let failure = match timeout(policy.timeout, operation()).await {
            Ok(Ok(value)) => {
                if attempt > 0 {
                    debug!(service, attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(err)) => err,
            Err(_) => InvokeError::timeout(service, policy.timeout),
        };

        if attempt >= policy.max_retries {
            warn!(
                service,
                attempts = attempt + 1,
                error = %failure,
                "retries exhausted"
            );
            return Err(failure);
        }

        let delay = policy.backoff.delay_for_attempt(attempt);
        debug!(
            service,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "attempt failed, retrying"
        );
        attempt += 1;
        sleep(delay).await;
    }
}

//! Error taxonomy for the invocation layer
//!
//! Every failure this crate surfaces is one of the kinds below. Each kind
//! carries a fixed HTTP status, a stable machine-readable code, and a
//! retryability hint. The boundary module renders instances into
//! client-safe responses; nothing outside this enum ever reaches a client.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for the invocation layer
pub type Result<T> = std::result::Result<T, InvokeError>;

/// Main error type for the invocation layer
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// Request shape or content violated a schema
    #[error("Validation failed: {details}")]
    Validation { details: String },

    /// A named external dependency failed or timed out
    #[error("{message}")]
    ExternalApi { service: String, message: String },

    /// A client exhausted its admission budget
    #[error("Too many requests, please try again later")]
    RateLimited {
        retry_after: Duration,
        limit: u32,
        window: Duration,
    },

    /// A referenced entity does not exist
    #[error("{entity} not found")]
    NotFound { entity: String },

    /// Missing or invalid credentials
    #[error("{message}")]
    Unauthorized { message: String },

    /// Valid credentials without sufficient permission
    #[error("{message}")]
    Forbidden { message: String },

    /// A named external dependency is known to be down
    #[error("{service} is currently unavailable")]
    ServiceUnavailable { service: String },

    /// An anticipated server-side failure with a coded shape
    #[error("{message}")]
    Internal { message: String },

    /// Invalid retry/admission/cache configuration supplied by a call site
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Uncoded catch-all for unanticipated failures
    #[error("{0}")]
    Other(String),
}

impl InvokeError {
    /// Validation failure from a list of per-field violation messages.
    pub fn validation<I, S>(violations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let details = violations
            .into_iter()
            .map(Into::into)
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation { details }
    }

    /// Failure reported by a named external dependency.
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalApi {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Timeout-shaped external failure. The message states the elapsed
    /// bound so callers can tell a timeout from an upstream rejection.
    pub fn timeout(service: impl Into<String>, elapsed: Duration) -> Self {
        let service = service.into();
        let message = format!(
            "{} did not respond within {}ms",
            service,
            elapsed.as_millis()
        );
        Self::ExternalApi { service, message }
    }

    pub fn rate_limited(retry_after: Duration, limit: u32, window: Duration) -> Self {
        Self::RateLimited {
            retry_after,
            limit,
            window,
        }
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status the boundary assigns to this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::Internal { .. } | Self::Config { .. } | Self::Other(_) => 500,
            Self::ExternalApi { .. } => 502,
            Self::ServiceUnavailable { .. } => 503,
        }
    }

    /// Stable machine-readable tag; `None` for the uncoded catch-all.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Validation { .. } => Some("VALIDATION_ERROR"),
            Self::ExternalApi { .. } => Some("EXTERNAL_API_ERROR"),
            Self::RateLimited { .. } => Some("RATE_LIMIT_ERROR"),
            Self::NotFound { .. } => Some("NOT_FOUND"),
            Self::Unauthorized { .. } => Some("UNAUTHORIZED"),
            Self::Forbidden { .. } => Some("FORBIDDEN"),
            Self::ServiceUnavailable { .. } => Some("SERVICE_UNAVAILABLE"),
            Self::Internal { .. } => Some("INTERNAL_ERROR"),
            Self::Config { .. } => Some("CONFIG_ERROR"),
            Self::Other(_) => None,
        }
    }

    /// Hint for clients: whether re-submitting the request may succeed.
    ///
    /// This is surfaced as response metadata only; the executor retries on
    /// its own attempt budget regardless of this flag.
    pub fn retryable(&self) -> bool {
        match self {
            Self::ExternalApi { .. }
            | Self::ServiceUnavailable { .. }
            | Self::RateLimited { .. } => true,
            Self::Validation { .. }
            | Self::Unauthorized { .. }
            | Self::Forbidden { .. }
            | Self::NotFound { .. }
            | Self::Internal { .. }
            | Self::Config { .. }
            | Self::Other(_) => false,
        }
    }

    /// Whether this is an anticipated failure mode, as opposed to a
    /// programming or configuration defect.
    pub fn is_operational(&self) -> bool {
        !matches!(
            self,
            Self::Internal { .. } | Self::Config { .. } | Self::Other(_)
        )
    }

    /// Duration after which a rate-limited client may try again.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for InvokeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("serialization failed: {err}"),
        }
    }
}

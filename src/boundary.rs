//! Terminal error boundary
//!
//! The single point where a classified error becomes an HTTP-style
//! response and a structured log entry. Retries are resolved inside the
//! executor before an error reaches this layer; once here, an error is
//! final for its request. The full error instance plus request context is
//! logged exactly once; clients receive a stable JSON subset with
//! internal diagnostics stripped outside development configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::InvokeError;

/// Controls whether diagnostic fields may appear in rendered responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Request context an error accumulates as it propagates to the boundary.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub client_key: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method: method.into(),
            path: path.into(),
            client_key: None,
        }
    }

    pub fn with_client_key(mut self, client_key: impl Into<String>) -> Self {
        self.client_key = Some(client_key.into());
        self
    }
}

/// Rate-limit bookkeeping surfaced to well-behaved clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub retry_after_ms: u64,
    pub limit: u32,
    pub window_ms: u64,
}

/// Client-safe JSON error body. Field names are part of the wire
/// contract; `message` carries the raw internal message and is only ever
/// populated in development configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_info: Option<RateLimitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A rendered error: HTTP status plus serializable body.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: u16,
    pub body: ErrorBody,
}

const GENERIC_MESSAGE: &str = "An unexpected error occurred";

fn retry_after_secs(retry_after: Duration) -> u64 {
    // ceiling, so clients never retry early
    retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)
}

/// Translate a classified error into a response, logging it with its
/// request context. This is the only place errors are logged; callers
/// must not log again at each propagation hop.
pub fn render(err: &InvokeError, ctx: &RequestContext, env: Environment) -> ErrorResponse {
    let status = err.status_code();

    if err.is_operational() {
        warn!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            client_key = ctx.client_key.as_deref().unwrap_or("-"),
            status,
            error_code = err.error_code().unwrap_or("-"),
            error = ?err,
            "request failed"
        );
    } else {
        error!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            client_key = ctx.client_key.as_deref().unwrap_or("-"),
            status,
            error_code = err.error_code().unwrap_or("-"),
            error = ?err,
            "request failed"
        );
    }

    let error_code = err.error_code().map(str::to_owned);
    let body = match err {
        InvokeError::Validation { details } => ErrorBody {
            error: "Validation failed".to_string(),
            error_code,
            details: Some(details.clone()),
            retryable: Some(false),
            retry_after: None,
            rate_limit_info: None,
            message: None,
        },
        InvokeError::ExternalApi { service, message } => ErrorBody {
            error: message.clone(),
            error_code,
            details: Some(format!("upstream service: {service}")),
            retryable: Some(true),
            retry_after: None,
            rate_limit_info: None,
            message: None,
        },
        InvokeError::RateLimited {
            retry_after,
            limit,
            window,
        } => ErrorBody {
            error: err.to_string(),
            error_code,
            details: None,
            retryable: Some(true),
            retry_after: Some(retry_after_secs(*retry_after)),
            rate_limit_info: Some(RateLimitInfo {
                retry_after_ms: retry_after.as_millis() as u64,
                limit: *limit,
                window_ms: window.as_millis() as u64,
            }),
            message: None,
        },
        InvokeError::NotFound { .. } => ErrorBody {
            error: err.to_string(),
            error_code,
            details: None,
            retryable: Some(false),
            retry_after: None,
            rate_limit_info: None,
            message: None,
        },
        InvokeError::Unauthorized { .. } | InvokeError::Forbidden { .. } => ErrorBody {
            error: err.to_string(),
            error_code,
            details: None,
            retryable: Some(false),
            retry_after: None,
            rate_limit_info: None,
            message: None,
        },
        InvokeError::ServiceUnavailable { .. } => ErrorBody {
            error: err.to_string(),
            error_code,
            details: None,
            retryable: Some(true),
            retry_after: None,
            rate_limit_info: None,
            message: None,
        },
        InvokeError::Internal { .. } | InvokeError::Config { .. } | InvokeError::Other(_) => {
            ErrorBody {
                error: GENERIC_MESSAGE.to_string(),
                error_code,
                details: None,
                retryable: None,
                retry_after: None,
                rate_limit_info: None,
                message: env.is_development().then(|| err.to_string()),
            }
        }
    };

    ErrorResponse { status, body }
}

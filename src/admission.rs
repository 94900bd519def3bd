//! Admission control
//!
//! Gatekeeps requests per client identity before any handler logic runs.
//! Each client key gets a weighted request budget over a fixed time
//! window; an elapsed window lazily rolls over on the next check, so no
//! sweeper task is needed. The controller performs no retries and knows
//! nothing about the executor. Denial is the designed outcome for an
//! over-budget client, not an error, and the boundary converts it into a
//! rate-limit response.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{InvokeError, Result};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Window length and weighted budget for one class of clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub window: Duration,
    pub max_points: u32,
}

impl AdmissionPolicy {
    pub fn new(window: Duration, max_points: u32) -> Self {
        Self { window, max_points }
    }
}

#[derive(Debug)]
struct WindowBudget {
    window_start: Instant,
    spent: u32,
}

/// Per-client fixed-window admission gate.
///
/// State is owned by the instance and constructor-injected wherever it is
/// shared, so tests can build isolated controllers per case.
#[derive(Debug)]
pub struct AdmissionController {
    policy: AdmissionPolicy,
    budgets: Mutex<HashMap<String, WindowBudget>>,
}

impl AdmissionController {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy,
            budgets: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Decide whether a request costing `cost_points` may proceed.
    pub fn admit(&self, client_key: &str, cost_points: u32) -> Decision {
        let now = Instant::now();
        let mut budgets = self.budgets.lock().unwrap();
        let budget = budgets
            .entry(client_key.to_string())
            .or_insert_with(|| WindowBudget {
                window_start: now,
                spent: 0,
            });

        let elapsed = now.duration_since(budget.window_start);
        if elapsed >= self.policy.window {
            budget.window_start = now;
            budget.spent = 0;
        }

        if budget.spent.saturating_add(cost_points) > self.policy.max_points {
            let consumed = now.duration_since(budget.window_start);
            let retry_after = self.policy.window.saturating_sub(consumed);
            debug!(
                client_key,
                spent = budget.spent,
                cost_points,
                max_points = self.policy.max_points,
                retry_after_ms = retry_after.as_millis() as u64,
                "admission denied"
            );
            return Decision::Deny { retry_after };
        }

        budget.spent += cost_points;
        Decision::Allow
    }

    /// [`admit`](Self::admit), with denial converted into the taxonomy
    /// error the boundary renders as HTTP 429.
    pub fn check(&self, client_key: &str, cost_points: u32) -> Result<()> {
        match self.admit(client_key, cost_points) {
            Decision::Allow => Ok(()),
            Decision::Deny { retry_after } => Err(InvokeError::rate_limited(
                retry_after,
                self.policy.max_points,
                self.policy.window,
            )),
        }
    }
}

//! Per-organization sliding-window rate limiter.
//!
//! Grounded on the platform's keyed rate limiter: one mutex-guarded record
//! per key, a single lock spanning the read-prune-admit sequence so the
//! check is atomic under concurrent callers. Generalized here from
//! per-IP/per-user keys to per-organization keys with plan-defined
//! `(quota, window)`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use airweave_core::Organization;
use airweave_error::CoreError;
use uuid::Uuid;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the call is admitted.
    pub allowed: bool,
    /// The plan-defined quota this check was evaluated against.
    pub limit: u32,
    /// Calls still available in the current window after this one.
    pub remaining: u32,
    /// Seconds until the oldest in-window call ages out. Always `0` when
    /// `allowed` is true; always `> 0` when `allowed` is false.
    pub retry_after_seconds: u64,
}

#[derive(Default)]
struct OrgRecord {
    /// Timestamps of admitted calls still inside the sliding window,
    /// oldest first.
    admitted: VecDeque<Instant>,
}

/// Per-organization sliding-window admission control.
///
/// A single `std::sync::Mutex` per organization record guards the entire
/// read-prune-admit sequence, matching the platform limiter's atomicity
/// guarantee under concurrent callers for the same key.
pub struct RateLimiter {
    records: Mutex<HashMap<Uuid, OrgRecord>>,
}

impl RateLimiter {
    /// Build an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate and, if admitted, record one call against the
    /// organization's sliding window.
    ///
    /// # Errors
    /// Returns [`CoreError::DataIntegrity`] if the organization has no
    /// resolved billing plan — this implies an unauthenticated path
    /// reached the core, and must never be treated as a silent pass.
    /// Returns [`CoreError::RateLimitExceeded`] if the window's quota is
    /// already exhausted.
    pub fn check(&self, organization: &Organization) -> Result<RateLimitResult, CoreError> {
        let plan = organization.plan().ok_or_else(|| CoreError::DataIntegrity {
            message: format!(
                "organization {} has no resolved billing plan; rate limiter cannot evaluate",
                organization.id()
            ),
        })?;
        let quota = plan.rate_limit_quota;
        let window = Duration::from_secs(plan.rate_limit_window_secs);

        #[allow(clippy::unwrap_used)]
        let mut records = self.records.lock().unwrap();
        let record = records.entry(organization.id()).or_default();

        let now = Instant::now();
        while let Some(&oldest) = record.admitted.front() {
            if now.duration_since(oldest) >= window {
                record.admitted.pop_front();
            } else {
                break;
            }
        }

        let count = u32::try_from(record.admitted.len()).unwrap_or(u32::MAX);
        if count < quota {
            record.admitted.push_back(now);
            return Ok(RateLimitResult {
                allowed: true,
                limit: quota,
                remaining: quota - count - 1,
                retry_after_seconds: 0,
            });
        }

        let oldest = record.admitted.front().copied().unwrap_or(now);
        let elapsed = now.duration_since(oldest);
        let retry_after = window.saturating_sub(elapsed);
        let retry_after_seconds = retry_after.as_secs().max(1);

        Err(CoreError::RateLimitExceeded {
            retry_after_seconds,
            limit: quota,
            remaining: 0,
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

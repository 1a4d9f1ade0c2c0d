//! Unified error type for the airweave sync core.
//!
//! Every core operation returns `Result<T, CoreError>`. Callers outside the
//! core (an API layer, a worker harness) map `CoreError` to their own wire
//! format via [`CoreError::http_status`] and [`render_error_body`].

use serde::Serialize;

/// Unified error type covering every failure mode a core operation can
/// produce. Variants correspond 1:1 to the error kinds in the sync engine
/// specification, not to the underlying Rust type that triggered them.
#[derive(Debug, thiserror::Error, Clone)]
pub enum CoreError {
    /// Resource absent for the calling organization.
    #[error("not found: {resource}")]
    NotFound {
        /// Human-readable resource description (e.g. "collection abc").
        resource: String,
    },

    /// Malformed input, invalid auth config, or unsupported auth method.
    #[error("bad request: {message}")]
    BadRequest {
        /// Description of what was invalid.
        message: String,
    },

    /// Caller lacks the required organization role, or used api-key auth
    /// for an operation that requires user authentication.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Description of why the caller was refused.
        message: String,
    },

    /// Sliding-window rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded {
        /// Seconds until the oldest in-window call ages out.
        retry_after_seconds: u64,
        /// The plan-defined quota that was exceeded.
        limit: u32,
        /// Always 0 when this error is raised.
        remaining: u32,
    },

    /// Organization usage ledger has exhausted a plan-defined action quota.
    #[error("usage limit exceeded for {action_type}")]
    UsageLimitExceeded {
        /// The action type whose quota was exhausted (e.g. "entities").
        action_type: String,
    },

    /// Organization billing plan requires payment before this action can
    /// proceed.
    #[error("payment required")]
    PaymentRequired,

    /// Operation is not permitted from the object's current state-machine
    /// position (e.g. starting a sync while another job is running).
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the illegal transition or precondition.
        message: String,
    },

    /// A source, destination, embedder, or webhook target returned an
    /// error.
    #[error("upstream error from {service}: {message}")]
    Upstream {
        /// Name of the upstream collaborator (e.g. "qdrant", "github").
        service: String,
        /// Upstream-provided or derived error description.
        message: String,
    },

    /// Invariant violation that should never happen given correct callers
    /// (e.g. a resolved organization with no billing plan). Always a bug
    /// or a data-integrity problem, never a caller mistake.
    #[error("data integrity violation: {message}")]
    DataIntegrity {
        /// Description of the violated invariant.
        message: String,
    },

    /// Job-level failure. Never surfaced synchronously to a caller blocked
    /// on the operation that triggered it — recorded on the `SyncJob` and
    /// emitted as a `sync.failed` event.
    #[error("sync failed: {message}")]
    SyncFailure {
        /// Description of the failure, copied onto the job record.
        message: String,
    },
}

impl CoreError {
    /// Stable, documentation-linkable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::BadRequest { .. } => "bad_request",
            Self::Forbidden { .. } => "forbidden",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::UsageLimitExceeded { .. } => "usage_limit_exceeded",
            Self::PaymentRequired => "payment_required",
            Self::InvalidState { .. } => "invalid_state",
            Self::Upstream { .. } => "upstream_error",
            Self::DataIntegrity { .. } => "data_integrity",
            Self::SyncFailure { .. } => "sync_failure",
        }
    }

    /// The HTTP status an out-of-scope API layer should map this to.
    /// The core itself never produces an HTTP response; this exists so the
    /// mapping is specified once, alongside the error kind it governs.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::BadRequest { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::RateLimitExceeded { .. } => 429,
            Self::UsageLimitExceeded { .. } | Self::PaymentRequired => 402,
            Self::InvalidState { .. } => 409,
            Self::Upstream { .. } => 502,
            Self::DataIntegrity { .. } | Self::SyncFailure { .. } => 500,
        }
    }

    /// Whether retrying the same operation later might succeed without
    /// caller-side changes. Used by the sync orchestrator to decide whether
    /// an upstream hiccup should abort a batch or simply be logged.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::RateLimitExceeded { .. })
    }
}

/// JSON body shape for error responses. Exactly two shapes are valid per
/// the specification: production hides everything but a fixed string,
/// debug includes the error class and a trace.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

/// Render the wire body for an error, honoring the production/debug split.
/// In production mode, no exception class name or stack trace ever
/// leaks into the body. In debug mode, the error's `Debug` rendering is
/// used as a stand-in trace.
#[must_use]
pub fn render_error_body(error: &CoreError, debug_mode: bool) -> ErrorBody {
    if debug_mode {
        ErrorBody {
            detail: format!("{}: {error}", error.error_code()),
            trace: Some(format!("{error:?}")),
        }
    } else {
        ErrorBody {
            detail: "Internal Server Error".to_string(),
            trace: None,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_body_never_leaks_detail() {
        let err = CoreError::DataIntegrity {
            message: "organization missing billing plan".to_string(),
        };
        let body = render_error_body(&err, false);
        assert_eq!(body.detail, "Internal Server Error");
        assert!(body.trace.is_none());
    }

    #[test]
    fn debug_body_includes_class_and_trace() {
        let err = CoreError::NotFound {
            resource: "collection abc".to_string(),
        };
        let body = render_error_body(&err, true);
        assert!(body.detail.contains("not_found"));
        assert!(body.trace.is_some());
    }

    #[test]
    fn http_status_mapping_matches_spec() {
        assert_eq!(CoreError::NotFound { resource: String::new() }.http_status(), 404);
        assert_eq!(CoreError::BadRequest { message: String::new() }.http_status(), 400);
        assert_eq!(CoreError::Forbidden { message: String::new() }.http_status(), 403);
        assert_eq!(
            CoreError::RateLimitExceeded { retry_after_seconds: 1, limit: 1, remaining: 0 }
                .http_status(),
            429
        );
        assert_eq!(CoreError::PaymentRequired.http_status(), 402);
        assert_eq!(
            CoreError::UsageLimitExceeded { action_type: "entities".to_string() }.http_status(),
            402
        );
        assert_eq!(CoreError::InvalidState { message: String::new() }.http_status(), 409);
        assert_eq!(
            CoreError::Upstream { service: String::new(), message: String::new() }.http_status(),
            502
        );
        assert_eq!(CoreError::DataIntegrity { message: String::new() }.http_status(), 500);
        assert_eq!(CoreError::SyncFailure { message: String::new() }.http_status(), 500);
    }

    #[test]
    fn upstream_and_rate_limit_are_transient() {
        assert!(CoreError::Upstream { service: String::new(), message: String::new() }
            .is_transient());
        assert!(CoreError::RateLimitExceeded { retry_after_seconds: 1, limit: 1, remaining: 0 }
            .is_transient());
        assert!(!CoreError::DataIntegrity { message: String::new() }.is_transient());
    }
}

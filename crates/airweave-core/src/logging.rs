//! A thin wrapper attaching request-scoped fields to `tracing` spans,
//! mirroring the original platform's `ContextualLogger`.

use uuid::Uuid;

/// Carries the identifiers every log line in a request or job's lifetime
/// should include. Built once at ingress (or at job start) and threaded
/// alongside an `ApiContext`/`SyncRuntime`; every suspension point logs
/// through it rather than bare `tracing::info!` calls so `organization_id`
/// is never accidentally dropped from a log line.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    span: tracing::Span,
}

impl RequestLogger {
    /// Build a logger scoped to a request.
    #[must_use]
    pub fn for_request(request_id: Uuid, organization_id: Uuid) -> Self {
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            organization_id = %organization_id,
        );
        Self { span }
    }

    /// Build a logger scoped to a sync job, additionally carrying
    /// `sync_id` and `job_id`.
    #[must_use]
    pub fn for_sync_job(organization_id: Uuid, sync_id: Uuid, job_id: Uuid) -> Self {
        let span = tracing::info_span!(
            "sync_job",
            organization_id = %organization_id,
            sync_id = %sync_id,
            job_id = %job_id,
        );
        Self { span }
    }

    /// Enter the span for the duration of a closure, running it with the
    /// request's fields attached to every log line emitted inside.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        self.span.in_scope(f)
    }

    /// The underlying span, for callers that need to enter it across an
    /// await point (`let _guard = logger.span().enter();` is unsound
    /// across `.await`; prefer `Instrument::instrument` with this span).
    #[must_use]
    pub const fn span(&self) -> &tracing::Span {
        &self.span
    }
}

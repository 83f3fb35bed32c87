use thiserror::Error;

/// Failure taxonomy for the follow-up and sync cores.
///
/// Race-guard outcomes (client state changed under a queued job) are not
/// errors; they surface as `JobOutcome::StoppedByGuard` from the
/// scheduler instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing template, missing SMTP account, and similar setup gaps.
    /// Retried on the next tick / reconnect.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Network-level failure talking to SMTP or IMAP. Bounded retries for
    /// IMAP monitors; follow-up jobs are simply deferred to the next tick.
    #[error("transport: {0}")]
    Transport(String),

    /// Stored data that fails validation (malformed JSON settings, a
    /// template rendering to an empty subject). The job is left untouched.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

//! Crate-wide error taxonomy. Handlers classify into one of these variants at
//! their boundary and match on it to decide ack/nack; nothing downstream of a
//! worker's message loop should see a raw `sqlx::Error` or transport error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("queue error: {0}")]
    Queue(#[from] meridian_pgmq::PgmqNotifyError),

    #[error("external API auth error: {0}")]
    ExternalAuth(String),

    #[error("external API rate limited: {0}")]
    ExternalRateLimit(String),

    #[error("external API error (status {status}): {detail}")]
    ExternalApi { status: u16, detail: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("failed to parse: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("credential vault error: {0}")]
    Vault(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

//! Error types for the durable queue client and its LISTEN/NOTIFY layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgmqNotifyError {
    #[error("not connected: call connect() first")]
    NotConnected,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to parse notify payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("queue operation failed: {0}")]
    Queue(String),

    #[error("listener channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, PgmqNotifyError>;

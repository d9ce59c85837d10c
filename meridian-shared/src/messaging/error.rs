use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("queue error: {0}")]
    Queue(#[from] meridian_pgmq::PgmqNotifyError),

    #[error("invalid queue name {name:?}: {reason}")]
    InvalidQueueName { name: String, reason: String },

    #[error("circuit breaker open for {component}")]
    CircuitBreakerOpen { component: String },

    #[error("message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MessagingError {
    pub fn circuit_breaker_open(component: impl Into<String>) -> Self {
        Self::CircuitBreakerOpen {
            component: component.into(),
        }
    }

    pub fn invalid_queue_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQueueName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

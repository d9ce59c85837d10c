//! Message broker facade and fixed queue topology.

pub mod broker;
pub mod error;
pub mod queues;

pub use broker::MessageBroker;
pub use error::MessagingError;
pub use queues::{all_queues, dlq_name, validate_queue_name, Department, ACTION_EXECUTE_QUEUE, DEPARTMENT_QUEUES, INGEST_QUEUE};

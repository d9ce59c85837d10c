//! Department worker runtime: consumes queued analysis tasks, runs the
//! matching department handler, and executes human-approved actions against
//! the commerce backend.

pub mod action_executor;
pub mod context;
pub mod department;
pub mod departments;
pub mod message;

pub use action_executor::ActionExecutor;
pub use department::{DepartmentHandler, DepartmentWorker};

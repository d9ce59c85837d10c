//! Human-in-the-loop action proposal, approval, and permission mapping.

pub mod action_parser;
pub mod permissions;
pub mod service;

pub use action_parser::{parse_proposed_actions, ParsedAction};
pub use permissions::{has_required_scopes, required_scopes};
pub use service::ActionService;

//! Persistent entities. Every entity except [`User`] carries a denormalized
//! `user_id` so that the row-level-security policies in
//! `migrations/0002_row_level_security.sql` can filter on a single column
//! name uniformly across the schema.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub external_provider_subject_id: Option<String>,
    pub full_name: Option<String>,
    pub is_superuser: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LinkedAccountStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_type: String,
    pub account_name: String,
    #[serde(skip_serializing)]
    pub encrypted_credentials: Vec<u8>,
    pub scopes: String,
    pub status: LinkedAccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkedAccount {
    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope_list().iter().any(|s| *s == scope)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserPreferences {
    pub id: Uuid,
    pub user_id: Uuid,
    pub preferred_model_planner: Option<String>,
    pub preferred_model_aggregator: Option<String>,
    pub preferred_model_tool: Option<String>,
    pub preferred_model_creative: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnalysisRequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl AnalysisRequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub linked_account_id: Uuid,
    pub prompt: String,
    pub status: AnalysisRequestStatus,
    pub result_summary: Option<String>,
    pub result_data: Option<Json<serde_json::Value>>,
    pub agent_state: Option<Json<serde_json::Value>>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentTaskStatus {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl AgentTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: Uuid,
    pub user_id: Uuid,
    pub analysis_request_id: Uuid,
    pub task_type: String,
    pub status: AgentTaskStatus,
    pub input_data: Option<Json<serde_json::Value>>,
    pub output_data: Option<Json<serde_json::Value>>,
    pub logs: Option<String>,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProposedActionStatus {
    Proposed,
    Approved,
    Rejected,
    Executing,
    Executed,
    Failed,
}

impl ProposedActionStatus {
    /// `proposed -> approved -> executing -> {executed, failed}`,
    /// `proposed -> rejected`. No other edges.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Approved)
                | (Self::Proposed, Self::Rejected)
                | (Self::Approved, Self::Executing)
                | (Self::Executing, Self::Executed)
                | (Self::Executing, Self::Failed)
        )
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProposedAction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub analysis_request_id: Uuid,
    pub linked_account_id: Uuid,
    pub action_type: String,
    pub description: String,
    pub parameters: Json<serde_json::Value>,
    pub status: ProposedActionStatus,
    pub execution_logs: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CachedExternalData {
    pub id: Uuid,
    pub user_id: Uuid,
    pub linked_account_id: Uuid,
    pub cache_key: String,
    pub data: Json<serde_json::Value>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedExternalData {
    pub fn is_hit(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposed_action_transitions_are_narrow() {
        use ProposedActionStatus::*;
        assert!(Proposed.can_transition_to(Approved));
        assert!(Proposed.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Executed));
        assert!(Executing.can_transition_to(Failed));
        assert!(!Proposed.can_transition_to(Executing));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Executed.can_transition_to(Failed));
    }

    #[test]
    fn cached_external_data_hit_requires_future_expiry() {
        let now = Utc::now();
        let mut row = CachedExternalData {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            linked_account_id: Uuid::new_v4(),
            cache_key: "orders:last_30d".into(),
            data: Json(serde_json::json!({})),
            cached_at: now,
            expires_at: now + chrono::Duration::seconds(60),
        };
        assert!(row.is_hit(now));
        row.expires_at = now - chrono::Duration::seconds(1);
        assert!(!row.is_hit(now));
    }

    #[test]
    fn linked_account_scope_list_trims_and_filters() {
        let account = LinkedAccount {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            account_type: "shopify".into(),
            account_name: "acme.myshopify.com".into(),
            encrypted_credentials: vec![],
            scopes: "read_orders, write_fulfillments ,, read_customers".into(),
            status: LinkedAccountStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(account.has_scope("read_orders"));
        assert!(!account.has_scope("write_products"));
        assert_eq!(account.scope_list().len(), 3);
    }
}

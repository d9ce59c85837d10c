//! Per-task context handed to a department handler: everything it needs to
//! read the tenant's data, call the commerce backend, and propose actions.

use std::time::Duration;

use meridian_shared::external_client::{CommerceClient, ExternalApiClient};
use meridian_shared::vault::CredentialVault;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::message::DepartmentMessage;

pub struct TaskContext {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub analysis_request_id: Uuid,
    pub linked_account_id: Uuid,
    pub task_details: Value,
    pub description: String,
    pub pool: PgPool,
    vault: CredentialVault,
    cache_ttl: Duration,
}

impl TaskContext {
    pub fn new(msg: &DepartmentMessage, pool: PgPool, vault: CredentialVault, cache_ttl: Duration) -> Self {
        Self {
            task_id: msg.task_id,
            user_id: msg.user_id,
            analysis_request_id: msg.analysis_request_id,
            linked_account_id: msg.linked_account_id,
            task_details: msg.task_details.clone(),
            description: msg.description.clone(),
            pool,
            vault,
            cache_ttl,
        }
    }

    /// Builds a fresh external client handle scoped to this task's account.
    /// `account_name` is the shop domain the linked account belongs to.
    pub fn external_client(&self, account_name: impl Into<String>) -> ExternalApiClient {
        ExternalApiClient::new(
            self.pool.clone(),
            self.vault.clone(),
            self.user_id,
            self.linked_account_id,
            account_name,
            self.cache_ttl,
        )
    }

    /// A commerce backend handle scoped to `account_name`'s own storefront
    /// domain — every linked Shopify account has a distinct API host.
    pub fn commerce_client(&self, account_name: &str) -> CommerceClient {
        CommerceClient::new(format!("https://{account_name}/admin/api/2024-01"))
    }
}

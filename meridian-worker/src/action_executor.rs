//! Executes a human-approved action against the commerce backend. Consumes
//! `action.execute`, which `ActionService::approve_action` publishes to
//! after a row transitions `proposed -> approved`.

use std::time::Duration;

use meridian_shared::error::{CoreError, Result};
use meridian_shared::messaging::{MessageBroker, ACTION_EXECUTE_QUEUE};
use meridian_shared::models::{LinkedAccount, ProposedAction, ProposedActionStatus};
use meridian_shared::hitl::{has_required_scopes, required_scopes};
use meridian_shared::tenant::with_tenant;
use meridian_shared::vault::CredentialVault;
use serde::Deserialize;
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};
use uuid::Uuid;

const RECEIVE_BATCH: i64 = 4;
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);
const IDLE_POLL: Duration = Duration::from_millis(500);

fn format_scope_list(scopes: &[&str]) -> String {
    let quoted: Vec<String> = scopes.iter().map(|s| format!("'{s}'")).collect();
    format!("[{}]", quoted.join(", "))
}

#[derive(Debug, Deserialize)]
struct ExecuteMessage {
    action_id: Uuid,
    user_id: Uuid,
}

pub struct ActionExecutor {
    pool: PgPool,
    broker: MessageBroker,
    vault: CredentialVault,
}

impl ActionExecutor {
    pub fn new(pool: PgPool, broker: MessageBroker, vault: CredentialVault) -> Self {
        Self { pool, broker, vault }
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let messages = match self
                .broker
                .receive::<ExecuteMessage>(ACTION_EXECUTE_QUEUE, RECEIVE_BATCH, VISIBILITY_TIMEOUT)
                .await
            {
                Ok(messages) => messages,
                Err(err) => {
                    error!(%err, "failed to read from action.execute");
                    tokio::time::sleep(IDLE_POLL).await;
                    continue;
                }
            };

            if messages.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_POLL) => {},
                    _ = shutdown.changed() => {},
                }
                continue;
            }

            for msg in messages {
                match self.process(&msg.message).await {
                    Ok(()) => {
                        if let Err(err) = self.broker.ack(ACTION_EXECUTE_QUEUE, msg.msg_id).await {
                            error!(%err, msg_id = msg.msg_id, "failed to ack action.execute message");
                        }
                    }
                    Err(transient) => {
                        warn!(%transient, msg_id = msg.msg_id, "transient execution failure, requeuing for broker redelivery");
                        if let Err(err) = self.broker.nack(ACTION_EXECUTE_QUEUE, msg.msg_id, true).await {
                            error!(%err, msg_id = msg.msg_id, "failed to requeue action.execute message");
                        }
                    }
                }
            }
        }
    }

    /// `Err` means a transient failure (rate limit) worth a broker-level
    /// redelivery. Everything else — including an execution failure against
    /// the commerce backend — is terminal and recorded onto the row.
    async fn process(&self, msg: &ExecuteMessage) -> Result<()> {
        let Some(action) = self.lock_and_transition_to_executing(msg.user_id, msg.action_id).await? else {
            warn!(action_id = %msg.action_id, "action not found or not in approved state, dropping");
            return Ok(());
        };

        info!(audit = true, action_id = %action.id, "ACTION_EXECUTING");

        let account = self.load_linked_account(msg.user_id, action.linked_account_id).await?;
        let granted: Vec<&str> = account.scope_list();
        if !has_required_scopes(&action.action_type, &granted) {
            let required = required_scopes(&action.action_type).unwrap_or(&[]);
            let reason = format!(
                "Permission denied. Action '{}' requires scopes: {}, but user only granted: {}.",
                action.action_type,
                format_scope_list(required),
                format_scope_list(&granted),
            );
            self.mark_failed(msg.user_id, action.id, &reason).await?;
            return Ok(());
        }

        let token = {
            let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
            let token = self.vault.decrypt_for(&mut tx, msg.user_id, &account.account_name).await?;
            tx.rollback().await.map_err(CoreError::from)?;
            token.ok_or_else(|| CoreError::NotFound(format!("no active credentials for {}", account.account_name)))?
        };

        let commerce = meridian_shared::external_client::CommerceClient::new(format!(
            "https://{}/admin/api/2024-01",
            account.account_name
        ));
        let dispatch = match action.action_type.as_str() {
            "update_product_price" => {
                commerce.put(&token, "/admin/api/variants.json", &action.parameters.0).await
            }
            "create_discount_code" => {
                commerce.post(&token, "/admin/api/price_rules/discount_codes.json", &action.parameters.0).await
            }
            "adjust_inventory" => {
                commerce.post(&token, "/admin/api/inventory_levels/adjust.json", &action.parameters.0).await
            }
            other => {
                self.mark_failed(msg.user_id, action.id, &format!("action type {other} is not implemented")).await?;
                return Ok(());
            }
        };

        match dispatch {
            Ok(_) => {
                self.mark_executed(msg.user_id, action.id).await?;
                info!(audit = true, action_id = %action.id, "ACTION_EXECUTED");
                Ok(())
            }
            Err(CoreError::ExternalRateLimit(detail)) => {
                Err(CoreError::ExternalRateLimit(detail))
            }
            Err(err) => {
                self.mark_failed(msg.user_id, action.id, &err.to_string()).await?;
                Ok(())
            }
        }
    }

    async fn lock_and_transition_to_executing(&self, user_id: Uuid, action_id: Uuid) -> Result<Option<ProposedAction>> {
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            let locked = sqlx::query_as::<_, ProposedAction>("SELECT * FROM proposed_actions WHERE id = $1 FOR UPDATE")
                .bind(action_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(CoreError::from)?;
            let Some(current) = locked else { return Ok(None) };
            if !current.status.can_transition_to(ProposedActionStatus::Executing) {
                return Ok(None);
            }
            let row = sqlx::query_as::<_, ProposedAction>(
                "UPDATE proposed_actions SET status = 'executing', updated_at = now() WHERE id = $1 RETURNING *",
            )
            .bind(action_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(CoreError::from)?;
            Ok(Some(row))
        }))
        .await
    }

    async fn load_linked_account(&self, user_id: Uuid, linked_account_id: Uuid) -> Result<LinkedAccount> {
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            sqlx::query_as::<_, LinkedAccount>("SELECT * FROM linked_accounts WHERE id = $1")
                .bind(linked_account_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(CoreError::from)
        }))
        .await
    }

    async fn mark_executed(&self, user_id: Uuid, action_id: Uuid) -> Result<()> {
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            sqlx::query(
                "UPDATE proposed_actions SET status = 'executed', executed_at = now(), updated_at = now() WHERE id = $1",
            )
            .bind(action_id)
            .execute(&mut **tx)
            .await
            .map_err(CoreError::from)?;
            Ok(())
        }))
        .await
    }

    async fn mark_failed(&self, user_id: Uuid, action_id: Uuid, reason: &str) -> Result<()> {
        warn!(audit = true, action_id = %action_id, reason, "ACTION_EXECUTION_FAILED");
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE proposed_actions
                SET status = 'failed',
                    execution_logs = coalesce(execution_logs, '') || $2 || chr(10),
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(action_id)
            .bind(reason)
            .execute(&mut **tx)
            .await
            .map_err(CoreError::from)?;
            Ok(())
        }))
        .await
    }
}


//! Human-in-the-loop action service: propose / approve / reject / list,
//! grounded in `app/services/action_service.py`'s `approve_action` family —
//! same row-locked transactions, same audit event names, same error-message
//! wording.

use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::messaging::{MessageBroker, ACTION_EXECUTE_QUEUE};
use crate::models::{ProposedAction, ProposedActionStatus};
use crate::tenant::with_tenant;

use super::action_parser::ParsedAction;

pub struct ActionService {
    pool: PgPool,
    broker: MessageBroker,
}

impl ActionService {
    pub fn new(pool: PgPool, broker: MessageBroker) -> Self {
        Self { pool, broker }
    }

    /// Inserts one ProposedAction row per successfully parsed proposal.
    /// Emits `ACTION_PROPOSED` for each row inserted.
    pub async fn create_proposed_actions(
        &self,
        user_id: Uuid,
        analysis_request_id: Uuid,
        linked_account_id: Uuid,
        proposals: &[ParsedAction],
    ) -> Result<Vec<Uuid>> {
        let proposals = proposals.to_vec();
        with_tenant(&self.pool, user_id, move |tx: &mut sqlx::Transaction<'_, sqlx::Postgres>| -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Uuid>>> + Send + '_>> {
            let proposals = proposals.clone();
            Box::pin(async move {
            let mut ids = Vec::with_capacity(proposals.len());
            for proposal in &proposals {
                let row = sqlx::query(
                    r#"
                    INSERT INTO proposed_actions
                        (id, user_id, analysis_request_id, linked_account_id, action_type,
                         description, parameters, status, created_at, updated_at)
                    VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, 'proposed', now(), now())
                    RETURNING id
                    "#,
                )
                .bind(user_id)
                .bind(analysis_request_id)
                .bind(linked_account_id)
                .bind(&proposal.action_type)
                .bind(&proposal.description)
                .bind(&proposal.parameters)
                .fetch_one(&mut **tx)
                .await
                .map_err(CoreError::from)?;

                let id: Uuid = row.try_get("id").map_err(CoreError::from)?;
                info!(audit = true, action_id = %id, action_type = %proposal.action_type, "ACTION_PROPOSED");
                ids.push(id);
            }
            Ok(ids)
            })
        })
        .await
    }

    pub async fn list_pending_actions(&self, user_id: Uuid) -> Result<Vec<ProposedAction>> {
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            let rows = sqlx::query_as::<_, ProposedAction>(
                "SELECT * FROM proposed_actions WHERE user_id = $1 AND status = 'proposed' ORDER BY created_at",
            )
            .bind(user_id)
            .fetch_all(&mut **tx)
            .await
            .map_err(CoreError::from)?;
            Ok(rows)
        }))
        .await
    }

    /// Row-locked transition `proposed -> approved`. After commit, publishes
    /// `{action_id, user_id}` to `action.execute`; a post-commit publish
    /// failure leaves the action `approved` (re-publishable by an operator)
    /// and is recorded as a critical marker in `execution_logs`.
    pub async fn approve_action(&self, user_id: Uuid, action_id: Uuid) -> Result<ProposedAction> {
        let action = self
            .transition_locked(user_id, action_id, ProposedActionStatus::Approved, |tx| Box::pin(async move {
                sqlx::query(
                    "UPDATE proposed_actions SET status = 'approved', approved_at = now(), updated_at = now() WHERE id = $1 RETURNING *",
                )
                .bind(action_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(CoreError::from)
            }))
            .await?;

        info!(audit = true, action_id = %action_id, "ACTION_APPROVED");

        let publish_result = self
            .broker
            .publish(ACTION_EXECUTE_QUEUE, &json!({ "action_id": action_id, "user_id": user_id }))
            .await;

        match publish_result {
            Ok(_) => {
                info!(audit = true, action_id = %action_id, "ACTION_ENQUEUED");
            }
            Err(err) => {
                error!(audit = true, action_id = %action_id, %err, "ACTION_ENQUEUE_FAILED");
                let _ = self.append_execution_log(
                    user_id,
                    action_id,
                    &format!("CRITICAL: approved but failed to enqueue for execution: {err}"),
                ).await;
                return Err(CoreError::Unexpected(format!(
                    "action {action_id} approved but could not be enqueued: {err}"
                )));
            }
        }

        Ok(action)
    }

    pub async fn reject_action(&self, user_id: Uuid, action_id: Uuid) -> Result<ProposedAction> {
        let action = self
            .transition_locked(user_id, action_id, ProposedActionStatus::Rejected, |tx| Box::pin(async move {
                sqlx::query(
                    "UPDATE proposed_actions SET status = 'rejected', updated_at = now() WHERE id = $1 RETURNING *",
                )
                .bind(action_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(CoreError::from)
            }))
            .await?;

        info!(audit = true, action_id = %action_id, "ACTION_REJECTED");
        Ok(action)
    }

    async fn append_execution_log(&self, user_id: Uuid, action_id: Uuid, line: &str) -> Result<()> {
        let line = line.to_string();
        with_tenant(&self.pool, user_id, move |tx: &mut sqlx::Transaction<'_, sqlx::Postgres>| -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
            let line = line.clone();
            Box::pin(async move {
            sqlx::query(
                "UPDATE proposed_actions SET execution_logs = coalesce(execution_logs, '') || $2 || chr(10) WHERE id = $1",
            )
            .bind(action_id)
            .bind(line)
            .execute(&mut **tx)
            .await
            .map_err(CoreError::from)?;
            Ok(())
            })
        })
        .await
    }

    /// Shared row-locked read-check-transition for approve/reject: selects
    /// `FOR UPDATE`, validates current state, then runs `apply` to perform
    /// the actual `UPDATE ... RETURNING *` within the same transaction.
    async fn transition_locked<F, Fut>(
        &self,
        user_id: Uuid,
        action_id: Uuid,
        target: ProposedActionStatus,
        apply: F,
    ) -> Result<ProposedAction>
    where
        F: for<'c> FnOnce(
            &'c mut sqlx::Transaction<'_, sqlx::Postgres>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<sqlx::postgres::PgRow>> + Send + 'c>,
        >,
    {
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            let locked = sqlx::query_as::<_, ProposedAction>(
                "SELECT * FROM proposed_actions WHERE id = $1 FOR UPDATE",
            )
            .bind(action_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(CoreError::from)?;

            let Some(current) = locked else {
                return Err(CoreError::NotFound(format!(
                    "Action {action_id} not found or not owned by user."
                )));
            };

            if !current.status.can_transition_to(target) {
                warn!(audit = true, action_id = %action_id, current = %current.status, "ACTION_APPROVAL_FAILED");
                return Err(CoreError::InvalidState(format!(
                    "Action {action_id} is not in a proposed state (current: {}).",
                    current.status
                )));
            }

            let row = apply(tx).await?;
            sqlx::FromRow::from_row(&row).map_err(CoreError::from)
        }))
        .await
    }
}

//! Generic department worker consume loop. A concrete department supplies a
//! [`DepartmentHandler`]; this module owns the idempotency check, status
//! bookkeeping, retry policy, and ack/nack semantics shared by all six.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use meridian_shared::error::{CoreError, Result};
use meridian_shared::messaging::MessageBroker;
use meridian_shared::models::AgentTaskStatus;
use meridian_shared::retry::{retry_with_backoff, RetryOutcome, RetryPolicy};
use meridian_shared::tenant::with_tenant;
use meridian_shared::vault::CredentialVault;
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};

use crate::context::TaskContext;
use crate::message::DepartmentMessage;

const RECEIVE_BATCH: i64 = 4;
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(120);
const IDLE_POLL: Duration = Duration::from_millis(500);

#[async_trait]
pub trait DepartmentHandler: Send + Sync {
    /// Runs the department's analysis for one task. The returned JSON value
    /// is stored verbatim onto `AgentTask.output_data` and surfaces to the
    /// orchestrator's aggregation step.
    async fn handle(&self, ctx: &TaskContext) -> Result<serde_json::Value>;
}

pub struct DepartmentWorker<H: DepartmentHandler> {
    queue: &'static str,
    handler: H,
    pool: PgPool,
    broker: MessageBroker,
    vault: CredentialVault,
    cache_ttl: Duration,
    retry_policy: RetryPolicy,
}

impl<H: DepartmentHandler> DepartmentWorker<H> {
    pub fn new(
        queue: &'static str,
        handler: H,
        pool: PgPool,
        broker: MessageBroker,
        vault: CredentialVault,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            pool,
            broker,
            vault,
            cache_ttl,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let messages = match self
                .broker
                .receive::<DepartmentMessage>(self.queue, RECEIVE_BATCH, VISIBILITY_TIMEOUT)
                .await
            {
                Ok(messages) => messages,
                Err(err) => {
                    error!(%err, queue = self.queue, "failed to read from department queue");
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
                        if let Err(err) = self.broker.ack(self.queue, msg.msg_id).await {
                            error!(%err, msg_id = msg.msg_id, "failed to ack department message");
                        }
                    }
                    Err(infra_err) => {
                        warn!(%infra_err, msg_id = msg.msg_id, "infrastructural failure, requeuing");
                        if let Err(err) = self.broker.nack(self.queue, msg.msg_id, true).await {
                            error!(%err, msg_id = msg.msg_id, "failed to requeue department message");
                        }
                    }
                }
            }
        }
    }

    /// Runs one task to a terminal outcome. Only database/queue
    /// infrastructure errors propagate as `Err` (triggering requeue); a
    /// handler failure exhausting retries is recorded on the task row and
    /// treated as handled.
    async fn process(&self, msg: &DepartmentMessage) -> Result<()> {
        if self.already_terminal(msg.user_id, msg.task_id).await? {
            info!(task_id = %msg.task_id, "task already in a terminal state, skipping");
            return Ok(());
        }

        self.set_status(msg.user_id, msg.task_id, AgentTaskStatus::Running, None, None).await?;

        let ctx = TaskContext::new(msg, self.pool.clone(), self.vault.clone(), self.cache_ttl);

        let outcome = retry_with_backoff(&self.retry_policy, |attempt| {
            let ctx = &ctx;
            async move {
                if attempt > 1 {
                    self.set_status(msg.user_id, msg.task_id, AgentTaskStatus::Retrying, None, None).await.ok();
                    self.set_status(msg.user_id, msg.task_id, AgentTaskStatus::Running, None, None).await.ok();
                }
                self.handler.handle(ctx).await
            }
        })
        .await;

        match outcome {
            RetryOutcome::Succeeded { value, .. } => {
                self.set_status(msg.user_id, msg.task_id, AgentTaskStatus::Completed, Some(value), None).await
            }
            RetryOutcome::Exhausted { error, attempts } => {
                warn!(task_id = %msg.task_id, attempts, %error, "department task exhausted retries");
                self.set_status(msg.user_id, msg.task_id, AgentTaskStatus::Failed, None, Some(error.to_string())).await
            }
        }
    }

    async fn already_terminal(&self, user_id: uuid::Uuid, task_id: uuid::Uuid) -> Result<bool> {
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            let row = sqlx::query("SELECT status FROM agent_tasks WHERE id = $1")
                .bind(task_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(CoreError::from)?;
            let status: String = row.try_get("status").map_err(CoreError::from)?;
            Ok(matches!(status.as_str(), "completed" | "failed" | "cancelled"))
        }))
        .await
    }

    async fn set_status(
        &self,
        user_id: uuid::Uuid,
        task_id: uuid::Uuid,
        status: AgentTaskStatus,
        output: Option<serde_json::Value>,
        error_log: Option<String>,
    ) -> Result<()> {
        let completed_at = matches!(status, AgentTaskStatus::Completed | AgentTaskStatus::Failed | AgentTaskStatus::Cancelled)
            .then(Utc::now);
        let started_at = matches!(status, AgentTaskStatus::Running).then(Utc::now);

        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE agent_tasks
                SET status = $2,
                    output_data = coalesce($3, output_data),
                    logs = coalesce($4, logs),
                    retry_count = retry_count + (CASE WHEN $2 = 'retrying' THEN 1 ELSE 0 END),
                    started_at = coalesce($5, started_at),
                    completed_at = coalesce($6, completed_at),
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(task_id)
            .bind(status.to_string())
            .bind(&output)
            .bind(&error_log)
            .bind(started_at)
            .bind(completed_at)
            .execute(&mut **tx)
            .await
            .map_err(CoreError::from)?;
            Ok(())
        }))
        .await
    }
}

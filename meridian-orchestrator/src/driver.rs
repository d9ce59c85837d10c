//! The `ingest` queue consume loop: for every inbound analysis request,
//! loads or resumes its planning state, drives the node graph to a terminal
//! outcome, and persists the result back onto `AnalysisRequest`.

use std::time::Duration;

use chrono::Utc;
use meridian_shared::error::{CoreError, Result};
use meridian_shared::llm::LlmClient;
use meridian_shared::messaging::{MessageBroker, INGEST_QUEUE};
use meridian_shared::models::{AnalysisRequest, AnalysisRequestStatus, LinkedAccount};
use meridian_shared::tenant::with_tenant;
use meridian_shared::update_bus::{InProcessUpdateBus, UpdateBus, UpdateSnapshot};
use serde::Deserialize;
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::checkpoint::Checkpointer;
use crate::nodes;
use crate::state::{NodeOutcome, OrchestratorNode, PlanningState};

const RECEIVE_BATCH: i64 = 4;
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(120);
const IDLE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
pub struct IngestMessage {
    pub user_id: Uuid,
    pub analysis_request_id: Uuid,
}

pub struct Driver {
    pool: PgPool,
    broker: MessageBroker,
    checkpointer: Checkpointer,
    update_bus: InProcessUpdateBus,
    llm: LlmClient,
    planner_model: String,
    aggregator_model: String,
}

impl Driver {
    pub fn new(
        pool: PgPool,
        broker: MessageBroker,
        update_bus: InProcessUpdateBus,
        llm: LlmClient,
        planner_model: String,
        aggregator_model: String,
    ) -> Self {
        let checkpointer = Checkpointer::new(pool.clone());
        Self { pool, broker, checkpointer, update_bus, llm, planner_model, aggregator_model }
    }

    /// Runs until `shutdown` resolves. Each pass drains up to
    /// [`RECEIVE_BATCH`] ingest messages; an empty batch sleeps briefly
    /// before polling again.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let messages = match self.broker.receive::<IngestMessage>(INGEST_QUEUE, RECEIVE_BATCH, VISIBILITY_TIMEOUT).await {
                Ok(messages) => messages,
                Err(err) => {
                    error!(%err, "failed to read from ingest queue");
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
                let infrastructural_failure = self.process(&msg.message).await.is_err();
                if infrastructural_failure {
                    if let Err(err) = self.broker.nack(INGEST_QUEUE, msg.msg_id, true).await {
                        error!(%err, msg_id = msg.msg_id, "failed to nack ingest message");
                    }
                } else if let Err(err) = self.broker.ack(INGEST_QUEUE, msg.msg_id).await {
                    error!(%err, msg_id = msg.msg_id, "failed to ack ingest message");
                }
            }
        }
    }

    /// Processes one ingest message end to end. Returns `Err` only for
    /// infrastructural failures (DB/queue unreachable) that warrant
    /// redelivery; logical failures (bad plan, failed department task) are
    /// recorded onto the request and treated as a handled outcome.
    async fn process(&self, msg: &IngestMessage) -> Result<()> {
        let request = self.load_request(msg.user_id, msg.analysis_request_id).await?;
        let shop_domain = self.load_shop_domain(msg.user_id, request.linked_account_id).await?;

        self.transition_request(msg.user_id, request.id, AnalysisRequestStatus::Processing, None, None).await?;
        self.publish_snapshot(&request, AnalysisRequestStatus::Processing, None, None).await;

        let mut state = match self.checkpointer.get(msg.user_id, msg.analysis_request_id).await {
            Ok(Some(resumed)) => {
                info!(analysis_request_id = %msg.analysis_request_id, node = ?resumed.current_node, "resuming from checkpoint");
                resumed
            }
            Ok(None) => PlanningState::new(request.id, request.user_id, shop_domain, request.prompt.clone()),
            Err(err) => {
                warn!(%err, "checkpoint lookup failed, starting fresh");
                PlanningState::new(request.id, request.user_id, shop_domain, request.prompt.clone())
            }
        };

        loop {
            let outcome = self.run_node(&mut state, request.linked_account_id).await;
            self.checkpointer.put(msg.user_id, msg.analysis_request_id, &state).await?;

            match outcome {
                NodeOutcome::Continue(next) => state.current_node = next,
                NodeOutcome::Terminal => break,
            }
        }

        if let Some(error) = state.error.clone() {
            self.transition_request(msg.user_id, request.id, AnalysisRequestStatus::Failed, None, Some(error.clone())).await?;
            self.publish_snapshot(&request, AnalysisRequestStatus::Failed, None, Some(error)).await;
        } else {
            let summary = state.final_result.clone();
            self.transition_request(msg.user_id, request.id, AnalysisRequestStatus::Completed, summary.clone(), None).await?;
            self.publish_snapshot(&request, AnalysisRequestStatus::Completed, summary, None).await;
        }

        Ok(())
    }

    async fn run_node(&self, state: &mut PlanningState, linked_account_id: Uuid) -> NodeOutcome {
        match state.current_node {
            OrchestratorNode::Plan => nodes::plan(state, &self.llm, &self.planner_model).await,
            OrchestratorNode::Dispatch => nodes::dispatch(state, &self.pool, &self.broker, linked_account_id).await,
            OrchestratorNode::CheckStatus => nodes::check_status(state, &self.pool).await,
            OrchestratorNode::Aggregate => nodes::aggregate(state, &self.llm, &self.aggregator_model).await,
            OrchestratorNode::HandleError => nodes::handle_error(state).await,
        }
    }

    async fn load_request(&self, user_id: Uuid, analysis_request_id: Uuid) -> Result<AnalysisRequest> {
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            sqlx::query_as::<_, AnalysisRequest>("SELECT * FROM analysis_requests WHERE id = $1")
                .bind(analysis_request_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(CoreError::from)
        }))
        .await
    }

    async fn load_shop_domain(&self, user_id: Uuid, linked_account_id: Uuid) -> Result<String> {
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            let account = sqlx::query_as::<_, LinkedAccount>("SELECT * FROM linked_accounts WHERE id = $1")
                .bind(linked_account_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(CoreError::from)?;
            Ok(account.account_name)
        }))
        .await
    }

    async fn transition_request(
        &self,
        user_id: Uuid,
        analysis_request_id: Uuid,
        status: AnalysisRequestStatus,
        result_summary: Option<String>,
        error_message: Option<String>,
    ) -> Result<()> {
        let completed_at = status.is_terminal().then(Utc::now);
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE analysis_requests
                SET status = $2, result_summary = coalesce($3, result_summary),
                    error_message = $4, completed_at = $5, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(analysis_request_id)
            .bind(status.to_string())
            .bind(&result_summary)
            .bind(&error_message)
            .bind(completed_at)
            .execute(&mut **tx)
            .await
            .map_err(CoreError::from)?;
            Ok(())
        }))
        .await
    }

    async fn publish_snapshot(
        &self,
        request: &AnalysisRequest,
        status: AnalysisRequestStatus,
        result_summary: Option<String>,
        error_message: Option<String>,
    ) {
        let now = Utc::now();
        self.update_bus.publish(UpdateSnapshot {
            id: request.id,
            user_id: request.user_id,
            prompt: request.prompt.clone(),
            status,
            result_summary,
            result_data: None,
            error_message,
            proposed_actions: Vec::new(),
            created_at: request.created_at,
            updated_at: now,
            completed_at: status.is_terminal().then_some(now),
        });
    }
}

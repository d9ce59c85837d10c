//! Turns upstream analysis into recommendations. Any `[PROPOSED_ACTION]`
//! block in the model's output becomes a row awaiting human approval
//! before anything is ever executed against the commerce backend.

use async_trait::async_trait;
use meridian_shared::error::Result;
use meridian_shared::hitl::{parse_proposed_actions, ActionService};
use meridian_shared::llm::LlmClient;
use meridian_shared::messaging::MessageBroker;
use serde_json::json;
use sqlx::PgPool;
use tracing::warn;

use crate::context::TaskContext;
use crate::department::DepartmentHandler;

pub struct RecommendationHandler {
    pub llm: LlmClient,
    pub model: String,
    pub pool: PgPool,
    pub broker: MessageBroker,
}

#[async_trait]
impl DepartmentHandler for RecommendationHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<serde_json::Value> {
        let prompt = format!(
            "Based on the following analysis, recommend concrete next steps. Where a recommendation \
             can be carried out directly against the commerce backend, include a [PROPOSED_ACTION] \
             block with action_type, description, and parameters (a JSON object): {}\n\nTask: {}",
            ctx.task_details, ctx.description
        );
        let summary = self.llm.complete(&self.model, &prompt).await?;

        let proposals = parse_proposed_actions(&summary);
        if !proposals.is_empty() {
            let service = ActionService::new(self.pool.clone(), self.broker.clone());
            if let Err(err) = service
                .create_proposed_actions(ctx.user_id, ctx.analysis_request_id, ctx.linked_account_id, &proposals)
                .await
            {
                warn!(%err, task_id = %ctx.task_id, "failed to persist proposed actions from recommendation department");
            }
        }

        Ok(json!({ "summary": summary, "proposed_action_count": proposals.len() }))
    }
}

//! Forecasts near-term trends (demand, churn, inventory runway) from
//! historical data surfaced earlier in the plan.

use async_trait::async_trait;
use meridian_shared::error::Result;
use meridian_shared::llm::LlmClient;
use serde_json::json;

use crate::context::TaskContext;
use crate::department::DepartmentHandler;

pub struct PredictiveHandler {
    pub llm: LlmClient,
    pub model: String,
}

#[async_trait]
impl DepartmentHandler for PredictiveHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<serde_json::Value> {
        let prompt = format!(
            "Forecast near-term trends from this data and state your confidence: {}\n\nTask: {}",
            ctx.task_details, ctx.description
        );
        let summary = self.llm.complete(&self.model, &prompt).await?;
        Ok(json!({ "summary": summary }))
    }
}

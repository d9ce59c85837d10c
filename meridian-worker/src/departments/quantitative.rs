//! Statistical analysis over data the `data_retrieval` department already
//! fetched: trends, aggregates, period-over-period deltas.

use async_trait::async_trait;
use meridian_shared::error::Result;
use meridian_shared::llm::LlmClient;
use serde_json::json;

use crate::context::TaskContext;
use crate::department::DepartmentHandler;

pub struct QuantitativeHandler {
    pub llm: LlmClient,
    pub model: String,
}

#[async_trait]
impl DepartmentHandler for QuantitativeHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<serde_json::Value> {
        let prompt = format!(
            "Perform a quantitative analysis of the following commerce data. \
             Report concrete numbers (totals, growth rates, averages): {}\n\nTask: {}",
            ctx.task_details, ctx.description
        );
        let summary = self.llm.complete(&self.model, &prompt).await?;
        Ok(json!({ "summary": summary }))
    }
}

//! Compares performance across time windows, product lines, or channels.

use async_trait::async_trait;
use meridian_shared::error::Result;
use meridian_shared::llm::LlmClient;
use serde_json::json;

use crate::context::TaskContext;
use crate::department::DepartmentHandler;

pub struct ComparativeHandler {
    pub llm: LlmClient,
    pub model: String,
}

#[async_trait]
impl DepartmentHandler for ComparativeHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<serde_json::Value> {
        let prompt = format!(
            "Compare the segments described in this task against each other and call out the \
             largest differences: {}\n\nTask: {}",
            ctx.task_details, ctx.description
        );
        let summary = self.llm.complete(&self.model, &prompt).await?;
        Ok(json!({ "summary": summary }))
    }
}

//! Narrative analysis: customer sentiment, review themes, qualitative
//! read of merchandising or support data.

use async_trait::async_trait;
use meridian_shared::error::Result;
use meridian_shared::llm::LlmClient;
use serde_json::json;

use crate::context::TaskContext;
use crate::department::DepartmentHandler;

pub struct QualitativeHandler {
    pub llm: LlmClient,
    pub model: String,
}

#[async_trait]
impl DepartmentHandler for QualitativeHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<serde_json::Value> {
        let prompt = format!(
            "Perform a qualitative analysis of the following commerce data, focusing on themes, \
             sentiment, and customer experience rather than raw numbers: {}\n\nTask: {}",
            ctx.task_details, ctx.description
        );
        let summary = self.llm.complete(&self.model, &prompt).await?;
        Ok(json!({ "summary": summary }))
    }
}

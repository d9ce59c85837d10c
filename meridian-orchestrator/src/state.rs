//! The orchestrator's typed planning state, serialized verbatim into
//! `AnalysisRequest.agent_state` as the checkpoint blob.

use meridian_shared::messaging::Department;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step: u32,
    pub department: Department,
    pub task_details: serde_json::Value,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: Uuid,
    pub department: Department,
    pub status: TaskStatus,
    pub input_payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AggregatedResult {
    Ok { output: serde_json::Value },
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningState {
    pub analysis_request_id: Uuid,
    pub user_id: Uuid,
    pub shop_domain: String,
    pub original_prompt: String,
    pub plan: Option<Vec<Step>>,
    pub dispatched_tasks: Vec<TaskInfo>,
    pub aggregated_results: std::collections::HashMap<Uuid, AggregatedResult>,
    pub final_result: Option<String>,
    pub error: Option<String>,
    pub current_node: OrchestratorNode,
}

impl PlanningState {
    pub fn new(analysis_request_id: Uuid, user_id: Uuid, shop_domain: String, original_prompt: String) -> Self {
        Self {
            analysis_request_id,
            user_id,
            shop_domain,
            original_prompt,
            plan: None,
            dispatched_tasks: Vec::new(),
            aggregated_results: std::collections::HashMap::new(),
            final_result: None,
            error: None,
            current_node: OrchestratorNode::Plan,
        }
    }

    pub fn all_steps_dispatched(&self) -> bool {
        match &self.plan {
            Some(steps) => self.dispatched_tasks.len() >= steps.len(),
            None => true,
        }
    }

    pub fn all_dispatched_terminal(&self) -> bool {
        self.dispatched_tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn any_dispatched_failed(&self) -> bool {
        self.dispatched_tasks.iter().any(|t| t.status == TaskStatus::Failed)
    }
}

/// The five graph nodes. Enum dispatch over a plain `match`, matching the
/// "no trait objects for closed, small dispatch sets" convention this
/// codebase uses throughout its messaging layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorNode {
    Plan,
    Dispatch,
    CheckStatus,
    Aggregate,
    HandleError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    Continue(OrchestratorNode),
    Terminal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PlanningState {
        PlanningState::new(Uuid::new_v4(), Uuid::new_v4(), "acme.myshopify.com".into(), "how are sales trending?".into())
    }

    #[test]
    fn no_plan_counts_as_fully_dispatched() {
        assert!(state().all_steps_dispatched());
    }

    #[test]
    fn not_dispatched_until_every_step_has_a_task() {
        let mut s = state();
        s.plan = Some(vec![Step {
            step: 1,
            department: Department::DataRetrieval,
            task_details: serde_json::json!({}),
            description: "pull orders".into(),
        }]);
        assert!(!s.all_steps_dispatched());
        s.dispatched_tasks.push(TaskInfo {
            task_id: Uuid::new_v4(),
            department: Department::DataRetrieval,
            status: TaskStatus::Pending,
            input_payload: serde_json::json!({}),
            result: None,
            error_message: None,
        });
        assert!(s.all_steps_dispatched());
    }

    #[test]
    fn no_dispatched_tasks_is_vacuously_terminal() {
        assert!(state().all_dispatched_terminal());
    }
}

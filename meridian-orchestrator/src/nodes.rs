//! The five node-execution functions. Each takes the current
//! [`PlanningState`] plus whatever collaborators it needs and returns a
//! [`NodeOutcome`] telling the driver which node runs next.

use std::time::Duration;

use meridian_shared::error::{CoreError, Result};
use meridian_shared::llm::LlmClient;
use meridian_shared::messaging::{Department, MessageBroker};
use meridian_shared::tenant::with_tenant;
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::{AggregatedResult, NodeOutcome, OrchestratorNode, PlanningState, Step, TaskInfo, TaskStatus};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Asks the planner model to break the prompt into department steps. Expects
/// a JSON array of `{step, department, task_details, description}` objects
/// back; anything else routes to [`handle_error`].
pub async fn plan(state: &mut PlanningState, llm: &LlmClient, model: &str) -> NodeOutcome {
    let prompt = format!(
        "Shop: {}\nUser request: {}\n\nRespond with a JSON array of steps, each an object with \
         step (integer), department (one of data_retrieval, quantitative, qualitative, \
         recommendation, comparative, predictive), task_details (object), and description (string).",
        state.shop_domain, state.original_prompt
    );

    let raw = match llm.complete(model, &prompt).await {
        Ok(raw) => raw,
        Err(err) => {
            state.error = Some(format!("planner call failed: {err}"));
            return NodeOutcome::Continue(OrchestratorNode::HandleError);
        }
    };

    match serde_json::from_str::<Vec<Step>>(&raw) {
        Ok(steps) => {
            state.plan = Some(steps);
            NodeOutcome::Continue(OrchestratorNode::Dispatch)
        }
        Err(err) => {
            state.error = Some(format!("planner returned unparseable steps: {err}"));
            NodeOutcome::Continue(OrchestratorNode::HandleError)
        }
    }
}

/// Inserts one `AgentTask` row per undispatched step and publishes it to the
/// step's department queue. Idempotent across resumes: only steps without a
/// matching entry in `dispatched_tasks` are dispatched.
pub async fn dispatch(
    state: &mut PlanningState,
    pool: &PgPool,
    broker: &MessageBroker,
    linked_account_id: Uuid,
) -> NodeOutcome {
    let Some(steps) = state.plan.clone() else {
        state.error = Some("dispatch reached with no plan".to_string());
        return NodeOutcome::Continue(OrchestratorNode::HandleError);
    };

    for step in steps.iter().skip(state.dispatched_tasks.len()) {
        match dispatch_step(state.user_id, state.analysis_request_id, linked_account_id, step, pool, broker).await {
            Ok(task) => state.dispatched_tasks.push(task),
            Err(err) => {
                state.error = Some(format!("failed to dispatch step {}: {err}", step.step));
                return NodeOutcome::Continue(OrchestratorNode::HandleError);
            }
        }
    }

    NodeOutcome::Continue(OrchestratorNode::CheckStatus)
}

async fn dispatch_step(
    user_id: Uuid,
    analysis_request_id: Uuid,
    linked_account_id: Uuid,
    step: &Step,
    pool: &PgPool,
    broker: &MessageBroker,
) -> Result<TaskInfo> {
    let task_id = with_tenant(pool, user_id, |tx| Box::pin(async move {
        let row = sqlx::query(
            r#"
            INSERT INTO agent_tasks
                (id, user_id, analysis_request_id, task_type, status, input_data, retry_count, created_at, updated_at)
            VALUES (gen_random_uuid(), $1, $2, $3, 'pending', $4, 0, now(), now())
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(analysis_request_id)
        .bind(step.department.queue_name())
        .bind(&step.task_details)
        .fetch_one(&mut **tx)
        .await
        .map_err(CoreError::from)?;
        row.try_get::<Uuid, _>("id").map_err(CoreError::from)
    }))
    .await?;

    let payload = json!({
        "task_id": task_id,
        "user_id": user_id,
        "analysis_request_id": analysis_request_id,
        "linked_account_id": linked_account_id,
        "department": step.department,
        "task_details": step.task_details,
        "description": step.description,
    });
    broker
        .publish(step.department.queue_name(), &payload)
        .await
        .map_err(|e| CoreError::Unexpected(e.to_string()))?;

    info!(%task_id, department = step.department.queue_name(), "dispatched task");

    Ok(TaskInfo {
        task_id,
        department: step.department,
        status: TaskStatus::Pending,
        input_payload: step.task_details.clone(),
        result: None,
        error_message: None,
    })
}

/// Polls every dispatched task's current row and mirrors it into
/// `state.dispatched_tasks`. Sleeps and re-polls until every task reaches a
/// terminal status.
pub async fn check_status(state: &mut PlanningState, pool: &PgPool) -> NodeOutcome {
    for task in &mut state.dispatched_tasks {
        if task.status.is_terminal() {
            continue;
        }
        match load_task_status(state.user_id, task.task_id, pool).await {
            Ok((status, result, error_message)) => {
                task.status = status;
                task.result = result;
                task.error_message = error_message;
            }
            Err(err) => {
                warn!(%err, task_id = %task.task_id, "failed to poll task status, will retry");
            }
        }
    }

    if !state.all_dispatched_terminal() {
        tokio::time::sleep(POLL_INTERVAL).await;
        return NodeOutcome::Continue(OrchestratorNode::CheckStatus);
    }

    if state.any_dispatched_failed() {
        let failed: Vec<_> = state
            .dispatched_tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| format!("{} ({})", t.task_id, t.error_message.clone().unwrap_or_default()))
            .collect();
        state.error = Some(format!("one or more department tasks failed: {}", failed.join(", ")));
        return NodeOutcome::Continue(OrchestratorNode::HandleError);
    }

    for task in &state.dispatched_tasks {
        let outcome = match &task.result {
            Some(output) => AggregatedResult::Ok { output: output.clone() },
            None => AggregatedResult::Error { error: "task completed without a result payload".to_string() },
        };
        state.aggregated_results.insert(task.task_id, outcome);
    }

    NodeOutcome::Continue(OrchestratorNode::Aggregate)
}

async fn load_task_status(
    user_id: Uuid,
    task_id: Uuid,
    pool: &PgPool,
) -> Result<(TaskStatus, Option<serde_json::Value>, Option<String>)> {
    with_tenant(pool, user_id, |tx| Box::pin(async move {
        let row = sqlx::query("SELECT status, output_data, logs FROM agent_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(CoreError::from)?;
        let status_raw: String = row.try_get("status").map_err(CoreError::from)?;
        let status = match status_raw.as_str() {
            "pending" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "retrying" => TaskStatus::Retrying,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "cancelled" => TaskStatus::Cancelled,
            other => return Err(CoreError::Parse(format!("unknown agent task status: {other}"))),
        };
        let output: Option<serde_json::Value> = row.try_get("output_data").map_err(CoreError::from)?;
        let logs: Option<String> = row.try_get("logs").map_err(CoreError::from)?;
        Ok((status, output, if status == TaskStatus::Failed { logs } else { None }))
    }))
    .await
}

/// Summarizes the aggregated department results into prose via the
/// aggregator model. Any action proposal the model recommends is left in the
/// summary text; turning free-form recommendations into `ProposedAction` rows
/// is the recommendation department worker's job, not this node's.
pub async fn aggregate(state: &mut PlanningState, llm: &LlmClient, model: &str) -> NodeOutcome {
    let results_json = serde_json::to_string_pretty(&state.aggregated_results).unwrap_or_default();
    let prompt = format!(
        "User asked: {}\n\nDepartment results:\n{}\n\nWrite a concise summary for the user.",
        state.original_prompt, results_json
    );

    let summary = match llm.complete(model, &prompt).await {
        Ok(summary) => summary,
        Err(err) => {
            state.error = Some(format!("aggregator call failed: {err}"));
            return NodeOutcome::Continue(OrchestratorNode::HandleError);
        }
    };

    state.final_result = Some(summary);
    NodeOutcome::Terminal
}

/// Records the accumulated error onto the state. The driver persists it onto
/// `AnalysisRequest.error_message` and publishes a `failed` snapshot.
pub async fn handle_error(state: &mut PlanningState) -> NodeOutcome {
    if state.error.is_none() {
        state.error = Some("unspecified orchestration failure".to_string());
    }
    NodeOutcome::Terminal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_enum_round_trips_through_task_dispatch_payload() {
        let step = Step {
            step: 1,
            department: Department::Quantitative,
            task_details: json!({"metric": "revenue"}),
            description: "compute revenue trend".into(),
        };
        let payload = json!({ "department": step.department });
        assert_eq!(payload["department"], "quantitative");
    }
}

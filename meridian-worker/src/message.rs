//! Wire payload a department queue carries, matching the fields the
//! orchestrator's dispatch step publishes.

use meridian_shared::messaging::Department;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct DepartmentMessage {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub analysis_request_id: Uuid,
    pub linked_account_id: Uuid,
    pub department: Department,
    pub task_details: serde_json::Value,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_orchestrator_dispatch_payload() {
        let payload = serde_json::json!({
            "task_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "analysis_request_id": Uuid::new_v4(),
            "linked_account_id": Uuid::new_v4(),
            "department": "quantitative",
            "task_details": {"metric": "revenue"},
            "description": "compute revenue trend",
        });
        let msg: DepartmentMessage = serde_json::from_value(payload).unwrap();
        assert_eq!(msg.department, Department::Quantitative);
        assert_eq!(msg.task_details["metric"], "revenue");
    }
}

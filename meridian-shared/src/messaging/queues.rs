//! Fixed queue topology. Unlike the teacher's namespace-templated worker
//! queues, every queue name here is a literal constant — the department set
//! is closed and known at compile time.

use super::MessagingError;

pub const INGEST_QUEUE: &str = "ingest";
pub const ACTION_EXECUTE_QUEUE: &str = "action.execute";

pub const DEPARTMENT_QUEUES: [&str; 6] = [
    "dept.data_retrieval",
    "dept.quantitative",
    "dept.qualitative",
    "dept.recommendation",
    "dept.comparative",
    "dept.predictive",
];

/// Department identifiers, mirrored 1:1 with [`DEPARTMENT_QUEUES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    DataRetrieval,
    Quantitative,
    Qualitative,
    Recommendation,
    Comparative,
    Predictive,
}

impl Department {
    pub const ALL: [Department; 6] = [
        Department::DataRetrieval,
        Department::Quantitative,
        Department::Qualitative,
        Department::Recommendation,
        Department::Comparative,
        Department::Predictive,
    ];

    pub fn queue_name(self) -> &'static str {
        match self {
            Department::DataRetrieval => "dept.data_retrieval",
            Department::Quantitative => "dept.quantitative",
            Department::Qualitative => "dept.qualitative",
            Department::Recommendation => "dept.recommendation",
            Department::Comparative => "dept.comparative",
            Department::Predictive => "dept.predictive",
        }
    }

    pub fn from_queue_name(name: &str) -> Option<Self> {
        Department::ALL.into_iter().find(|d| d.queue_name() == name)
    }
}

/// All queues that must be declared (with their DLQs) at startup.
pub fn all_queues() -> Vec<&'static str> {
    let mut queues = vec![INGEST_QUEUE, ACTION_EXECUTE_QUEUE];
    queues.extend(DEPARTMENT_QUEUES);
    queues
}

/// Companion dead-letter queue name for a primary queue.
pub fn dlq_name(queue: &str) -> String {
    format!("{queue}_dlq")
}

pub fn validate_queue_name(name: &str) -> Result<(), MessagingError> {
    if name.is_empty() || name.len() > 63 {
        return Err(MessagingError::invalid_queue_name(
            name,
            "must be 1-63 characters",
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(MessagingError::invalid_queue_name(
            name,
            "only alphanumerics, '_' and '.' are permitted",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_queues_has_eight_entries() {
        assert_eq!(all_queues().len(), 8);
    }

    #[test]
    fn dlq_name_appends_suffix() {
        assert_eq!(dlq_name("ingest"), "ingest_dlq");
        assert_eq!(dlq_name("dept.quantitative"), "dept.quantitative_dlq");
    }

    #[test]
    fn department_round_trips_through_queue_name() {
        for dept in Department::ALL {
            assert_eq!(Department::from_queue_name(dept.queue_name()), Some(dept));
        }
        assert_eq!(Department::from_queue_name("ingest"), None);
    }

    #[test]
    fn validate_rejects_injection_attempt() {
        assert!(validate_queue_name("bad;DROP TABLE").is_err());
        assert!(validate_queue_name("dept.quantitative").is_ok());
    }
}

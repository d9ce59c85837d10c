//! Configuration for queue naming and NOTIFY-trigger behavior.

/// Controls how the client names queues and whether it expects the database
/// to carry `pg_notify` triggers on `pgmq` tables (see `migrations/0003_pgmq_notify.sql`).
///
/// `enable_triggers` does not install triggers itself — it is a client-side
/// flag read by callers deciding whether a push-notification listener is
/// worth starting, falling back to polling otherwise (see [`crate::client::PgmqClient::has_notify_capabilities`]).
#[derive(Debug, Clone, PartialEq)]
pub struct PgmqNotifyConfig {
    /// Regex pattern (with a `namespace` capture group) used to derive a
    /// logical namespace from a queue name, e.g. `worker_{ns}_queue`.
    pub queue_naming_pattern: String,
    pub enable_triggers: bool,
    pub default_namespaces: Vec<String>,
}

impl Default for PgmqNotifyConfig {
    fn default() -> Self {
        Self {
            queue_naming_pattern: r"(?P<namespace>\w+)_queue".to_string(),
            enable_triggers: false,
            default_namespaces: Vec::new(),
        }
    }
}

impl PgmqNotifyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_triggers_enabled(mut self, enabled: bool) -> Self {
        self.enable_triggers = enabled;
        self
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespaces.push(namespace.into());
        self
    }

    pub fn with_queue_naming_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.queue_naming_pattern = pattern.into();
        self
    }
}

//! Domain-level facade over [`meridian_pgmq::PgmqClient`], analogous to the
//! teacher's `MessageClient`: wraps the queue client plus an optional
//! circuit breaker, with queue-management operations bypassing the breaker
//! (startup/admin work and observability must still function when the
//! breaker is open).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use meridian_pgmq::{PgmqClient, QueueMetrics, ReadMessage};

use super::queues::{all_queues, dlq_name, validate_queue_name};
use super::MessagingError;
use crate::resilience::{CircuitBreaker, CircuitBreakerBehavior};

#[derive(Clone)]
pub struct MessageBroker {
    client: Arc<PgmqClient>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl std::fmt::Debug for MessageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBroker")
            .field("has_circuit_breaker", &self.circuit_breaker.is_some())
            .finish()
    }
}

impl MessageBroker {
    pub fn new(client: PgmqClient) -> Self {
        Self {
            client: Arc::new(client),
            circuit_breaker: None,
        }
    }

    pub fn with_circuit_breaker(client: PgmqClient, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: Arc::new(client),
            circuit_breaker: Some(circuit_breaker),
        }
    }

    pub fn client(&self) -> &PgmqClient {
        &self.client
    }

    async fn with_breaker<F, T, Fut>(&self, op: F) -> Result<T, MessagingError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, MessagingError>>,
    {
        let Some(cb) = &self.circuit_breaker else {
            return op().await;
        };
        if !cb.should_allow() {
            return Err(MessagingError::circuit_breaker_open("broker"));
        }
        let start = Instant::now();
        let result = op().await;
        match &result {
            Ok(_) => cb.record_success_manual(start.elapsed()),
            Err(_) => cb.record_failure_manual(start.elapsed()),
        }
        result
    }

    /// Declares every queue in the fixed topology plus its dead-letter
    /// companion. Idempotent; `pgmq.create` is a no-op on an existing queue.
    pub async fn ensure_topology(&self) -> Result<(), MessagingError> {
        for queue in all_queues() {
            validate_queue_name(queue)?;
            self.client.create_queue(queue).await?;
            self.client.create_queue(&dlq_name(queue)).await?;
        }
        Ok(())
    }

    pub async fn publish<T: Serialize + Sync>(
        &self,
        queue: &str,
        message: &T,
    ) -> Result<i64, MessagingError> {
        let client = Arc::clone(&self.client);
        let queue = queue.to_string();
        self.with_breaker(|| async move { Ok(client.send_message(&queue, message).await?) })
            .await
    }

    pub async fn receive<T: DeserializeOwned + Sync>(
        &self,
        queue: &str,
        max_messages: i64,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReadMessage<T>>, MessagingError> {
        let client = Arc::clone(&self.client);
        let queue_owned = queue.to_string();
        let raw = self
            .with_breaker(|| async move {
                Ok(client
                    .read_messages(
                        &queue_owned,
                        Some(visibility_timeout.as_secs() as i64),
                        Some(max_messages),
                    )
                    .await?)
            })
            .await?;
        raw.into_iter()
            .map(|m| {
                Ok(ReadMessage {
                    msg_id: m.msg_id,
                    read_ct: m.read_ct,
                    enqueued_at: m.enqueued_at,
                    vt: m.vt,
                    message: serde_json::from_value(m.message).map_err(MessagingError::from)?,
                })
            })
            .collect()
    }

    /// Deletes the message: the handler recorded a definitive outcome and
    /// the broker never needs to redeliver it.
    pub async fn ack(&self, queue: &str, msg_id: i64) -> Result<(), MessagingError> {
        self.client.delete_message(queue, msg_id).await?;
        Ok(())
    }

    /// `requeue = true` makes the message immediately visible again
    /// (infrastructural failure, worth retrying). `requeue = false` moves it
    /// to the paired dead-letter queue and deletes it from the original —
    /// pgmq has no native dead-letter routing, so this is done by hand.
    pub async fn nack(&self, queue: &str, msg_id: i64, requeue: bool) -> Result<(), MessagingError> {
        if requeue {
            self.client.set_visibility_timeout(queue, msg_id, 0).await?;
            return Ok(());
        }
        if let Some(found) = self
            .client
            .read_specific_message::<serde_json::Value>(queue, msg_id, 0)
            .await?
        {
            self.client
                .send_json_message(&dlq_name(queue), &found.message)
                .await?;
        }
        self.client.delete_message(queue, msg_id).await?;
        Ok(())
    }

    pub async fn queue_metrics(&self, queue: &str) -> Result<QueueMetrics, MessagingError> {
        Ok(self.client.queue_metrics(queue).await?)
    }

    pub async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(self.client.health_check().await?)
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }
}

//! In-process pub/sub fan-out of `AnalysisRequest` snapshots, grounded in
//! `app/services/pubsub_service.py`'s `analysis_request_updates:<id>` topic
//! naming. Best-effort, at-most-once, not persisted; slow subscribers are
//! dropped via `broadcast::error::RecvError::Lagged`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::AnalysisRequestStatus;

const DEFAULT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt: String,
    pub status: AnalysisRequestStatus,
    pub result_summary: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub proposed_actions: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Swappable behind a trait so an external pub/sub backing (Postgres
/// `LISTEN/NOTIFY`, in the style of `meridian-pgmq`'s notify listener) can
/// stand in without touching callers. The in-process registry below is the
/// only implementation the core ships.
pub trait UpdateBus: Send + Sync {
    fn publish(&self, snapshot: UpdateSnapshot);
    fn subscribe(&self, analysis_request_id: Uuid) -> broadcast::Receiver<UpdateSnapshot>;
}

#[derive(Debug)]
pub struct InProcessUpdateBus {
    channels: DashMap<Uuid, broadcast::Sender<UpdateSnapshot>>,
    capacity: usize,
}

impl InProcessUpdateBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { channels: DashMap::new(), capacity }
    }

    fn sender_for(&self, analysis_request_id: Uuid) -> broadcast::Sender<UpdateSnapshot> {
        self.channels
            .entry(analysis_request_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Drops the topic's sender once no subscribers remain, so a long-lived
    /// process doesn't accumulate an entry per historical analysis request.
    pub fn prune_if_idle(&self, analysis_request_id: Uuid) {
        if let Some(entry) = self.channels.get(&analysis_request_id) {
            if entry.receiver_count() == 0 {
                drop(entry);
                self.channels.remove(&analysis_request_id);
            }
        }
    }
}

impl Default for InProcessUpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateBus for InProcessUpdateBus {
    fn publish(&self, snapshot: UpdateSnapshot) {
        let sender = self.sender_for(snapshot.id);
        // No subscribers is not an error: the request may be processing
        // with nobody watching yet.
        let _ = sender.send(snapshot);
    }

    fn subscribe(&self, analysis_request_id: Uuid) -> broadcast::Receiver<UpdateSnapshot> {
        self.sender_for(analysis_request_id).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: Uuid, status: AnalysisRequestStatus) -> UpdateSnapshot {
        let now = Utc::now();
        UpdateSnapshot {
            id,
            user_id: Uuid::new_v4(),
            prompt: "how are sales trending?".into(),
            status,
            result_summary: None,
            result_data: None,
            error_message: None,
            proposed_actions: vec![],
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_snapshot() {
        let bus = InProcessUpdateBus::new();
        let request_id = Uuid::new_v4();
        let mut rx = bus.subscribe(request_id);

        bus.publish(snapshot(request_id, AnalysisRequestStatus::Processing));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, request_id);
        assert_eq!(received.status, AnalysisRequestStatus::Processing);
    }

    #[tokio::test]
    async fn different_requests_are_isolated_topics() {
        let bus = InProcessUpdateBus::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = bus.subscribe(a);
        let _rx_b = bus.subscribe(b);

        bus.publish(snapshot(a, AnalysisRequestStatus::Completed));

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.id, a);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = InProcessUpdateBus::new();
        bus.publish(snapshot(Uuid::new_v4(), AnalysisRequestStatus::Pending));
    }

    #[tokio::test]
    async fn prune_removes_topic_once_subscribers_drop() {
        let bus = InProcessUpdateBus::new();
        let request_id = Uuid::new_v4();
        {
            let _rx = bus.subscribe(request_id);
            assert!(bus.channels.contains_key(&request_id));
        }
        bus.prune_if_idle(request_id);
        assert!(!bus.channels.contains_key(&request_id));
    }
}

//! Thin client over the `pgmq` Postgres extension's SQL surface.
//!
//! Deliberately talks to `pgmq.*` SQL functions directly with `sqlx::query`
//! rather than depending on the `pgmq` crate's Rust bindings: the extension's
//! SQL functions are the stable, versioned contract: the crate bindings churn
//! across pgmq releases faster than the SQL surface does.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::config::PgmqNotifyConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ReadMessage<T> {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: DateTime<Utc>,
    pub vt: DateTime<Utc>,
    pub message: T,
}

#[derive(Debug, Clone)]
pub struct QueueMetrics {
    pub queue_name: String,
    pub message_count: i64,
    pub oldest_msg_age_sec: Option<i32>,
    pub newest_msg_age_sec: Option<i32>,
    pub total_messages: i64,
}

#[derive(Debug, Clone)]
pub struct ClientStatus {
    pub connected: bool,
    pub client_type: String,
}

fn row_to_message<T: DeserializeOwned>(row: &sqlx::postgres::PgRow) -> Result<ReadMessage<T>> {
    let message_json: Value = row.try_get("message")?;
    let message: T = serde_json::from_value(message_json)?;
    Ok(ReadMessage {
        msg_id: row.try_get("msg_id")?,
        read_ct: row.try_get("read_ct")?,
        enqueued_at: row.try_get("enqueued_at")?,
        vt: row.try_get("vt")?,
        message,
    })
}

/// Queue client backed by a single `PgPool`. Every queue used by this
/// process must be declared (via [`PgmqClient::create_queue`]) before use;
/// the caller owns deciding which queues need a paired dead-letter queue.
#[derive(Debug, Clone)]
pub struct PgmqClient {
    pool: PgPool,
    config: PgmqNotifyConfig,
}

impl PgmqClient {
    pub async fn new_with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            config: PgmqNotifyConfig::default(),
        }
    }

    pub async fn new_with_pool_and_config(pool: PgPool, config: PgmqNotifyConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &PgmqNotifyConfig {
        &self.config
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn has_notify_capabilities(&self) -> bool {
        self.config.enable_triggers
    }

    pub fn extract_namespace(&self, queue_name: &str) -> Option<String> {
        let re = Regex::new(&self.config.queue_naming_pattern).ok()?;
        re.captures(queue_name)
            .and_then(|c| c.name("namespace"))
            .map(|m| m.as_str().to_string())
    }

    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn drop_queue(&self, queue_name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT pgmq.drop_queue($1) AS dropped")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("dropped")?)
    }

    pub async fn send_json_message(&self, queue_name: &str, message: &Value) -> Result<i64> {
        self.send_message_with_delay(queue_name, message, 0).await
    }

    pub async fn send_message<T: Serialize>(&self, queue_name: &str, message: &T) -> Result<i64> {
        let value = serde_json::to_value(message)?;
        self.send_json_message(queue_name, &value).await
    }

    pub async fn send_message_with_delay(
        &self,
        queue_name: &str,
        message: &Value,
        delay_seconds: i64,
    ) -> Result<i64> {
        let row = sqlx::query("SELECT * FROM pgmq.send($1, $2::jsonb, $3::integer) AS msg_id")
            .bind(queue_name)
            .bind(message)
            .bind(delay_seconds as i32)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("msg_id")?)
    }

    pub async fn send_with_transaction(
        &self,
        queue_name: &str,
        message: &Value,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<i64> {
        let row = sqlx::query("SELECT * FROM pgmq.send($1, $2::jsonb) AS msg_id")
            .bind(queue_name)
            .bind(message)
            .fetch_one(&mut **tx)
            .await?;
        Ok(row.try_get("msg_id")?)
    }

    pub async fn read_messages(
        &self,
        queue_name: &str,
        vt_seconds: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<ReadMessage<Value>>> {
        let rows = sqlx::query("SELECT * FROM pgmq.read($1, $2::integer, $3::integer)")
            .bind(queue_name)
            .bind(vt_seconds.unwrap_or(30) as i32)
            .bind(limit.unwrap_or(1) as i32)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_message::<Value>).collect()
    }

    pub async fn read_specific_message<T: DeserializeOwned>(
        &self,
        queue_name: &str,
        msg_id: i64,
        vt_seconds: i64,
    ) -> Result<Option<ReadMessage<T>>> {
        let table = format!("pgmq.q_{queue_name}");
        let query = format!(
            "SELECT msg_id, read_ct, enqueued_at, vt, message FROM {table} WHERE msg_id = $1"
        );
        let row = sqlx::query(&query)
            .bind(msg_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        self.set_visibility_timeout(queue_name, msg_id, vt_seconds)
            .await?;
        Ok(Some(row_to_message::<T>(&row)?))
    }

    pub async fn pop_message(&self, queue_name: &str) -> Result<Option<ReadMessage<Value>>> {
        let row = sqlx::query("SELECT * FROM pgmq.pop($1)")
            .bind(queue_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_message::<Value>).transpose()
    }

    pub async fn delete_message(&self, queue_name: &str, msg_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT pgmq.delete($1, $2::bigint) AS deleted")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("deleted")?)
    }

    pub async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT pgmq.archive($1, $2::bigint) AS archived")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("archived")?)
    }

    pub async fn set_visibility_timeout(
        &self,
        queue_name: &str,
        msg_id: i64,
        vt_offset_seconds: i64,
    ) -> Result<()> {
        sqlx::query("SELECT * FROM pgmq.set_vt($1, $2::bigint, $3::integer)")
            .bind(queue_name)
            .bind(msg_id)
            .bind(vt_offset_seconds as i32)
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn queue_metrics(&self, queue_name: &str) -> Result<QueueMetrics> {
        let row = sqlx::query(
            "SELECT queue_name, queue_length, newest_msg_age_sec, oldest_msg_age_sec, total_messages \
             FROM pgmq.metrics($1)",
        )
        .bind(queue_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(QueueMetrics {
            queue_name: row.try_get("queue_name")?,
            message_count: row.try_get("queue_length")?,
            newest_msg_age_sec: row.try_get("newest_msg_age_sec")?,
            oldest_msg_age_sec: row.try_get("oldest_msg_age_sec")?,
            total_messages: row.try_get("total_messages")?,
        })
    }

    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(true)
    }

    pub async fn get_client_status(&self) -> Result<ClientStatus> {
        let connected = self.health_check().await.unwrap_or(false);
        Ok(ClientStatus {
            connected,
            client_type: "pgmq-unified".to_string(),
        })
    }

    /// Declares `worker_{namespace}_queue` for every namespace, creating it if absent.
    pub async fn initialize_namespace_queues(&self, namespaces: &[&str]) -> Result<()> {
        for ns in namespaces {
            self.create_queue(&format!("worker_{ns}_queue")).await?;
        }
        Ok(())
    }

    pub async fn process_namespace_queue(
        &self,
        namespace: &str,
        vt_seconds: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ReadMessage<Value>>> {
        let queue_name = format!("worker_{namespace}_queue");
        self.read_messages(&queue_name, vt_seconds, Some(limit))
            .await
    }

    pub async fn complete_message(&self, namespace: &str, msg_id: i64) -> Result<()> {
        let queue_name = format!("worker_{namespace}_queue");
        self.delete_message(&queue_name, msg_id).await?;
        Ok(())
    }
}

/// Factory mirroring [`PgmqClient`]'s constructors for call sites that prefer
/// a type-based entry point (dependency-injection friendly).
#[derive(Debug, Clone, Copy)]
pub struct PgmqNotifyClientFactory;

impl PgmqNotifyClientFactory {
    pub async fn create_with_pool(pool: PgPool) -> PgmqClient {
        PgmqClient::new_with_pool(pool).await
    }

    pub async fn create_with_pool_and_config(pool: PgPool, config: PgmqNotifyConfig) -> PgmqClient {
        PgmqClient::new_with_pool_and_config(pool, config).await
    }
}


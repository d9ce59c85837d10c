//! Persists the planning state into `AnalysisRequest.agent_state` so a
//! restarted orchestrator resumes an in-flight request from its last clean
//! checkpoint instead of re-planning from scratch.

use meridian_shared::error::{CoreError, Result};
use meridian_shared::tenant::with_tenant;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::state::PlanningState;

pub struct Checkpointer {
    pool: PgPool,
}

impl Checkpointer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resumes an in-flight request after restart. A corrupted snapshot is
    /// treated as absent rather than fatal: the orchestrator re-plans from
    /// scratch.
    pub async fn get(&self, user_id: Uuid, analysis_request_id: Uuid) -> Result<Option<PlanningState>> {
        let raw = with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            let row = sqlx::query("SELECT agent_state FROM analysis_requests WHERE id = $1")
                .bind(analysis_request_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(CoreError::from)?;
            Ok(row.and_then(|r| r.try_get::<Option<serde_json::Value>, _>("agent_state").ok().flatten()))
        }))
        .await?;

        let Some(blob) = raw else { return Ok(None) };
        let Some(checkpoint) = blob.get("checkpoint") else { return Ok(None) };

        match serde_json::from_value::<PlanningState>(checkpoint.clone()) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                warn!(%err, %analysis_request_id, "corrupted checkpoint, re-planning from scratch");
                Ok(None)
            }
        }
    }

    /// Atomic overwrite of the checkpoint snapshot.
    pub async fn put(&self, user_id: Uuid, analysis_request_id: Uuid, state: &PlanningState) -> Result<()> {
        let blob = serde_json::json!({ "checkpoint": state });
        with_tenant(&self.pool, user_id, |tx| Box::pin(async move {
            sqlx::query("UPDATE analysis_requests SET agent_state = $2, updated_at = now() WHERE id = $1")
                .bind(analysis_request_id)
                .bind(&blob)
                .execute(&mut **tx)
                .await
                .map_err(CoreError::from)?;
            Ok(())
        }))
        .await
    }
}

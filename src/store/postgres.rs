//! Postgres transform store.
//!
//! DESIGN
//! ======
//! Batches live in `applet_transform_batches`, keyed by
//! (identity, workspace, node) with a foreign key onto the owning workspace.
//! The upsert selects from `workspaces` under the caller's identity, so the
//! ownership check and the write are one statement: no row back means the
//! caller does not own the workspace. `xmax = 0` on the returned row tells a
//! fresh insert from an update.

use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{StoreError, StoreOutcome, TransformStore};
use crate::sync::{TransformAction, TransformBatch, WorkspaceId};

/// Upsert the batch for (workspace, node) on behalf of `subject`.
///
/// # Errors
///
/// [`StoreError::WorkspaceNotFound`] if `subject` does not own the workspace,
/// or a database error.
pub async fn upsert_batch(
    pool: &PgPool,
    subject: &str,
    workspace_id: WorkspaceId,
    node_id: &str,
    actions: &[TransformAction],
) -> Result<StoreOutcome, StoreError> {
    let row = sqlx::query(
        r"INSERT INTO applet_transform_batches (identity_subject, workspace_id, node_id, actions, updated_at)
          SELECT w.identity_subject, w.workspace_id, $3, $4, now()
          FROM workspaces w
          WHERE w.identity_subject = $1 AND w.workspace_id = $2
          ON CONFLICT (identity_subject, workspace_id, node_id)
          DO UPDATE SET actions = EXCLUDED.actions, updated_at = now()
          RETURNING (xmax = 0) AS inserted",
    )
    .bind(subject)
    .bind(workspace_id)
    .bind(node_id)
    .bind(Json(actions))
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or(StoreError::WorkspaceNotFound(workspace_id))?;
    Ok(StoreOutcome { inserted: row.get("inserted") })
}

/// Latest batch for (workspace, node) visible to `subject`.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_batch(
    pool: &PgPool,
    subject: &str,
    workspace_id: WorkspaceId,
    node_id: &str,
) -> Result<Option<TransformBatch>, StoreError> {
    let row = sqlx::query_as::<_, (Json<TransformBatch>,)>(
        "SELECT actions
         FROM applet_transform_batches
         WHERE identity_subject = $1 AND workspace_id = $2 AND node_id = $3",
    )
    .bind(subject)
    .bind(workspace_id)
    .bind(node_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(Json(actions),)| actions))
}

/// Caller-bound store over a Postgres pool.
#[derive(Clone)]
pub struct PgTransformStore {
    pool: PgPool,
    subject: Option<String>,
}

impl PgTransformStore {
    #[must_use]
    pub fn for_caller(pool: PgPool, subject: Option<String>) -> Self {
        Self { pool, subject }
    }
}

#[async_trait::async_trait]
impl TransformStore for PgTransformStore {
    async fn store(
        &self,
        workspace_id: WorkspaceId,
        node_id: &str,
        actions: &[TransformAction],
    ) -> Result<StoreOutcome, StoreError> {
        let subject = self.subject.as_deref().ok_or(StoreError::Unauthenticated)?;
        upsert_batch(&self.pool, subject, workspace_id, node_id, actions).await
    }

    async fn find(&self, workspace_id: WorkspaceId, node_id: &str) -> Result<Option<TransformBatch>, StoreError> {
        let subject = self.subject.as_deref().ok_or(StoreError::Unauthenticated)?;
        find_batch(&self.pool, subject, workspace_id, node_id).await
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;

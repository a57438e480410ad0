//! Checkpoint persistence for projections.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use event_store::Sequence;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;

use crate::Result;

/// Stores the last sequence each projection has fully handled.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `Sequence::initial()` for a projection that never ran.
    async fn load(&self, projection: &str) -> Result<Sequence>;

    async fn save(&self, projection: &str, sequence: Sequence) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, Sequence>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, projection: &str) -> Result<Sequence> {
        Ok(self
            .checkpoints
            .read()
            .await
            .get(projection)
            .copied()
            .unwrap_or_default())
    }

    async fn save(&self, projection: &str, sequence: Sequence) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(projection.to_string(), sequence);
        Ok(())
    }
}

/// Checkpoints in the `projection_checkpoints` table.
#[derive(Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn load(&self, projection: &str) -> Result<Sequence> {
        let row = sqlx::query("SELECT sequence FROM projection_checkpoints WHERE projection = $1")
            .bind(projection)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Sequence::new(row.try_get("sequence")?)),
            None => Ok(Sequence::initial()),
        }
    }

    async fn save(&self, projection: &str, sequence: Sequence) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projection_checkpoints (projection, sequence, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (projection)
            DO UPDATE SET sequence = EXCLUDED.sequence, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(projection)
        .bind(sequence.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

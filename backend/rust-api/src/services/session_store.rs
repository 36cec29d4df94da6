use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Database, IndexModel};
use thiserror::Error;

use crate::models::{GameSession, Player};

const COLLECTION: &str = "game_sessions";
const DEFAULT_OP_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed since it was read; re-read and retry.
    #[error("session record modified concurrently")]
    Conflict,
    /// Storage I/O failed or timed out; retryable by the caller.
    #[error("session store unavailable")]
    Unavailable(#[source] anyhow::Error),
}

/// Durable persistence for [`GameSession`] records.
///
/// `save` is a compare-and-swap on `revision`: the record is replaced only
/// if the stored revision still equals the snapshot's, and the stored
/// revision becomes `snapshot.revision + 1`. Two writers racing on the same
/// snapshot cannot both win; the loser gets [`StoreError::Conflict`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &GameSession) -> Result<(), StoreError>;
    async fn find_by_id(&self, session_id: &str) -> Result<Option<GameSession>, StoreError>;
    async fn find_active_by_owner(&self, owner_id: &str)
        -> Result<Option<GameSession>, StoreError>;
    async fn save(&self, session: &GameSession) -> Result<(), StoreError>;
}

pub struct MongoSessionStore {
    mongo: Database,
    op_timeout: Duration,
}

impl MongoSessionStore {
    pub fn new(mongo: Database) -> Self {
        let timeout_ms = std::env::var("SESSION_STORE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_OP_TIMEOUT_MS);

        Self {
            mongo,
            op_timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn collection(&self) -> mongodb::Collection<GameSession> {
        self.mongo.collection(COLLECTION)
    }

    /// Runs one driver call under the store's operation timeout. An elapsed
    /// timer or driver failure both surface as `Unavailable` rather than a
    /// hang.
    async fn bounded<F, T>(&self, op: &str, call: F) -> Result<T, StoreError>
    where
        F: std::future::IntoFuture<Output = Result<T, mongodb::error::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(
                anyhow!(e).context(format!("mongodb {op} on {COLLECTION} failed")),
            )),
            Err(_) => Err(StoreError::Unavailable(anyhow!(
                "mongodb {op} on {COLLECTION} timed out after {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn insert(&self, session: &GameSession) -> Result<(), StoreError> {
        let collection = self.collection();
        self.bounded("insert_one", collection.insert_one(session))
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<GameSession>, StoreError> {
        let collection = self.collection();
        self.bounded("find_one", collection.find_one(doc! { "_id": session_id }))
            .await
    }

    async fn find_active_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Option<GameSession>, StoreError> {
        let collection = self.collection();
        self.bounded(
            "find_one",
            collection.find_one(doc! { "owner_id": owner_id, "status": "active" }),
        )
        .await
    }

    async fn save(&self, session: &GameSession) -> Result<(), StoreError> {
        let mut next = session.clone();
        next.revision = session.revision + 1;

        let collection = self.collection();
        let result = self
            .bounded(
                "replace_one",
                collection.replace_one(
                    doc! { "_id": &session.id, "revision": session.revision },
                    &next,
                ),
            )
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }
}

/// Creates the indexes backing the owner/status lookup and score-ordered
/// scans over finished games, plus the player high-score index.
pub async fn ensure_indexes(mongo: &Database) -> anyhow::Result<()> {
    let sessions: mongodb::Collection<GameSession> = mongo.collection(COLLECTION);
    sessions
        .create_index(
            IndexModel::builder()
                .keys(doc! { "owner_id": 1, "status": 1 })
                .build(),
        )
        .await?;
    sessions
        .create_index(
            IndexModel::builder()
                .keys(doc! { "final_score": -1 })
                .build(),
        )
        .await?;

    let players: mongodb::Collection<Player> = mongo.collection("players");
    players
        .create_index(
            IndexModel::builder()
                .keys(doc! { "high_score": -1 })
                .build(),
        )
        .await?;

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}

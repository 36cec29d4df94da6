use anyhow::anyhow;
use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use mongodb::Database;

use super::session_store::StoreError;
use crate::models::GameResult;

/// Rolls finished-session results into cumulative player stats.
///
/// Idempotent per session id: re-delivery of a finalize notification must be
/// a no-op the second time, so retried finalizations cannot double-count a
/// game.
#[async_trait]
pub trait ProfileAggregator: Send + Sync {
    async fn record_game_result(&self, result: &GameResult) -> Result<(), StoreError>;
}

pub struct MongoProfileAggregator {
    mongo: Database,
}

impl MongoProfileAggregator {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Duplicate-key on the `game_results` marker insert (code 11000) means
    /// this session id was already rolled up.
    fn already_recorded(err: &mongodb::error::Error) -> bool {
        if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
            *err.kind
        {
            return we.code == 11000;
        }
        false
    }
}

#[async_trait]
impl ProfileAggregator for MongoProfileAggregator {
    async fn record_game_result(&self, result: &GameResult) -> Result<(), StoreError> {
        let results = self.mongo.collection::<GameResult>("game_results");

        if let Err(e) = results.insert_one(result).await {
            if Self::already_recorded(&e) {
                tracing::debug!(
                    session_id = %result.session_id,
                    "game result already recorded, skipping"
                );
                return Ok(());
            }
            return Err(StoreError::Unavailable(
                anyhow!(e).context("mongodb insert into game_results failed"),
            ));
        }

        let filter = match ObjectId::parse_str(&result.owner_id) {
            Ok(oid) => doc! { "_id": oid },
            Err(_) => doc! { "_id": &result.owner_id },
        };
        let update = doc! {
            "$inc": {
                "games_played": 1_i64,
                "correct_answers": i64::from(result.correct_answers),
            },
            "$max": { "high_score": result.final_score },
            "$set": {
                "score": result.final_score,
                "updatedAt": BsonDateTime::now(),
            },
        };

        self.mongo
            .collection::<Document>("players")
            .update_one(filter, update)
            .await
            .map_err(|e| {
                StoreError::Unavailable(anyhow!(e).context("mongodb update on players failed"))
            })?;

        tracing::info!(
            session_id = %result.session_id,
            owner_id = %result.owner_id,
            final_score = result.final_score,
            "player stats updated"
        );
        Ok(())
    }
}

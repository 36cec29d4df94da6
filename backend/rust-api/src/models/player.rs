use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::session::{bson_datetime, GameSession};

/// Guest player profile stored in the `players` collection. Cumulative stats
/// are written only by the profile aggregator, once per finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    /// Score of the most recently finished game.
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub high_score: i32,
    #[serde(default)]
    pub games_played: i64,
    #[serde(default)]
    pub correct_answers: i64,
    #[serde(rename = "createdAt", with = "bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Finalize notification forwarded to the profile aggregator. Doubles as the
/// idempotency marker persisted in `game_results` with the session id as
/// `_id`, so re-delivery cannot double-count a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResult {
    #[serde(rename = "_id")]
    pub session_id: String,
    pub owner_id: String,
    pub correct_answers: i32,
    pub final_score: i32,
    #[serde(with = "bson_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl GameResult {
    pub fn from_session(session: &GameSession, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id.clone(),
            owner_id: session.owner_id.clone(),
            correct_answers: session.correct_answers,
            final_score: session.final_score.unwrap_or(session.score),
            recorded_at: now,
        }
    }
}

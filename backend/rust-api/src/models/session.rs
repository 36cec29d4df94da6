use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STARTING_LIVES: i32 = 3;
/// A bonus life is granted on every 50th cumulative correct answer.
pub const BONUS_LIFE_INTERVAL: i32 = 50;

/// One player's in-progress or completed game, stored in the
/// `game_sessions` collection. Finished sessions are never deleted; `status`
/// marks them inert and they remain available for stats and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub score: i32,
    pub lives: i32,
    /// Question ids in submission order, one entry per processed answer
    /// (time-expired submissions included).
    pub questions_answered: Vec<String>,
    pub correct_answers: i32,
    pub status: SessionStatus,
    #[serde(with = "bson_datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_option"
    )]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<i32>,
    /// Optimistic-concurrency version, bumped by every successful save.
    pub revision: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finished,
}

impl GameSession {
    pub fn new(owner_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            score: 0,
            lives: STARTING_LIVES,
            questions_answered: Vec::new(),
            correct_answers: 0,
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
            final_score: None,
            revision: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn is_out_of_lives(&self) -> bool {
        self.lives <= 0
    }

    /// Applies one submission. Returns true when this answer crossed a
    /// bonus-life milestone. The milestone check uses the post-increment
    /// count, so it fires on the 50th, 100th, ... correct answer and is not
    /// reset by earlier awards.
    pub fn record_answer(&mut self, question_id: &str, is_correct: bool) -> bool {
        self.questions_answered.push(question_id.to_string());

        if is_correct {
            self.score += 1;
            self.correct_answers += 1;
            if self.correct_answers % BONUS_LIFE_INTERVAL == 0 {
                self.lives += 1;
                return true;
            }
        } else {
            self.lives -= 1;
        }

        false
    }

    /// Terminal transition: captures `ended_at` and snapshots the score into
    /// `final_score`. Callers only invoke this on active sessions.
    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Finished;
        self.ended_at = Some(now);
        self.final_score = Some(self.score);
    }
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub(crate) mod bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bson::DateTime::from_millis(date.timestamp_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| serde::de::Error::custom("datetime out of range"))
    }
}

pub(crate) mod bson_datetime_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_some(&bson::DateTime::from_millis(d.timestamp_millis())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        opt.map(|bson_dt| {
            DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
                .ok_or_else(|| serde::de::Error::custom("datetime out of range"))
        })
        .transpose()
    }
}

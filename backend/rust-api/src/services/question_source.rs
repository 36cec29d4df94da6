use anyhow::anyhow;
use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;

use super::session_store::StoreError;
use crate::models::Question;

/// Read side of the quiz-content collection. The engine asks only for the
/// authoritative correct option by question id and never trusts a
/// client-supplied one.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Returns the correct option index, or None when no such question exists.
    async fn correct_option(&self, question_id: &str) -> Result<Option<i32>, StoreError>;
}

pub struct MongoQuestionSource {
    mongo: Database,
}

impl MongoQuestionSource {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl QuestionSource for MongoQuestionSource {
    async fn correct_option(&self, question_id: &str) -> Result<Option<i32>, StoreError> {
        // Question ids are ObjectIds; anything unparsable cannot exist.
        let Ok(object_id) = ObjectId::parse_str(question_id) else {
            return Ok(None);
        };

        let question = self
            .mongo
            .collection::<Question>("questions")
            .find_one(doc! { "_id": object_id })
            .await
            .map_err(|e| {
                StoreError::Unavailable(anyhow!(e).context("mongodb find_one on questions failed"))
            })?;

        Ok(question.map(|q| q.correct_answer))
    }
}

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Quiz item in the `questions` collection. The game engine reads only
/// `correct_answer`; prompts, options and audio are served to the client by
/// the content routes, which live outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Prompt word or phrase in Aramaic.
    pub aramaic: String,
    /// Hebrew translation shown in the answer key.
    pub hebrew: String,
    pub options: Vec<String>,
    /// Index into `options`; always in 0..=3.
    pub correct_answer: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_true() -> bool {
    true
}

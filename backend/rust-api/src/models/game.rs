use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body for `POST /api/v1/game/answer`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, message = "session_id must not be empty"))]
    pub session_id: String,
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub question_id: String,
    /// Index of the chosen option; -1 means the timer expired with no choice.
    pub selected_option: i32,
}

/// Body for `POST /api/v1/game/end`.
#[derive(Debug, Deserialize, Validate)]
pub struct EndGameRequest {
    #[validate(length(min = 1, message = "session_id must not be empty"))]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartGameResponse {
    pub session_id: String,
    pub lives: i32,
    pub score: i32,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub is_correct: bool,
    pub lives: i32,
    pub score: i32,
    pub game_over: bool,
    /// Present only when this submission ended the game.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<i32>,
    pub bonus_life_awarded: bool,
}

#[derive(Debug, Serialize)]
pub struct EndGameResponse {
    pub final_score: i32,
    pub correct_answers: i32,
    pub total_questions_answered: usize,
}

#[derive(Debug, Serialize)]
pub struct CurrentGameResponse {
    pub session_id: String,
    pub lives: i32,
    pub score: i32,
    pub correct_answers: i32,
    pub questions_answered: Vec<String>,
}

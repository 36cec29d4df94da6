pub mod game;
pub mod player;
pub mod question;
pub mod session;

pub use game::{
    CurrentGameResponse, EndGameRequest, EndGameResponse, StartGameResponse, SubmitAnswerRequest,
    SubmitAnswerResponse,
};
pub use player::{GameResult, Player};
pub use question::{Difficulty, Question};
pub use session::{GameSession, SessionStatus, BONUS_LIFE_INTERVAL, STARTING_LIVES};

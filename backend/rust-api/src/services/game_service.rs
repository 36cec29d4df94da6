use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, BONUS_LIVES_AWARDED_TOTAL, GAMES_FINISHED_TOTAL, GAMES_STARTED_TOTAL,
    SESSIONS_ACTIVE,
};
use crate::models::{
    CurrentGameResponse, EndGameResponse, GameResult, GameSession, StartGameResponse,
    SubmitAnswerResponse,
};

use super::identity::IdentityProvider;
use super::profile_service::ProfileAggregator;
use super::question_source::QuestionSource;
use super::session_store::{SessionStore, StoreError};

/// Bounded number of read-modify-write attempts before a storage race is
/// surfaced to the caller.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Option sentinel sent by the client when the question timer expired with
/// no choice made; always scored as incorrect.
pub const TIME_EXPIRED_OPTION: i32 = -1;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("player not found")]
    UnknownOwner,
    /// Single error for missing, foreign and already-finished sessions, so
    /// callers cannot probe other players' sessions.
    #[error("game session not found")]
    SessionNotFound,
    #[error("question not found")]
    QuestionNotFound,
    #[error("game session was modified concurrently")]
    ConcurrentModification,
    #[error("session store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => GameError::ConcurrentModification,
            StoreError::Unavailable(e) => GameError::StoreUnavailable(e),
        }
    }
}

/// The game-session state machine: session creation, answer scoring, life
/// management and finalization. Collaborators are injected so the rules can
/// be exercised without a live database.
pub struct GameService {
    sessions: Arc<dyn SessionStore>,
    questions: Arc<dyn QuestionSource>,
    profiles: Arc<dyn ProfileAggregator>,
    identity: Arc<dyn IdentityProvider>,
}

impl GameService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        questions: Arc<dyn QuestionSource>,
        profiles: Arc<dyn ProfileAggregator>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            sessions,
            questions,
            profiles,
            identity,
        }
    }

    pub async fn start_session(&self, owner_id: &str) -> Result<StartGameResponse, GameError> {
        if !self.identity.resolve_owner(owner_id).await? {
            return Err(GameError::UnknownOwner);
        }

        // Starting fresh abandons the old game: any session the owner still
        // has active is finalized with its score captured as-is.
        self.finalize_superseded(owner_id).await?;

        let session = GameSession::new(owner_id, Utc::now());
        self.sessions.insert(&session).await?;

        GAMES_STARTED_TOTAL.inc();
        SESSIONS_ACTIVE.inc();
        tracing::info!(session_id = %session.id, owner_id, "game session started");

        Ok(StartGameResponse {
            session_id: session.id,
            lives: session.lives,
            score: session.score,
        })
    }

    pub async fn submit_answer(
        &self,
        session_id: &str,
        owner_id: &str,
        question_id: &str,
        selected_option: i32,
    ) -> Result<SubmitAnswerResponse, GameError> {
        let correct_option = self
            .questions
            .correct_option(question_id)
            .await?
            .ok_or(GameError::QuestionNotFound)?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut session = self.owned_active_session(session_id, owner_id).await?;

            let is_correct =
                selected_option != TIME_EXPIRED_OPTION && selected_option == correct_option;
            let bonus_life_awarded = session.record_answer(question_id, is_correct);

            // Running out of lives finishes the game within the same write.
            let game_over = session.is_out_of_lives();
            if game_over {
                session.finish(Utc::now());
            }

            match self.sessions.save(&session).await {
                Ok(()) => {
                    ANSWERS_SUBMITTED_TOTAL
                        .with_label_values(&[if is_correct { "true" } else { "false" }])
                        .inc();
                    if bonus_life_awarded {
                        BONUS_LIVES_AWARDED_TOTAL.inc();
                        tracing::info!(session_id, owner_id, "bonus life awarded");
                    }
                    if game_over {
                        self.forward_result(&session, "lives_exhausted").await?;
                    }

                    return Ok(SubmitAnswerResponse {
                        is_correct,
                        lives: session.lives,
                        score: session.score,
                        game_over,
                        final_score: session.final_score,
                        bonus_life_awarded,
                    });
                }
                Err(StoreError::Conflict) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(session_id, attempt, "submit raced, re-reading session");
                    backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn end_session(
        &self,
        session_id: &str,
        owner_id: &str,
    ) -> Result<EndGameResponse, GameError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut session = self.owned_active_session(session_id, owner_id).await?;
            session.finish(Utc::now());

            match self.sessions.save(&session).await {
                Ok(()) => {
                    self.forward_result(&session, "ended").await?;
                    return Ok(EndGameResponse {
                        final_score: session.final_score.unwrap_or(session.score),
                        correct_answers: session.correct_answers,
                        total_questions_answered: session.questions_answered.len(),
                    });
                }
                Err(StoreError::Conflict) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(session_id, attempt, "end raced, re-reading session");
                    backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn current_session(&self, owner_id: &str) -> Result<CurrentGameResponse, GameError> {
        let session = self
            .sessions
            .find_active_by_owner(owner_id)
            .await?
            .ok_or(GameError::SessionNotFound)?;

        Ok(CurrentGameResponse {
            session_id: session.id,
            lives: session.lives,
            score: session.score,
            correct_answers: session.correct_answers,
            questions_answered: session.questions_answered,
        })
    }

    async fn owned_active_session(
        &self,
        session_id: &str,
        owner_id: &str,
    ) -> Result<GameSession, GameError> {
        self.sessions
            .find_by_id(session_id)
            .await?
            .filter(|s| s.owner_id == owner_id && s.is_active())
            .ok_or(GameError::SessionNotFound)
    }

    async fn finalize_superseded(&self, owner_id: &str) -> Result<(), GameError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let Some(mut previous) = self.sessions.find_active_by_owner(owner_id).await? else {
                return Ok(());
            };
            previous.finish(Utc::now());

            match self.sessions.save(&previous).await {
                Ok(()) => return self.forward_result(&previous, "superseded").await,
                Err(StoreError::Conflict) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(owner_id, attempt, "forced finalize raced, re-reading");
                    backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Forwards a finished session's result to the profile aggregator. Only
    /// the writer that won the Active -> Finished transition gets here, and
    /// the aggregator is idempotent per session id, so a game is counted
    /// exactly once.
    async fn forward_result(&self, session: &GameSession, reason: &str) -> Result<(), GameError> {
        let result = GameResult::from_session(session, Utc::now());
        self.profiles.record_game_result(&result).await?;

        GAMES_FINISHED_TOTAL.with_label_values(&[reason]).inc();
        SESSIONS_ACTIVE.dec();
        tracing::info!(
            session_id = %session.id,
            owner_id = %session.owner_id,
            final_score = result.final_score,
            reason,
            "game session finished"
        );
        Ok(())
    }
}

/// Short jittered pause between CAS retries so two racing submissions do not
/// immediately collide again.
async fn backoff(attempt: u32) {
    let base = 10u64 << attempt.min(4);
    let jitter = rand::random::<u64>() % base;
    tokio::time::sleep(Duration::from_millis(base + jitter)).await;
}

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use aramaic_quiz_api::models::{GameResult, GameSession, SessionStatus, STARTING_LIVES};
use aramaic_quiz_api::services::game_service::{GameError, GameService, TIME_EXPIRED_OPTION};
use aramaic_quiz_api::services::identity::IdentityProvider;
use aramaic_quiz_api::services::profile_service::ProfileAggregator;
use aramaic_quiz_api::services::question_source::QuestionSource;
use aramaic_quiz_api::services::session_store::{SessionStore, StoreError};

const OWNER: &str = "player-1";
const OTHER_OWNER: &str = "player-2";

/// Session store with the same compare-and-swap contract as the Mongo
/// implementation: a save only lands if the stored revision still matches
/// the snapshot's.
#[derive(Default)]
struct InMemorySessionStore {
    records: Mutex<HashMap<String, GameSession>>,
    unavailable: AtomicBool,
    always_conflict: AtomicBool,
}

impl InMemorySessionStore {
    fn snapshot(&self, session_id: &str) -> Option<GameSession> {
        self.records.lock().unwrap().get(session_id).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(anyhow::anyhow!("store offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &GameSession) -> Result<(), StoreError> {
        self.check_available()?;
        self.records
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<GameSession>, StoreError> {
        self.check_available()?;
        Ok(self.snapshot(session_id))
    }

    async fn find_active_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Option<GameSession>, StoreError> {
        self.check_available()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|s| s.owner_id == owner_id && s.is_active())
            .cloned())
    }

    async fn save(&self, session: &GameSession) -> Result<(), StoreError> {
        self.check_available()?;
        if self.always_conflict.load(Ordering::SeqCst) {
            return Err(StoreError::Conflict);
        }

        let mut records = self.records.lock().unwrap();
        let Some(stored) = records.get(&session.id) else {
            return Err(StoreError::Conflict);
        };
        if stored.revision != session.revision {
            return Err(StoreError::Conflict);
        }

        let mut next = session.clone();
        next.revision = session.revision + 1;
        records.insert(next.id.clone(), next);
        Ok(())
    }
}

/// Every question id resolves to correct option 0 unless overridden; ids in
/// `missing` do not exist at all.
#[derive(Default)]
struct StaticQuestions {
    correct: HashMap<String, i32>,
    missing: HashSet<String>,
}

#[async_trait]
impl QuestionSource for StaticQuestions {
    async fn correct_option(&self, question_id: &str) -> Result<Option<i32>, StoreError> {
        if self.missing.contains(question_id) {
            return Ok(None);
        }
        Ok(Some(self.correct.get(question_id).copied().unwrap_or(0)))
    }
}

/// Captures forwarded results with the production idempotency semantics:
/// a session id is only ever recorded once.
#[derive(Default)]
struct RecordingAggregator {
    records: Mutex<Vec<GameResult>>,
}

impl RecordingAggregator {
    fn count_for(&self, session_id: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.session_id == session_id)
            .count()
    }

    fn last_for(&self, session_id: &str) -> Option<GameResult> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.session_id == session_id)
            .cloned()
    }
}

#[async_trait]
impl ProfileAggregator for RecordingAggregator {
    async fn record_game_result(&self, result: &GameResult) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.session_id == result.session_id) {
            return Ok(());
        }
        records.push(result.clone());
        Ok(())
    }
}

struct KnownOwners(HashSet<String>);

#[async_trait]
impl IdentityProvider for KnownOwners {
    async fn resolve_owner(&self, owner_id: &str) -> Result<bool, StoreError> {
        Ok(self.0.contains(owner_id))
    }
}

struct Harness {
    game: GameService,
    store: Arc<InMemorySessionStore>,
    profiles: Arc<RecordingAggregator>,
}

fn harness() -> Harness {
    harness_with_questions(StaticQuestions::default())
}

fn harness_with_questions(questions: StaticQuestions) -> Harness {
    let store = Arc::new(InMemorySessionStore::default());
    let profiles = Arc::new(RecordingAggregator::default());
    let identity = Arc::new(KnownOwners(
        [OWNER.to_string(), OTHER_OWNER.to_string()]
            .into_iter()
            .collect(),
    ));

    let game = GameService::new(
        store.clone(),
        Arc::new(questions),
        profiles.clone(),
        identity,
    );

    Harness {
        game,
        store,
        profiles,
    }
}

const CORRECT: i32 = 0;
const WRONG: i32 = 2;

#[tokio::test]
async fn start_session_rejects_unknown_owner() {
    let h = harness();
    let err = h.game.start_session("stranger").await.unwrap_err();
    assert!(matches!(err, GameError::UnknownOwner));
}

#[tokio::test]
async fn start_session_creates_fresh_state() {
    let h = harness();
    let started = tokio_test::assert_ok!(h.game.start_session(OWNER).await);

    assert_eq!(started.lives, STARTING_LIVES);
    assert_eq!(started.score, 0);

    let stored = h.store.snapshot(&started.session_id).unwrap();
    assert_eq!(stored.owner_id, OWNER);
    assert!(stored.is_active());
    assert!(stored.questions_answered.is_empty());
}

#[tokio::test]
async fn score_and_counters_track_every_submission() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();

    // c w c c w -> 3 correct out of 5 submissions
    let pattern = [CORRECT, WRONG, CORRECT, CORRECT, WRONG];
    for (i, selected) in pattern.iter().enumerate() {
        let response = h
            .game
            .submit_answer(&started.session_id, OWNER, &format!("q-{i}"), *selected)
            .await
            .unwrap();
        assert_eq!(response.is_correct, *selected == CORRECT);
    }

    let stored = h.store.snapshot(&started.session_id).unwrap();
    assert_eq!(stored.score, 3);
    assert_eq!(stored.correct_answers, 3);
    assert_eq!(stored.questions_answered.len(), 5);
    assert_eq!(stored.lives, STARTING_LIVES - 2);
}

#[tokio::test]
async fn lives_zero_always_coincides_with_finished() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();

    // Mixed run that ends with exhausted lives; the invariant must hold
    // after every single call.
    let pattern = [CORRECT, WRONG, CORRECT, WRONG, WRONG];
    for (i, selected) in pattern.iter().enumerate() {
        h.game
            .submit_answer(&started.session_id, OWNER, &format!("q-{i}"), *selected)
            .await
            .unwrap();

        let stored = h.store.snapshot(&started.session_id).unwrap();
        assert_eq!(
            stored.lives <= 0,
            stored.status == SessionStatus::Finished,
            "invariant broken after submission {i}"
        );
    }
}

#[tokio::test]
async fn three_wrong_answers_end_the_game() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();

    let first = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-1", WRONG)
        .await
        .unwrap();
    assert_eq!(first.lives, 2);
    assert!(!first.game_over);

    let second = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-2", WRONG)
        .await
        .unwrap();
    assert_eq!(second.lives, 1);
    assert!(!second.game_over);

    let third = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-3", WRONG)
        .await
        .unwrap();
    assert_eq!(third.lives, 0);
    assert!(third.game_over);
    assert_eq!(third.final_score, Some(0));

    // The finished session is indistinguishable from a missing one.
    let fourth = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-4", WRONG)
        .await
        .unwrap_err();
    assert!(matches!(fourth, GameError::SessionNotFound));

    assert_eq!(h.profiles.count_for(&started.session_id), 1);
    let result = h.profiles.last_for(&started.session_id).unwrap();
    assert_eq!(result.final_score, 0);
}

#[tokio::test]
async fn bonus_life_fires_exactly_on_the_fiftieth_correct_answer() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();

    for i in 1..50 {
        let response = h
            .game
            .submit_answer(&started.session_id, OWNER, &format!("q-{i}"), CORRECT)
            .await
            .unwrap();
        assert!(!response.bonus_life_awarded, "unexpected bonus at answer {i}");
        assert_eq!(response.lives, STARTING_LIVES);
    }

    let fiftieth = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-50", CORRECT)
        .await
        .unwrap();
    assert!(fiftieth.bonus_life_awarded);
    assert_eq!(fiftieth.lives, STARTING_LIVES + 1);
    assert_eq!(fiftieth.score, 50);

    // 51st is an ordinary correct answer again.
    let next = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-51", CORRECT)
        .await
        .unwrap();
    assert!(!next.bonus_life_awarded);
    assert_eq!(next.lives, STARTING_LIVES + 1);
}

#[tokio::test]
async fn time_expired_sentinel_is_always_wrong() {
    let mut questions = StaticQuestions::default();
    // Even a malformed question whose stored answer matches the sentinel
    // must not score the timeout as correct.
    questions.correct.insert("q-neg".to_string(), -1);
    let h = harness_with_questions(questions);

    let started = h.game.start_session(OWNER).await.unwrap();

    let timed_out = h
        .game
        .submit_answer(
            &started.session_id,
            OWNER,
            "q-regular",
            TIME_EXPIRED_OPTION,
        )
        .await
        .unwrap();
    assert!(!timed_out.is_correct);
    assert_eq!(timed_out.lives, STARTING_LIVES - 1);

    let malformed = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-neg", TIME_EXPIRED_OPTION)
        .await
        .unwrap();
    assert!(!malformed.is_correct);

    let stored = h.store.snapshot(&started.session_id).unwrap();
    assert_eq!(stored.questions_answered.len(), 2);
}

#[tokio::test]
async fn unknown_question_is_reported_before_touching_the_session() {
    let mut questions = StaticQuestions::default();
    questions.missing.insert("ghost".to_string());
    let h = harness_with_questions(questions);

    let started = h.game.start_session(OWNER).await.unwrap();
    let err = h
        .game
        .submit_answer(&started.session_id, OWNER, "ghost", CORRECT)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::QuestionNotFound));

    let stored = h.store.snapshot(&started.session_id).unwrap();
    assert!(stored.questions_answered.is_empty());
    assert_eq!(stored.lives, STARTING_LIVES);
}

#[tokio::test]
async fn foreign_session_reads_as_not_found() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();

    let err = h
        .game
        .submit_answer(&started.session_id, OTHER_OWNER, "q-1", CORRECT)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::SessionNotFound));
}

#[tokio::test]
async fn restarting_finalizes_the_previous_session_exactly_once() {
    let h = harness();
    let first = h.game.start_session(OWNER).await.unwrap();

    h.game
        .submit_answer(&first.session_id, OWNER, "q-1", CORRECT)
        .await
        .unwrap();
    h.game
        .submit_answer(&first.session_id, OWNER, "q-2", WRONG)
        .await
        .unwrap();

    let second = h.game.start_session(OWNER).await.unwrap();
    assert_ne!(second.session_id, first.session_id);
    assert_eq!(second.lives, STARTING_LIVES);
    assert_eq!(second.score, 0);

    let old = h.store.snapshot(&first.session_id).unwrap();
    assert_eq!(old.status, SessionStatus::Finished);
    assert_eq!(old.final_score, Some(1));
    assert!(old.ended_at.is_some());

    assert_eq!(h.profiles.count_for(&first.session_id), 1);
    let result = h.profiles.last_for(&first.session_id).unwrap();
    assert_eq!(result.final_score, 1);
    assert_eq!(result.correct_answers, 1);
}

#[tokio::test]
async fn end_session_reports_totals_and_is_not_repeatable() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();

    for i in 1..=3 {
        h.game
            .submit_answer(&started.session_id, OWNER, &format!("q-{i}"), CORRECT)
            .await
            .unwrap();
    }

    let ended = tokio_test::assert_ok!(h.game.end_session(&started.session_id, OWNER).await);
    assert_eq!(ended.final_score, 3);
    assert_eq!(ended.correct_answers, 3);
    assert_eq!(ended.total_questions_answered, 3);

    let again = h
        .game
        .end_session(&started.session_id, OWNER)
        .await
        .unwrap_err();
    assert!(matches!(again, GameError::SessionNotFound));

    let submit_after = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-4", CORRECT)
        .await
        .unwrap_err();
    assert!(matches!(submit_after, GameError::SessionNotFound));

    assert_eq!(h.profiles.count_for(&started.session_id), 1);
}

#[tokio::test]
async fn current_session_reflects_progress() {
    let h = harness();

    let none_yet = h.game.current_session(OWNER).await.unwrap_err();
    assert!(matches!(none_yet, GameError::SessionNotFound));

    let started = h.game.start_session(OWNER).await.unwrap();
    h.game
        .submit_answer(&started.session_id, OWNER, "q-1", CORRECT)
        .await
        .unwrap();
    h.game
        .submit_answer(&started.session_id, OWNER, "q-2", WRONG)
        .await
        .unwrap();

    let current = h.game.current_session(OWNER).await.unwrap();
    assert_eq!(current.session_id, started.session_id);
    assert_eq!(current.score, 1);
    assert_eq!(current.correct_answers, 1);
    assert_eq!(current.lives, STARTING_LIVES - 1);
    assert_eq!(
        current.questions_answered,
        vec!["q-1".to_string(), "q-2".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_are_never_lost() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();
    let game = Arc::new(h.game);

    let submit_a = {
        let game = game.clone();
        let session_id = started.session_id.clone();
        tokio::spawn(async move { game.submit_answer(&session_id, OWNER, "q-a", WRONG).await })
    };
    let submit_b = {
        let game = game.clone();
        let session_id = started.session_id.clone();
        tokio::spawn(async move { game.submit_answer(&session_id, OWNER, "q-b", WRONG).await })
    };

    submit_a.await.unwrap().unwrap();
    submit_b.await.unwrap().unwrap();

    // Both transitions landed: two questions recorded, two lives gone.
    let stored = h.store.snapshot(&started.session_id).unwrap();
    assert_eq!(stored.questions_answered.len(), 2);
    assert_eq!(stored.lives, STARTING_LIVES - 2);
    assert_eq!(stored.score, 0);
}

#[tokio::test]
async fn persistent_write_races_surface_after_bounded_retries() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();

    h.store.always_conflict.store(true, Ordering::SeqCst);
    let err = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-1", CORRECT)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::ConcurrentModification));
}

#[tokio::test]
async fn store_outage_is_reported_as_unavailable() {
    let h = harness();
    let started = h.game.start_session(OWNER).await.unwrap();

    h.store.unavailable.store(true, Ordering::SeqCst);
    let err = h
        .game
        .submit_answer(&started.session_id, OWNER, "q-1", CORRECT)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::StoreUnavailable(_)));
}

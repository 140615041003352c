use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use super::error::SessionError;
use super::ledger::AnswerLedger;
use super::persister::ResultPersister;
use super::scorer::{self, ScoreSheet};
use super::timer::CountdownTimer;
use crate::metrics::{
    ANSWERS_RECORDED_TOTAL, SESSIONS_ACTIVE, SESSIONS_FINALIZED_TOTAL, SESSIONS_TOTAL,
};
use crate::models::exam::{ExamMode, FinalizeCause, ModePolicy, SessionState};
use crate::models::question::{AnswerValue, Question};
use crate::models::result::{ExamResult, Finalization, PersistenceOutcome};
use crate::models::SessionSnapshot;
use crate::utils::time::elapsed_seconds;

/// Who the result belongs to. Required writes refuse results without both ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub exam_id: Option<String>,
    pub user_id: Option<String>,
}

struct SessionInner {
    questions: Arc<[Question]>,
    ledger: AnswerLedger,
    timer: Option<CountdownTimer>,
    started_at: Option<DateTime<Utc>>,
    last_activity: Instant,
    finished_at: Option<Instant>,
}

/// Owns one attempt: its question set, answer ledger and countdown, and is
/// the only place a result can be produced.
///
/// Every state change except `Finalizing -> Closed` happens while holding the
/// inner lock, which is also the lock ledger writes take. That makes the
/// `Active -> Finalizing` compare-and-set the single point deciding which
/// finalize call wins and which answers are part of the result.
pub struct SessionController {
    id: String,
    policy: ModePolicy,
    context: SessionContext,
    tick: Duration,
    persister: ResultPersister,
    state: AtomicU8,
    inner: Mutex<SessionInner>,
    finalized: watch::Sender<Option<Arc<Finalization>>>,
}

impl SessionController {
    /// Creates a session in `Loading`.
    pub fn new(
        policy: ModePolicy,
        context: SessionContext,
        persister: ResultPersister,
        tick: Duration,
    ) -> Arc<Self> {
        let (finalized, _) = watch::channel(None);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            policy,
            context,
            tick,
            persister,
            state: AtomicU8::new(SessionState::Loading as u8),
            inner: Mutex::new(SessionInner {
                questions: Arc::from(Vec::new()),
                ledger: AnswerLedger::new(policy.lock_on_select),
                timer: None,
                started_at: None,
                last_activity: Instant::now(),
                finished_at: None,
            }),
            finalized,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> ExamMode {
        self.policy.mode
    }

    pub fn policy(&self) -> &ModePolicy {
        &self.policy
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn questions(&self) -> Arc<[Question]> {
        self.inner().questions.clone()
    }

    /// `Loading -> Active`. Starts the countdown when the mode has a budget.
    pub fn start(self: &Arc<Self>, questions: Vec<Question>) -> Result<String, SessionError> {
        if questions.is_empty() && self.policy.mode != ExamMode::Practice {
            return Err(SessionError::EmptyQuestionSet);
        }
        check_questions(&questions)?;

        let mut inner = self.inner();
        self.transition(SessionState::Loading, SessionState::Active)
            .map_err(|state| SessionError::InvalidState {
                operation: "start",
                state,
            })?;

        inner.questions = Arc::from(questions);
        inner.started_at = Some(Utc::now());
        inner.last_activity = Instant::now();

        if let Some(budget) = self.policy.time_budget_seconds {
            let session = Arc::downgrade(self);
            inner.timer = Some(CountdownTimer::start(budget, self.tick, move || {
                expire(session)
            }));
        }

        SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        SESSIONS_ACTIVE.inc();

        tracing::info!(
            "Session started: id={}, mode={}, questions={}, budget={:?}",
            self.id,
            self.policy.mode,
            inner.questions.len(),
            self.policy.time_budget_seconds
        );

        Ok(self.id.clone())
    }

    /// Writes an answer. Returns the number of answered questions.
    pub fn record_answer(
        &self,
        question_id: &str,
        value: AnswerValue,
    ) -> Result<usize, SessionError> {
        let mut guard = self.inner();
        let inner = &mut *guard;

        let state = self.state();
        if state != SessionState::Active {
            ANSWERS_RECORDED_TOTAL.with_label_values(&["closed"]).inc();
            return Err(SessionError::InvalidState {
                operation: "record an answer",
                state,
            });
        }
        // Expired but the timeout finalize has not taken the lock yet.
        if inner.timer.as_ref().is_some_and(CountdownTimer::has_fired) {
            ANSWERS_RECORDED_TOTAL.with_label_values(&["closed"]).inc();
            return Err(SessionError::InvalidState {
                operation: "record an answer",
                state: SessionState::Finalizing,
            });
        }

        let question = inner
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
        if !question.accepts(&value) {
            ANSWERS_RECORDED_TOTAL.with_label_values(&["invalid"]).inc();
            return Err(SessionError::InvalidOption(question_id.to_string()));
        }

        if let Err(e) = inner.ledger.set(question_id, value) {
            ANSWERS_RECORDED_TOTAL.with_label_values(&["locked"]).inc();
            tracing::debug!("Answer rejected: session={}, {}", self.id, e);
            return Err(e);
        }

        inner.last_activity = Instant::now();
        ANSWERS_RECORDED_TOTAL.with_label_values(&["accepted"]).inc();
        Ok(inner.ledger.len())
    }

    /// Ends answer collection and produces the session's only result.
    ///
    /// Safe to call any number of times from any trigger: the first call that
    /// moves `Active -> Finalizing` scores and persists, every other call
    /// waits for and returns that same result.
    pub async fn finalize(
        self: &Arc<Self>,
        cause: FinalizeCause,
    ) -> Result<Arc<Finalization>, SessionError> {
        let taken = {
            let mut guard = self.inner();
            let inner = &mut *guard;
            match self.transition(SessionState::Active, SessionState::Finalizing) {
                Ok(()) => {
                    if let Some(timer) = inner.timer.take() {
                        timer.cancel();
                    }
                    let snapshot = inner.ledger.snapshot(&inner.questions);
                    Ok((inner.questions.clone(), snapshot, inner.started_at))
                }
                Err(observed) => Err(observed),
            }
        };

        let (questions, selections, started_at) = match taken {
            Ok(parts) => parts,
            Err(observed) => return self.wait_for_result(observed).await,
        };

        let submitted_at = Utc::now();
        let sheet = scorer::score(&questions, &selections);
        let result = self.assemble(sheet, started_at.unwrap_or(submitted_at), submitted_at, cause);

        SESSIONS_FINALIZED_TOTAL
            .with_label_values(&[self.policy.mode.as_str(), cause.as_str()])
            .inc();
        tracing::info!(
            "Session finalizing: id={}, cause={}, score={}/{}",
            self.id,
            cause.as_str(),
            result.score,
            result.total
        );

        // Persisting on its own task keeps a dropped caller from leaving the
        // session stuck in Finalizing.
        let session = Arc::clone(self);
        tokio::spawn(async move { session.close(result).await })
            .await
            .map_err(|e| {
                SessionError::PersistenceFailure(format!("finalization task failed: {}", e))
            })
    }

    /// Cancels the session without producing a result.
    pub fn abandon(&self) -> Result<(), SessionError> {
        let mut inner = self.inner();
        let from = self.state();
        if !matches!(from, SessionState::Loading | SessionState::Active) {
            return Err(SessionError::InvalidState {
                operation: "abandon",
                state: from,
            });
        }
        self.transition(from, SessionState::Abandoned)
            .map_err(|state| SessionError::InvalidState {
                operation: "abandon",
                state,
            })?;

        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        inner.finished_at = Some(Instant::now());
        if !inner.ledger.is_empty() {
            tracing::debug!(
                "Discarding {} recorded answers of session {}",
                inner.ledger.len(),
                self.id
            );
        }

        SESSIONS_TOTAL.with_label_values(&["abandoned"]).inc();
        if from == SessionState::Active {
            SESSIONS_ACTIVE.dec();
        }
        tracing::info!("Session abandoned: id={}", self.id);
        Ok(())
    }

    /// `None` while an untimed session is active, 0 once answer collection ended.
    pub fn remaining_seconds(&self) -> Option<u64> {
        match self.state() {
            SessionState::Loading => self.policy.time_budget_seconds,
            SessionState::Active => self.inner().timer.as_ref().map(CountdownTimer::remaining),
            _ => Some(0),
        }
    }

    /// Live countdown, if the session is active and timed.
    pub fn countdown(&self) -> Option<watch::Receiver<u64>> {
        if self.state() != SessionState::Active {
            return None;
        }
        self.inner().timer.as_ref().map(CountdownTimer::subscribe)
    }

    pub fn result(&self) -> Option<Arc<Finalization>> {
        self.finalized.borrow().clone()
    }

    /// Time since the session was created, started or last answered.
    pub fn idle_for(&self) -> Duration {
        self.inner().last_activity.elapsed()
    }

    /// How long ago the session reached Closed or Abandoned.
    pub fn finished_for(&self) -> Option<Duration> {
        self.inner().finished_at.map(|at| at.elapsed())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (started_at, answered, total) = {
            let inner = self.inner();
            (inner.started_at, inner.ledger.len(), inner.questions.len())
        };
        let result = self.result();
        SessionSnapshot {
            session_id: self.id.clone(),
            mode: self.policy.mode,
            state: self.state(),
            started_at,
            time_budget_seconds: self.policy.time_budget_seconds,
            remaining_seconds: self.remaining_seconds(),
            answered,
            total,
            result: result.map(|f| (*f).clone()),
        }
    }

    async fn close(&self, result: ExamResult) -> Arc<Finalization> {
        let persistence = match self.persister.persist(&result).await {
            Ok(outcome) => outcome,
            Err(e) => PersistenceOutcome::Failed {
                reason: e.to_string(),
            },
        };

        let finalization = Arc::new(Finalization {
            result,
            persistence,
        });

        // Publish before flipping to Closed so a Closed session always has a result.
        self.finalized.send_replace(Some(finalization.clone()));
        self.inner().finished_at = Some(Instant::now());
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);

        SESSIONS_TOTAL.with_label_values(&["closed"]).inc();
        SESSIONS_ACTIVE.dec();
        tracing::info!(
            "Session closed: id={}, policy={}, persistence={:?}",
            self.id,
            self.persister.policy().as_str(),
            finalization.persistence
        );

        finalization
    }

    async fn wait_for_result(
        &self,
        observed: SessionState,
    ) -> Result<Arc<Finalization>, SessionError> {
        if !matches!(observed, SessionState::Finalizing | SessionState::Closed) {
            return Err(SessionError::InvalidState {
                operation: "finalize",
                state: observed,
            });
        }

        let mut rx = self.finalized.subscribe();
        let finalization = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| value.clone());

        finalization.ok_or(SessionError::InvalidState {
            operation: "finalize",
            state: observed,
        })
    }

    fn assemble(
        &self,
        sheet: ScoreSheet,
        started_at: DateTime<Utc>,
        submitted_at: DateTime<Utc>,
        cause: FinalizeCause,
    ) -> ExamResult {
        let elapsed = elapsed_seconds(started_at, submitted_at);
        let duration_seconds = match self.policy.time_budget_seconds {
            Some(budget) => elapsed.min(budget),
            None => elapsed,
        };

        ExamResult {
            session_id: self.id.clone(),
            mode: self.policy.mode,
            exam_id: self.context.exam_id.clone(),
            user_id: self.context.user_id.clone(),
            score: sheet.score,
            total: sheet.total,
            percentage: sheet.percentage,
            answers: sheet.answers,
            topic_stats: sheet.topic_stats,
            started_at,
            submitted_at,
            duration_seconds,
            cause,
        }
    }

    fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(SessionState::from_u8)
    }

    fn inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_questions(questions: &[Question]) -> Result<(), SessionError> {
    let mut seen = HashSet::new();
    for question in questions {
        if !seen.insert(question.id.as_str()) {
            return Err(SessionError::InvalidQuestion {
                id: question.id.clone(),
                reason: "duplicate question id".to_string(),
            });
        }
        question
            .validate_key()
            .map_err(|reason| SessionError::InvalidQuestion {
                id: question.id.clone(),
                reason,
            })?;
    }
    Ok(())
}

/// Timer callback: finalize on a fresh task so the countdown task can finish.
fn expire(session: Weak<SessionController>) {
    let Some(session) = session.upgrade() else {
        return;
    };
    tokio::spawn(async move {
        match session.finalize(FinalizeCause::Timeout).await {
            Ok(finalization) => tracing::info!(
                "Session {} auto-submitted on timeout (cause of result: {})",
                session.id(),
                finalization.result.cause.as_str()
            ),
            Err(e) => tracing::debug!("Timeout finalize skipped for {}: {}", session.id(), e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::persister::tests::CountingStore;
    use crate::engine::persister::ResultStore;
    use crate::models::exam::PersistPolicy;

    const TICK: Duration = Duration::from_secs(1);

    fn choice(value: &str) -> AnswerValue {
        AnswerValue::Choice(value.to_string())
    }

    fn question(id: &str, topic: &str, key: &str) -> Question {
        Question {
            id: id.to_string(),
            content: format!("Question {}", id),
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_answer: choice(key),
            topic: topic.to_string(),
            difficulty: "easy".to_string(),
            explanation: None,
            exam_id: Some("exam-1".to_string()),
            class_id: None,
        }
    }

    fn office_questions() -> Vec<Question> {
        vec![
            question("q1", "Word", "A"),
            question("q2", "Word", "B"),
            question("q3", "Excel", "C"),
        ]
    }

    fn owner() -> SessionContext {
        SessionContext {
            exam_id: Some("exam-1".to_string()),
            user_id: Some("student-1".to_string()),
        }
    }

    fn session(
        mode: ExamMode,
        context: SessionContext,
        store: Option<Arc<CountingStore>>,
    ) -> Arc<SessionController> {
        let policy = ModePolicy::default_for(mode);
        let store = store.map(|s| s as Arc<dyn ResultStore>);
        SessionController::new(
            policy,
            context,
            ResultPersister::new(policy.persist, store),
            TICK,
        )
    }

    #[tokio::test]
    async fn manual_submit_scores_recorded_answers() {
        let store = Arc::new(CountingStore::default());
        let session = session(ExamMode::Official, owner(), Some(store.clone()));
        session.start(office_questions()).unwrap();

        session.record_answer("q1", choice("A")).unwrap();
        session.record_answer("q2", choice("A")).unwrap();
        session.record_answer("q3", choice("C")).unwrap();

        let done = session.finalize(FinalizeCause::Manual).await.unwrap();

        assert_eq!(done.result.score, 2);
        assert_eq!(done.result.total, 3);
        assert_eq!(done.result.topic_stats.get("Word"), Some(&50));
        assert_eq!(done.result.topic_stats.get("Excel"), Some(&100));
        assert_eq!(done.result.cause, FinalizeCause::Manual);
        assert_eq!(done.persistence, PersistenceOutcome::Stored);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_finalize_produces_one_result_and_one_write() {
        let store = Arc::new(CountingStore::default());
        let session = session(ExamMode::Official, owner(), Some(store.clone()));
        session.start(office_questions()).unwrap();
        session.record_answer("q1", choice("A")).unwrap();

        let (manual, timeout) = tokio::join!(
            session.finalize(FinalizeCause::Manual),
            session.finalize(FinalizeCause::Timeout)
        );
        let manual = manual.unwrap();
        let timeout = timeout.unwrap();

        assert!(Arc::ptr_eq(&manual, &timeout));
        assert_eq!(store.calls(), 1);

        let again = session.finalize(FinalizeCause::Manual).await.unwrap();
        assert!(Arc::ptr_eq(&manual, &again));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expiry_racing_submit_still_writes_once() {
        let store = Arc::new(CountingStore::default());
        let mut policy = ModePolicy::default_for(ExamMode::Mock);
        policy.time_budget_seconds = Some(2);
        let session = SessionController::new(
            policy,
            owner(),
            ResultPersister::new(policy.persist, Some(store.clone() as Arc<dyn ResultStore>)),
            TICK,
        );
        session.start(office_questions()).unwrap();

        tokio::time::sleep(Duration::from_millis(1_999)).await;
        let manual = session.finalize(FinalizeCause::Manual);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let manual = manual.await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(store.calls(), 1);
        assert_eq!(session.result().unwrap().result, manual.result);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_budget_once() {
        let store = Arc::new(CountingStore::default());
        let mut policy = ModePolicy::default_for(ExamMode::Mock);
        policy.time_budget_seconds = Some(3);
        let session = SessionController::new(
            policy,
            owner(),
            ResultPersister::new(policy.persist, Some(store.clone() as Arc<dyn ResultStore>)),
            TICK,
        );
        session.start(office_questions()).unwrap();
        session.record_answer("q3", choice("C")).unwrap();

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.remaining_seconds(), Some(1));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.state(), SessionState::Closed);

        let done = session.result().unwrap();
        assert_eq!(done.result.cause, FinalizeCause::Timeout);
        assert_eq!(done.result.score, 1);
        assert!(done.result.duration_seconds <= 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.calls(), 1);
        assert_eq!(session.remaining_seconds(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn answers_after_deadline_are_rejected() {
        let mut policy = ModePolicy::default_for(ExamMode::Mock);
        policy.time_budget_seconds = Some(1);
        let session = SessionController::new(
            policy,
            owner(),
            ResultPersister::new(PersistPolicy::None, None),
            TICK,
        );
        session.start(office_questions()).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        let err = session.record_answer("q1", choice("A")).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
        let done = session.result().unwrap();
        assert_eq!(done.result.answers[0].selected, None);
    }

    #[tokio::test]
    async fn lock_on_select_keeps_first_answer() {
        let session = session(ExamMode::Mock, owner(), None);
        session.start(office_questions()).unwrap();

        session.record_answer("q1", choice("A")).unwrap();
        let err = session.record_answer("q1", choice("B")).unwrap_err();
        assert_eq!(err, SessionError::AlreadyAnswered("q1".to_string()));
        assert_eq!(session.state(), SessionState::Active);

        let done = session.finalize(FinalizeCause::Manual).await.unwrap();
        assert_eq!(done.result.answers[0].selected, Some(choice("A")));
    }

    #[tokio::test]
    async fn practice_allows_overwrite_and_skips_persistence() {
        let store = Arc::new(CountingStore::default());
        let session = session(ExamMode::Practice, SessionContext::default(), Some(store.clone()));
        session.start(office_questions()).unwrap();
        assert_eq!(session.remaining_seconds(), None);

        session.record_answer("q1", choice("C")).unwrap();
        session.record_answer("q1", choice("A")).unwrap();

        let done = session.finalize(FinalizeCause::Manual).await.unwrap();
        assert_eq!(done.result.answers[0].selected, Some(choice("A")));
        assert_eq!(done.persistence, PersistenceOutcome::Skipped);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn persistence_failure_still_closes_with_result() {
        let store = Arc::new(CountingStore::failing());
        let session = session(ExamMode::Official, owner(), Some(store.clone()));
        session.start(office_questions()).unwrap();
        session.record_answer("q2", choice("B")).unwrap();

        let done = session.finalize(FinalizeCause::Manual).await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(done.persistence.is_failed());
        assert_eq!(done.result.score, 1);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn official_result_without_owner_is_not_written() {
        let store = Arc::new(CountingStore::default());
        let context = SessionContext {
            exam_id: Some("exam-1".to_string()),
            user_id: None,
        };
        let session = session(ExamMode::Official, context, Some(store.clone()));
        session.start(office_questions()).unwrap();

        let done = session.finalize(FinalizeCause::Manual).await.unwrap();

        assert!(done.persistence.is_failed());
        assert_eq!(store.calls(), 0);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn empty_exam_never_becomes_active() {
        let session = session(ExamMode::Official, owner(), None);
        assert_eq!(session.start(Vec::new()), Err(SessionError::EmptyQuestionSet));
        assert_eq!(session.state(), SessionState::Loading);

        let practice = self::session(ExamMode::Practice, SessionContext::default(), None);
        practice.start(Vec::new()).unwrap();
        assert_eq!(practice.state(), SessionState::Active);
        let done = practice.finalize(FinalizeCause::Manual).await.unwrap();
        assert_eq!(done.result.total, 0);
    }

    #[tokio::test]
    async fn malformed_questions_are_rejected() {
        let mut broken = question("q9", "Word", "A");
        broken.correct_answer = choice("Z");
        let session = session(ExamMode::Mock, owner(), None);

        let err = session.start(vec![broken]).unwrap_err();
        assert!(matches!(err, SessionError::InvalidQuestion { .. }));

        let duplicated = vec![question("q1", "Word", "A"), question("q1", "Word", "B")];
        assert!(session.start(duplicated).is_err());
    }

    #[tokio::test]
    async fn rejects_unknown_questions_and_options() {
        let session = session(ExamMode::Mock, owner(), None);
        session.start(office_questions()).unwrap();

        assert_eq!(
            session.record_answer("nope", choice("A")),
            Err(SessionError::UnknownQuestion("nope".to_string()))
        );
        assert_eq!(
            session.record_answer("q1", choice("D")),
            Err(SessionError::InvalidOption("q1".to_string()))
        );
        assert_eq!(session.snapshot().answered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_cancels_timer_without_result() {
        let store = Arc::new(CountingStore::default());
        let mut policy = ModePolicy::default_for(ExamMode::Mock);
        policy.time_budget_seconds = Some(2);
        let session = SessionController::new(
            policy,
            owner(),
            ResultPersister::new(policy.persist, Some(store.clone() as Arc<dyn ResultStore>)),
            TICK,
        );
        session.start(office_questions()).unwrap();

        session.abandon().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(session.state(), SessionState::Abandoned);
        assert!(session.result().is_none());
        assert_eq!(store.calls(), 0);
        assert!(matches!(
            session.finalize(FinalizeCause::Manual).await,
            Err(SessionError::InvalidState { .. })
        ));
        assert!(session.abandon().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_tick_keeps_budget_in_seconds() {
        let store = Arc::new(CountingStore::default());
        let mut policy = ModePolicy::default_for(ExamMode::Mock);
        policy.time_budget_seconds = Some(4);
        let session = SessionController::new(
            policy,
            owner(),
            ResultPersister::new(policy.persist, Some(store.clone() as Arc<dyn ResultStore>)),
            Duration::from_millis(250),
        );
        session.start(office_questions()).unwrap();

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.remaining_seconds(), Some(3));

        tokio::time::sleep(Duration::from_millis(2_800)).await;
        assert_eq!(session.state(), SessionState::Active);
        session.record_answer("q1", choice("A")).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.state(), SessionState::Closed);
        let done = session.result().unwrap();
        assert_eq!(done.result.cause, FinalizeCause::Timeout);
        assert_eq!(done.result.score, 1);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn answers_reset_idle_time() {
        let session = session(ExamMode::Practice, owner(), None);
        session.start(office_questions()).unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(session.idle_for() >= Duration::from_secs(30));

        session.record_answer("q1", choice("A")).unwrap();
        assert!(session.idle_for() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn mismatched_answer_shape_does_not_lock_question() {
        let session = session(ExamMode::Mock, owner(), None);
        session.start(office_questions()).unwrap();

        let err = session
            .record_answer("q1", AnswerValue::Choices([0].into()))
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidOption("q1".to_string()));

        assert_eq!(session.record_answer("q1", choice("A")).unwrap(), 1);
    }

    #[tokio::test]
    async fn start_twice_is_invalid() {
        let session = session(ExamMode::Mock, owner(), None);
        session.start(office_questions()).unwrap();
        assert!(matches!(
            session.start(office_questions()),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn snapshot_reports_progress() {
        let session = session(ExamMode::Mock, owner(), None);
        assert_eq!(session.remaining_seconds(), Some(1200));
        session.start(office_questions()).unwrap();
        session.record_answer("q2", choice("B")).unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.answered, 1);
        assert_eq!(snapshot.total, 3);
        assert!(snapshot.result.is_none());
        assert!(snapshot.started_at.is_some());
    }
}

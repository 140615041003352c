use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::config::ExamSettings;
use crate::engine::{
    ResultPersister, ResultStore, SessionContext, SessionController, SessionError,
};
use crate::models::answer::{RecordAnswerRequest, RecordAnswerResponse};
use crate::models::exam::{FinalizeCause, PersistPolicy};
use crate::models::question::PublicQuestion;
use crate::models::result::Finalization;
use crate::models::{CreateSessionRequest, CreateSessionResponse, SessionSnapshot};
use crate::services::question_repository::QuestionSource;

/// Where results go, per persist policy.
#[derive(Clone, Default)]
pub struct ResultStores {
    pub best_effort: Option<Arc<dyn ResultStore>>,
    pub durable: Option<Arc<dyn ResultStore>>,
}

impl ResultStores {
    fn for_policy(&self, policy: PersistPolicy) -> Option<Arc<dyn ResultStore>> {
        match policy {
            PersistPolicy::None => None,
            PersistPolicy::BestEffort => self.best_effort.clone(),
            PersistPolicy::Required => self.durable.clone(),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn ResultStore>> {
        self.best_effort.iter().chain(self.durable.iter())
    }
}

/// Registry of live sessions. Builds controllers from the mode settings and
/// routes every request to the controller that owns the session.
pub struct SessionService {
    questions: Arc<dyn QuestionSource>,
    stores: ResultStores,
    exam: ExamSettings,
    sessions: RwLock<HashMap<String, Arc<SessionController>>>,
}

impl SessionService {
    pub fn new(questions: Arc<dyn QuestionSource>, stores: ResultStores, exam: ExamSettings) -> Self {
        Self {
            questions,
            stores,
            exam,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn question_source(&self) -> &Arc<dyn QuestionSource> {
        &self.questions
    }

    pub fn stores(&self) -> &ResultStores {
        &self.stores
    }

    pub fn exam_settings(&self) -> &ExamSettings {
        &self.exam
    }

    pub async fn create_session(
        &self,
        req: CreateSessionRequest,
    ) -> Result<CreateSessionResponse, SessionError> {
        let policy = self.exam.policy(req.mode);
        let persister = ResultPersister::new(policy.persist, self.stores.for_policy(policy.persist));
        let selector = req.selector();
        let context = SessionContext {
            exam_id: req.exam_id,
            user_id: req.user_id,
        };

        let controller =
            SessionController::new(policy, context, persister, self.exam.tick_interval());
        let session_id = controller.id().to_string();
        self.write().insert(session_id.clone(), controller.clone());

        let started = match self.questions.fetch_questions(&selector).await {
            Ok(questions) => controller.start(questions),
            Err(e) => {
                tracing::error!("Failed to fetch questions for {:?}: {:#}", selector, e);
                Err(SessionError::QuestionSource(e.to_string()))
            }
        };

        if let Err(e) = started {
            self.write().remove(&session_id);
            return Err(e);
        }

        let questions = controller.questions();
        let snapshot = controller.snapshot();
        tracing::info!(
            "Session created: id={}, mode={}, questions={}",
            session_id,
            policy.mode,
            questions.len()
        );

        Ok(CreateSessionResponse {
            session_id,
            mode: policy.mode,
            questions: questions.iter().map(PublicQuestion::from).collect(),
            time_budget_seconds: policy.time_budget_seconds,
            lock_on_select: policy.lock_on_select,
            started_at: snapshot.started_at,
        })
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<SessionController>, SessionError> {
        self.read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    pub fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        Ok(self.get(session_id)?.snapshot())
    }

    pub fn record_answer(
        &self,
        session_id: &str,
        req: RecordAnswerRequest,
    ) -> Result<RecordAnswerResponse, SessionError> {
        let controller = self.get(session_id)?;
        let answered_count = controller.record_answer(&req.question_id, req.value)?;

        Ok(RecordAnswerResponse {
            question_id: req.question_id,
            answered_count,
            remaining_seconds: controller.remaining_seconds(),
        })
    }

    pub async fn submit(&self, session_id: &str) -> Result<Arc<Finalization>, SessionError> {
        let controller = self.get(session_id)?;
        controller.finalize(FinalizeCause::Manual).await
    }

    /// Abandoned sessions stay visible until the next eviction sweep.
    pub fn abandon(&self, session_id: &str) -> Result<(), SessionError> {
        self.get(session_id)?.abandon()
    }

    pub fn active_count(&self) -> usize {
        self.read()
            .values()
            .filter(|session| !session.state().is_finished())
            .count()
    }

    /// Abandons untimed sessions that saw no activity for `idle_timeout`.
    /// Timed sessions are left to their countdown, which always produces a result.
    pub fn release_idle(&self, idle_timeout: Duration) -> usize {
        let idle: Vec<Arc<SessionController>> = self
            .read()
            .values()
            .filter(|session| {
                session.policy().time_budget_seconds.is_none()
                    && !session.state().is_finished()
                    && session.idle_for() >= idle_timeout
            })
            .cloned()
            .collect();

        idle.iter()
            .filter(|session| match session.abandon() {
                Ok(()) => {
                    tracing::info!("Released idle session {}", session.id());
                    true
                }
                Err(e) => {
                    tracing::debug!("Idle session {} not released: {}", session.id(), e);
                    false
                }
            })
            .count()
    }

    /// Releases idle sessions, then evicts finished ones.
    pub fn sweep(&self) -> usize {
        self.release_idle(self.exam.idle_timeout());
        self.evict_finished(self.exam.closed_retention())
    }

    /// Drops sessions that finished more than `retention` ago.
    pub fn evict_finished(&self, retention: Duration) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| {
            session
                .finished_for()
                .is_none_or(|finished_for| finished_for < retention)
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} finished sessions", evicted);
        }
        evicted
    }

    /// Periodic eviction sweep, runs until the service is dropped elsewhere.
    pub async fn run_eviction(self: Arc<Self>) {
        let period = self
            .exam
            .closed_retention()
            .min(self.exam.idle_timeout())
            .clamp(Duration::from_secs(1), Duration::from_secs(60));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            self.sweep();
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SessionController>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SessionController>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

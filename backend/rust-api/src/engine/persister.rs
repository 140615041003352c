use async_trait::async_trait;
use std::sync::Arc;

use super::error::SessionError;
use crate::metrics::RESULT_WRITES_TOTAL;
use crate::models::exam::PersistPolicy;
use crate::models::result::{ExamResult, PersistenceOutcome};

/// Append-only sink for finished results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn save_result(&self, result: &ExamResult) -> anyhow::Result<()>;

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Applies a mode's persist policy on top of an optional store.
#[derive(Clone)]
pub struct ResultPersister {
    policy: PersistPolicy,
    store: Option<Arc<dyn ResultStore>>,
}

impl ResultPersister {
    pub fn new(policy: PersistPolicy, store: Option<Arc<dyn ResultStore>>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> PersistPolicy {
        self.policy
    }

    pub async fn persist(&self, result: &ExamResult) -> Result<PersistenceOutcome, SessionError> {
        let outcome = match self.policy {
            PersistPolicy::None => Ok(PersistenceOutcome::Skipped),
            PersistPolicy::BestEffort => self.persist_best_effort(result).await,
            PersistPolicy::Required => self.persist_required(result).await,
        };

        let status = match &outcome {
            Ok(PersistenceOutcome::Stored) => "stored",
            Ok(_) => "skipped",
            Err(_) => "failed",
        };
        RESULT_WRITES_TOTAL
            .with_label_values(&[self.policy.as_str(), status])
            .inc();

        outcome
    }

    async fn persist_best_effort(
        &self,
        result: &ExamResult,
    ) -> Result<PersistenceOutcome, SessionError> {
        let Some(store) = &self.store else {
            return Ok(PersistenceOutcome::Skipped);
        };

        match store.save_result(result).await {
            Ok(()) => Ok(PersistenceOutcome::Stored),
            Err(e) => {
                tracing::warn!(
                    "Best-effort result write to {} failed: session={}, error={:#}",
                    store.name(),
                    result.session_id,
                    e
                );
                Err(SessionError::PersistenceFailure(e.to_string()))
            }
        }
    }

    async fn persist_required(
        &self,
        result: &ExamResult,
    ) -> Result<PersistenceOutcome, SessionError> {
        let has_owner = result.exam_id.as_deref().is_some_and(|id| !id.is_empty())
            && result.user_id.as_deref().is_some_and(|id| !id.is_empty());
        if !has_owner {
            tracing::error!(
                "Refusing required result write without exam_id/user_id: session={}",
                result.session_id
            );
            return Err(SessionError::PersistenceFailure(
                "exam_id and user_id are required for this result".to_string(),
            ));
        }

        let Some(store) = &self.store else {
            return Err(SessionError::PersistenceFailure(
                "no durable result store configured".to_string(),
            ));
        };

        store.save_result(result).await.map_err(|e| {
            tracing::error!(
                "Required result write to {} failed: session={}, error={:#}",
                store.name(),
                result.session_id,
                e
            );
            SessionError::PersistenceFailure(e.to_string())
        })?;

        tracing::info!(
            "Result stored in {}: session={}",
            store.name(),
            result.session_id
        );
        Ok(PersistenceOutcome::Stored)
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::{doc, to_document, Document},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    Collection, Database,
};
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::engine::ResultStore;
use crate::metrics::{track_cache_operation, track_db_operation};
use crate::models::result::ExamResult;
use crate::utils::retry::{retry_async_when, RetryConfig};
use crate::utils::time::chrono_to_bson;

const RESULTS_COLLECTION: &str = "exam_results";
const DUPLICATE_KEY: i32 = 11000;

/// Durable result store. One document per session, keyed by session id.
pub struct MongoResultStore {
    mongo: Database,
    retry: RetryConfig,
}

impl MongoResultStore {
    pub fn new(mongo: Database, retry: RetryConfig) -> Self {
        Self { mongo, retry }
    }
}

#[async_trait]
impl ResultStore for MongoResultStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn save_result(&self, result: &ExamResult) -> Result<()> {
        let collection: Collection<Document> = self.mongo.collection(RESULTS_COLLECTION);
        let document = result_document(result)?;

        let outcome = track_db_operation("insert_one", RESULTS_COLLECTION, async {
            retry_async_when(
                self.retry.clone(),
                || async { collection.insert_one(&document).await.map(|_| ()) },
                |e: &MongoError| !is_duplicate_key(e),
            )
            .await
            .or_else(|e| {
                // The same session id was already written by an earlier attempt.
                if is_duplicate_key(&e) {
                    tracing::warn!(
                        "Result already stored, treating as written: session={}",
                        result.session_id
                    );
                    Ok(())
                } else {
                    Err(e)
                }
            })
            .context("Failed to store exam result")
        })
        .await;

        if outcome.is_ok() {
            tracing::info!("Exam result stored: session={}", result.session_id);
        }
        outcome
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

fn result_document(result: &ExamResult) -> Result<Document> {
    let mut document = to_document(result).context("Failed to encode exam result")?;
    document.insert("_id", result.session_id.clone());
    document.insert("stored_at", chrono_to_bson(Utc::now()));
    Ok(document)
}

fn is_duplicate_key(error: &MongoError) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        _ => false,
    }
}

/// Cache-backed store for results that only need to outlive the session for a while.
pub struct RedisResultStore {
    redis: ConnectionManager,
    ttl: Duration,
}

impl RedisResultStore {
    pub fn new(redis: ConnectionManager, ttl: Duration) -> Self {
        Self { redis, ttl }
    }
}

pub fn result_key(session_id: &str) -> String {
    format!("exam_result:{}", session_id)
}

#[async_trait]
impl ResultStore for RedisResultStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn save_result(&self, result: &ExamResult) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = result_key(&result.session_id);
        let payload = serde_json::to_string(result)?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&key)
                .arg(self.ttl.as_secs().max(1))
                .arg(payload)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to save exam result to Redis")
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis ping failed")?;
        Ok(())
    }
}

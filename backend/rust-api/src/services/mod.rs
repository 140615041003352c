use crate::config::Config;
use crate::utils::retry::RetryConfig;
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

pub mod question_repository;
pub mod result_store;
pub mod session_service;

use question_repository::{MongoQuestionRepository, QuestionSource};
use result_store::{MongoResultStore, RedisResultStore};
use session_service::{ResultStores, SessionService};

pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionService>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        // Create ConnectionManager with longer timeout
        let redis = tokio::time::timeout(
            Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let questions: Arc<dyn QuestionSource> =
            Arc::new(MongoQuestionRepository::new(mongo.clone()));
        let stores = ResultStores {
            best_effort: Some(Arc::new(RedisResultStore::new(
                redis,
                Duration::from_secs(config.exam.best_effort_ttl_secs),
            ))),
            durable: Some(Arc::new(MongoResultStore::new(
                mongo,
                RetryConfig::from(&config.retry),
            ))),
        };

        let sessions = Arc::new(SessionService::new(questions, stores, config.exam.clone()));
        Ok(Self::with_service(config, sessions))
    }

    /// State around an already built service; used by tests with in-memory sources.
    pub fn with_service(config: Config, sessions: Arc<SessionService>) -> Self {
        Self { config, sessions }
    }
}

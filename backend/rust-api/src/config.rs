use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::models::exam::{ExamMode, ModePolicy, PersistPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub bind_addr: String,
    pub exam: ExamSettings,
    pub retry: RetrySettings,
}

/// Overrides for one mode. Anything left unset keeps the mode's default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModeOverrides {
    pub time_budget_seconds: Option<u64>,
    /// Drops the time budget entirely.
    pub untimed: Option<bool>,
    pub lock_on_select: Option<bool>,
    pub persist: Option<PersistPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExamSettings {
    pub tick_interval_ms: u64,
    pub closed_retention_secs: u64,
    /// Untimed sessions with no activity for this long are abandoned.
    pub idle_timeout_secs: u64,
    pub best_effort_ttl_secs: u64,
    pub practice: ModeOverrides,
    pub mock: ModeOverrides,
    pub official: ModeOverrides,
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            closed_retention_secs: 900,
            idle_timeout_secs: 4 * 3600,
            best_effort_ttl_secs: 7 * 24 * 3600,
            practice: ModeOverrides::default(),
            mock: ModeOverrides::default(),
            official: ModeOverrides::default(),
        }
    }
}

impl ExamSettings {
    pub fn policy(&self, mode: ExamMode) -> ModePolicy {
        let overrides = match mode {
            ExamMode::Practice => &self.practice,
            ExamMode::Mock => &self.mock,
            ExamMode::Official => &self.official,
        };

        let mut policy = ModePolicy::default_for(mode);
        if let Some(seconds) = overrides.time_budget_seconds {
            policy.time_budget_seconds = Some(seconds);
        }
        if overrides.untimed == Some(true) {
            policy.time_budget_seconds = None;
        }
        if let Some(lock) = overrides.lock_on_select {
            policy.lock_on_select = lock;
        }
        if let Some(persist) = overrides.persist {
            policy.persist = persist;
        }
        policy
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn closed_retention(&self) -> Duration {
        Duration::from_secs(self.closed_retention_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 50,
            max_backoff_ms: 1000,
            jitter_max_ms: 100,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            mongo_database: "assessment".to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            exam: ExamSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml, then APP__SECTION__KEY environment overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or(defaults.redis_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .unwrap_or(defaults.bind_addr);

        let exam = match settings.get::<ExamSettings>("exam") {
            Ok(exam) => exam,
            Err(config::ConfigError::NotFound(_)) => ExamSettings::default(),
            Err(e) => return Err(e),
        };

        let retry = match settings.get::<RetrySettings>("retry") {
            Ok(retry) => retry,
            Err(config::ConfigError::NotFound(_)) => RetrySettings::default(),
            Err(e) => return Err(e),
        };

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            bind_addr,
            exam,
            retry,
        })
    }
}

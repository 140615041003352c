use serde::{Deserialize, Serialize};
use std::fmt;

/// Exam flavour a session runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamMode {
    Practice,
    Mock,
    Official,
}

impl ExamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamMode::Practice => "practice",
            ExamMode::Mock => "mock",
            ExamMode::Official => "official",
        }
    }
}

impl fmt::Display for ExamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a session. Transitions only move forward:
/// `Loading -> Active -> Finalizing -> Closed`, or `Loading|Active -> Abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Loading = 0,
    Active = 1,
    Finalizing = 2,
    Closed = 3,
    Abandoned = 4,
}

impl SessionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Loading,
            1 => SessionState::Active,
            2 => SessionState::Finalizing,
            3 => SessionState::Closed,
            _ => SessionState::Abandoned,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::Active => "active",
            SessionState::Finalizing => "finalizing",
            SessionState::Closed => "closed",
            SessionState::Abandoned => "abandoned",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Abandoned)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What ended answer collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeCause {
    Manual,
    Timeout,
}

impl FinalizeCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizeCause::Manual => "manual",
            FinalizeCause::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    None,
    BestEffort,
    Required,
}

impl PersistPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistPolicy::None => "none",
            PersistPolicy::BestEffort => "best_effort",
            PersistPolicy::Required => "required",
        }
    }
}

/// Per-mode rules: time budget, answer locking and result durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModePolicy {
    pub mode: ExamMode,
    /// `None` means the session is untimed.
    pub time_budget_seconds: Option<u64>,
    pub lock_on_select: bool,
    pub persist: PersistPolicy,
}

impl ModePolicy {
    pub fn default_for(mode: ExamMode) -> Self {
        match mode {
            ExamMode::Practice => ModePolicy {
                mode,
                time_budget_seconds: None,
                lock_on_select: false,
                persist: PersistPolicy::None,
            },
            ExamMode::Mock => ModePolicy {
                mode,
                time_budget_seconds: Some(1200),
                lock_on_select: true,
                persist: PersistPolicy::BestEffort,
            },
            ExamMode::Official => ModePolicy {
                mode,
                time_budget_seconds: Some(1800),
                lock_on_select: true,
                persist: PersistPolicy::Required,
            },
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimerEvent {
    TimerTick(TimerTick),
    TimeExpired(TimeExpired),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimerTick {
    pub session_id: String,
    pub remaining_seconds: u64,
    pub elapsed_seconds: u64,
    pub total_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeExpired {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl TimerEvent {
    pub fn countdown(session_id: &str, remaining: u64, total: u64) -> Self {
        if remaining == 0 {
            TimerEvent::TimeExpired(TimeExpired {
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
                message: "Time limit reached, answers submitted".to_string(),
            })
        } else {
            TimerEvent::TimerTick(TimerTick {
                session_id: session_id.to_string(),
                remaining_seconds: remaining,
                elapsed_seconds: total.saturating_sub(remaining),
                total_seconds: total,
                timestamp: Utc::now(),
            })
        }
    }

    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            TimerEvent::TimerTick(_) => "timer-tick",
            TimerEvent::TimeExpired(_) => "time-expired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_reports_elapsed_and_expiry() {
        match TimerEvent::countdown("s1", 30, 1200) {
            TimerEvent::TimerTick(tick) => {
                assert_eq!(tick.elapsed_seconds, 1170);
                assert_eq!(tick.total_seconds, 1200);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let expired = TimerEvent::countdown("s1", 0, 1200);
        assert_eq!(expired.event_name(), "time-expired");
        assert!(expired.to_sse_data().contains("\"type\":\"time-expired\""));
    }
}

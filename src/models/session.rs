use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Draft,
    Running,
    Closed,
}

/// An instructor-scheduled exam session with a time window and a set of
/// class groups allowed to participate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allowed_class_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session currently accepts student activity. Status must
    /// be Running and `now` must fall inside the scheduled window.
    pub fn is_active_now(&self, now: DateTime<Utc>) -> bool {
        if self.status != SessionStatus::Running {
            return false;
        }
        if let Some(starts_at) = self.starts_at {
            if now < starts_at {
                return false;
            }
        }
        if let Some(ends_at) = self.ends_at {
            if now > ends_at {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Completed,
    Timeout,
    Manual,
}

/// One row per (student, session) pair, created lazily on the first
/// interaction with an active session. The unique pair index makes the
/// get-or-create upsert safe under concurrent requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

impl StudentSession {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(status: SessionStatus, starts: Option<i64>, ends: Option<i64>) -> Session {
        let now = Utc::now();
        Session {
            id: "s1".into(),
            title: "Test".into(),
            description: String::new(),
            status,
            starts_at: starts.map(|m| now + Duration::minutes(m)),
            ends_at: ends.map(|m| now + Duration::minutes(m)),
            allowed_class_ids: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn running_session_inside_window_is_active() {
        let s = session(SessionStatus::Running, Some(-10), Some(10));
        assert!(s.is_active_now(Utc::now()));
    }

    #[test]
    fn draft_and_closed_sessions_are_inactive() {
        assert!(!session(SessionStatus::Draft, None, None).is_active_now(Utc::now()));
        assert!(!session(SessionStatus::Closed, None, None).is_active_now(Utc::now()));
    }

    #[test]
    fn running_session_outside_window_is_inactive() {
        assert!(!session(SessionStatus::Running, Some(5), Some(10)).is_active_now(Utc::now()));
        assert!(!session(SessionStatus::Running, Some(-10), Some(-5)).is_active_now(Utc::now()));
    }

    #[test]
    fn running_session_without_window_is_active() {
        assert!(session(SessionStatus::Running, None, None).is_active_now(Utc::now()));
    }
}

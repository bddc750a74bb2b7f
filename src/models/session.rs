use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WatchState {
    Starting,
    Watching,
    Paused,
    Completing,
    Completed,
    Cancelled,
    Failed,
}

impl WatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchState::Starting => "Starting",
            WatchState::Watching => "Watching",
            WatchState::Paused => "Paused",
            WatchState::Completing => "Completing",
            WatchState::Completed => "Completed",
            WatchState::Cancelled => "Cancelled",
            WatchState::Failed => "Failed",
        }
    }

    /// States in which the single global session slot is occupied.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            WatchState::Starting
                | WatchState::Watching
                | WatchState::Paused
                | WatchState::Completing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WatchState::Completed | WatchState::Cancelled | WatchState::Failed
        )
    }
}

/// The promoted item being watched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSubject {
    pub id: String,
    /// Destination the surface navigates to after a credited completion.
    pub destination_url: Option<String>,
}

impl WatchSubject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            destination_url: None,
        }
    }

    pub fn with_destination(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            destination_url: Some(url.into()),
        }
    }
}

/// One watch-to-earn attempt against a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSession {
    /// Server handle from the start boundary; absent until the start resolves.
    pub session_id: Option<String>,
    pub subject: WatchSubject,
    pub target_ms: u64,
    /// Amount promised at start time; the completion report prefers the
    /// server-credited amount over this.
    pub reward_amount: f64,
    pub state: WatchState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub credited_amount: Option<f64>,
}

impl ViewSession {
    pub fn starting(subject: WatchSubject, target_ms: u64) -> Self {
        Self {
            session_id: None,
            subject,
            target_ms,
            reward_amount: 0.0,
            state: WatchState::Starting,
            started_at: Utc::now(),
            finished_at: None,
            credited_amount: None,
        }
    }
}

/// Read-only view for progress rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSnapshot {
    pub state: WatchState,
    pub session_id: Option<String>,
    pub subject_id: String,
    pub accumulated_ms: u64,
    pub target_ms: u64,
    pub percent: f64,
}

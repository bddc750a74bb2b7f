use chrono::{DateTime, Utc};
use serde::Serialize;

/// Events delivered to watch subscribers. These are the payloads the viewing
/// surface renders: the progress bar, the credited toast, the redirect
/// countdown, and the failure notice.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WatchEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        percent: f64,
        accumulated_ms: u64,
        target_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        session_id: String,
        credited_amount: f64,
        finished_at: DateTime<Utc>,
    },
    /// The subject carries a destination link; navigation follows after
    /// `delay_ms` unless the user cancels the redirect.
    #[serde(rename_all = "camelCase")]
    RedirectPending { url: String, delay_ms: u64 },
    Redirect { url: String },
    #[serde(rename_all = "camelCase")]
    Failed { session_id: String, reason: String },
    Cancelled,
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

pub mod http;
pub mod memory;

pub use http::HttpRewardLedger;
pub use memory::InMemoryLedger;

/// Handle returned by the start boundary: the server has opened a view and
/// promised a reward for finishing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedView {
    pub session_id: String,
    pub reward_amount: f64,
}

/// Settlement from the complete boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedView {
    /// Credited amount in integer cents. Authoritative when present; the
    /// start-time promise is only a fallback when the server omits it.
    pub credited_cents: Option<u64>,
}

/// External reward-ledger service.
///
/// The start call is the single authority on eligibility (already earned,
/// daily cap, subject not promoted); the complete call is authoritative for
/// the credited amount. The core never retries these internally.
#[async_trait]
pub trait RewardLedger: Send + Sync {
    async fn start_view(&self, subject_id: &str) -> Result<StartedView, LedgerError>;

    async fn complete_view(&self, session_id: &str) -> Result<CompletedView, LedgerError>;
}

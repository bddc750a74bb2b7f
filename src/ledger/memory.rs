use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CompletedView, RewardLedger, StartedView};
use crate::error::LedgerError;

/// In-memory reward ledger that credits each subject at most once. Stands in
/// for the remote service in the demo binary and in scenario tests.
pub struct InMemoryLedger {
    reward_amount: f64,
    credited_cents: Option<u64>,
    inner: Mutex<LedgerBook>,
}

#[derive(Default)]
struct LedgerBook {
    /// session id -> subject id for views that started but have not settled
    open_views: HashMap<String, String>,
    earned_subjects: HashSet<String>,
    start_calls: u32,
    complete_calls: u32,
}

impl InMemoryLedger {
    pub fn new(reward_amount: f64, credited_cents: Option<u64>) -> Self {
        Self {
            reward_amount,
            credited_cents,
            inner: Mutex::new(LedgerBook::default()),
        }
    }

    pub async fn start_calls(&self) -> u32 {
        self.inner.lock().await.start_calls
    }

    pub async fn complete_calls(&self) -> u32 {
        self.inner.lock().await.complete_calls
    }
}

#[async_trait]
impl RewardLedger for InMemoryLedger {
    async fn start_view(&self, subject_id: &str) -> Result<StartedView, LedgerError> {
        let mut book = self.inner.lock().await;
        book.start_calls += 1;

        if book.earned_subjects.contains(subject_id) {
            return Err(LedgerError::Ineligible(format!(
                "already earned for subject {subject_id}"
            )));
        }

        let session_id = Uuid::new_v4().to_string();
        book.open_views
            .insert(session_id.clone(), subject_id.to_string());

        Ok(StartedView {
            session_id,
            reward_amount: self.reward_amount,
        })
    }

    async fn complete_view(&self, session_id: &str) -> Result<CompletedView, LedgerError> {
        let mut book = self.inner.lock().await;
        book.complete_calls += 1;

        let subject_id = book
            .open_views
            .remove(session_id)
            .ok_or_else(|| LedgerError::Protocol(format!("unknown view {session_id}")))?;
        book.earned_subjects.insert(subject_id);

        Ok(CompletedView {
            credited_cents: self.credited_cents,
        })
    }
}

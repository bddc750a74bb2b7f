use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletedView, RewardLedger, StartedView};
use crate::error::LedgerError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartViewRequest<'a> {
    subject_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Reward ledger backed by the dashboard's REST API.
#[derive(Debug, Clone)]
pub struct HttpRewardLedger {
    client: Client,
    base_url: String,
}

impl HttpRewardLedger {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Map a non-success response onto the ledger taxonomy: 4xx payloads are
    /// eligibility refusals, everything else is transport trouble.
    async fn rejection(response: reqwest::Response) -> LedgerError {
        let status = response.status();
        let reason = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.or(body.message))
            .unwrap_or_else(|| format!("request rejected with status {status}"));

        if status.is_client_error() {
            LedgerError::Ineligible(reason)
        } else {
            LedgerError::Transport(reason)
        }
    }
}

#[async_trait]
impl RewardLedger for HttpRewardLedger {
    async fn start_view(&self, subject_id: &str) -> Result<StartedView, LedgerError> {
        let url = format!("{}/ads/views", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&StartViewRequest { subject_id })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        response
            .json::<StartedView>()
            .await
            .map_err(|err| LedgerError::Protocol(err.to_string()))
    }

    async fn complete_view(&self, session_id: &str) -> Result<CompletedView, LedgerError> {
        let url = format!("{}/ads/views/{}/complete", self.base_url, session_id);
        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        response
            .json::<CompletedView>()
            .await
            .map_err(|err| LedgerError::Protocol(err.to_string()))
    }
}

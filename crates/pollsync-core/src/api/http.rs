//! HTTP implementation of [`PollApi`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::wire::{ApiResponse, ErrorBody, VoteRequest, VoteResponse};
use super::{PollApi, VoteOutcome};
use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::models::Poll;

/// REST client backed by `reqwest`
///
/// The configured timeout covers the whole request; hitting it is reported
/// as a network failure.
#[derive(Debug, Clone)]
pub struct HttpPollApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPollApi {
    /// Create a client for the given API base URL
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pollsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl PollApi for HttpPollApi {
    async fn fetch_current_poll(&self) -> SyncResult<Poll> {
        let url = self.url("poll");
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!("Poll fetch failed: {}", e);
            SyncError::from(e)
        })?;
        let status = response.status();
        let body = response.bytes().await?;

        let result = interpret_fetch(status, &body);
        match &result {
            Ok(poll) => info!("Fetched poll {} (totalVotes={})", poll.id, poll.total_votes),
            Err(e) => warn!("Poll fetch failed: {}", e),
        }
        result
    }

    async fn submit_vote(&self, option_id: &str, client_token: &str) -> SyncResult<VoteOutcome> {
        let url = self.url("poll/vote");
        let request = VoteRequest {
            option_id: option_id.to_string(),
            user_token: Some(client_token.to_string()),
        };
        debug!("POST {} option={}", url, option_id);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Vote submission failed: {}", e);
                SyncError::from(e)
            })?;
        let status = response.status();
        let body = response.bytes().await?;

        let result = interpret_vote(status, &body);
        match &result {
            Ok(VoteOutcome::Accepted { poll, .. }) => {
                info!("Vote accepted (totalVotes={})", poll.total_votes)
            }
            Ok(VoteOutcome::Rejected(reason)) => info!("Vote rejected: {}", reason),
            Err(e) => warn!("Vote submission failed: {}", e),
        }
        result
    }
}

/// Turn a `GET /poll` response into a poll or a typed failure
pub(crate) fn interpret_fetch(status: StatusCode, body: &[u8]) -> SyncResult<Poll> {
    if !status.is_success() {
        return Err(SyncError::Server(server_message(status, body)));
    }

    let envelope: ApiResponse<Poll> = serde_json::from_slice(body)?;
    if !envelope.success {
        let message = envelope
            .message
            .or(envelope.error)
            .unwrap_or_else(|| "Failed to load poll".to_string());
        return Err(SyncError::Server(message));
    }

    let poll = envelope
        .data
        .ok_or_else(|| SyncError::Protocol("poll response has no data".to_string()))?;
    poll.validate()?;
    Ok(poll)
}

/// Turn a `POST /poll/vote` response into an outcome or a typed failure
///
/// Client errors (4xx) are business-rule rejections; anything else that is
/// not a success is a server failure.
pub(crate) fn interpret_vote(status: StatusCode, body: &[u8]) -> SyncResult<VoteOutcome> {
    if status.is_client_error() {
        return Ok(VoteOutcome::Rejected(server_message(status, body)));
    }
    if !status.is_success() {
        return Err(SyncError::Server(server_message(status, body)));
    }

    let response: VoteResponse = serde_json::from_slice(body)?;
    if !response.success {
        let reason = if response.message.is_empty() {
            "Vote failed".to_string()
        } else {
            response.message
        };
        return Ok(VoteOutcome::Rejected(reason));
    }

    let poll = response
        .poll
        .ok_or_else(|| SyncError::Protocol("vote response has no poll".to_string()))?;
    poll.validate()?;
    Ok(VoteOutcome::Accepted {
        poll,
        message: response.message,
    })
}

fn server_message(status: StatusCode, body: &[u8]) -> String {
    ErrorBody::parse(body)
        .message()
        .unwrap_or_else(|| format!("Server error (HTTP {})", status.as_u16()))
}

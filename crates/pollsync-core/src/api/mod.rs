//! REST client for the poll backend
//!
//! Two one-shot calls, neither of which retries on its own:
//!
//! - `GET  {base}/poll`       - current poll snapshot
//! - `POST {base}/poll/vote`  - cast a vote, returns the updated snapshot
//!
//! Both live behind the [`PollApi`] trait so the engine can be driven by a
//! test double.

mod http;
mod wire;

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::models::Poll;

pub use http::HttpPollApi;
pub use wire::{ApiResponse, VoteRequest, VoteResponse};

/// Result of a vote submission the server answered
#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    /// Vote counted (or already counted); carries the authoritative poll
    Accepted { poll: Poll, message: String },
    /// Server refused the vote
    Rejected(String),
}

/// Snapshot fetcher and vote submitter
///
/// Implementations are stateless and safe to call concurrently.
#[async_trait]
pub trait PollApi: Send + Sync + 'static {
    /// Fetch the current poll with its tallies
    async fn fetch_current_poll(&self) -> SyncResult<Poll>;

    /// Submit a vote for one option
    ///
    /// `client_token` lets the server recognise a repeat voter; it is a
    /// hint, not proof of identity.
    async fn submit_vote(&self, option_id: &str, client_token: &str) -> SyncResult<VoteOutcome>;
}

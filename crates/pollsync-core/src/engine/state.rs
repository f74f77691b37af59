//! Engine-facing state, notices and submission outcomes

use std::fmt;

use serde::Serialize;

use crate::channel::{ConnectionState, ConnectionStatus};
use crate::error::SyncError;
use crate::models::Poll;

/// Snapshot of everything a view needs to render
///
/// Published as a whole through a `watch` channel; never edited in place by
/// consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Current poll, `None` until the first successful load
    pub poll: Option<Poll>,
    /// A fetch is in flight
    pub loading: bool,
    /// Persistent load error, cleared by the next successful load
    pub error: Option<String>,
    /// This client has voted in the current poll
    pub has_voted: bool,
    /// Push channel connectivity
    pub connection: ConnectionState,
    /// A manual reconnect is in progress
    pub is_reconnecting: bool,
    /// A vote submission is in flight
    pub submitting: bool,
}

impl SyncState {
    /// State at activation, before the first fetch returns
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            poll: None,
            loading: false,
            error: None,
            has_voted: false,
            connection: ConnectionState::idle(),
            is_reconnecting: false,
            submitting: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Transient, dismissible notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Result of a submit intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The server counted the vote
    Accepted { message: String },
    /// The server refused the vote
    Rejected(String),
    /// The request failed
    Failed(SyncError),
    /// Another submission is still in flight
    InProgress,
    /// This client already voted in the current poll
    AlreadyVoted,
    /// No poll loaded yet
    NotReady,
    /// The poll no longer accepts votes
    PollClosed,
    /// The option is not part of the current poll
    UnknownOption(String),
    /// The engine shut down before answering
    Stopped,
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }

    /// Whether a request was sent to the server
    pub fn was_sent(&self) -> bool {
        matches!(
            self,
            SubmitOutcome::Accepted { .. } | SubmitOutcome::Rejected(_) | SubmitOutcome::Failed(_)
        )
    }
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitOutcome::Accepted { message } => write!(f, "{}", message),
            SubmitOutcome::Rejected(message) => write!(f, "{}", message),
            SubmitOutcome::Failed(e) => write!(f, "{}", e.user_message()),
            SubmitOutcome::InProgress => write!(f, "A vote is already in progress"),
            SubmitOutcome::AlreadyVoted => write!(f, "You have already voted in this poll"),
            SubmitOutcome::NotReady => write!(f, "No poll is loaded yet"),
            SubmitOutcome::PollClosed => write!(f, "This poll is closed"),
            SubmitOutcome::UnknownOption(id) => write!(f, "Unknown option '{}'", id),
            SubmitOutcome::Stopped => write!(f, "The sync engine has stopped"),
        }
    }
}

//! Sync error handling
//!
//! One typed error for every failure the engine can observe, with
//! user-facing messages for the notices and the persistent error field.

use thiserror::Error;

/// Errors surfaced by the fetcher, the submitter and the push channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No response reached us (connect failure, timeout, reset)
    #[error("Network failure: {0}")]
    Network(String),

    /// The server answered but reported an application error
    #[error("Server error: {0}")]
    Server(String),

    /// The response did not have the expected shape
    #[error("Unexpected response: {0}")]
    Protocol(String),

    /// Push channel dropped or gave up reconnecting
    #[error("Push channel failure: {0}")]
    Channel(String),

    /// The server refused the vote on a business rule
    #[error("Vote rejected: {0}")]
    VoteRejected(String),
}

impl SyncError {
    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Channel(_))
    }

    /// Message suitable for showing to a person
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Network(_) => {
                "Network connection failed. Check your connection and try again.".to_string()
            }
            SyncError::Server(message) | SyncError::VoteRejected(message) => message.clone(),
            SyncError::Protocol(_) => "The server sent data that could not be read.".to_string(),
            SyncError::Channel(message) => format!("Live updates unavailable: {}", message),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            SyncError::Protocol(error.to_string())
        } else if let Some(status) = error.status() {
            SyncError::Server(format!("HTTP {}", status))
        } else {
            // Timeouts, refused connections and resets all land here
            SyncError::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Protocol(error.to_string())
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SyncError::Network("timeout".into()).is_transient());
        assert!(SyncError::Channel("dropped".into()).is_transient());
        assert!(!SyncError::Server("boom".into()).is_transient());
        assert!(!SyncError::VoteRejected("already voted".into()).is_transient());
    }

    #[test]
    fn test_user_message_passes_server_text_through() {
        let err = SyncError::Server("No poll found".into());
        assert_eq!(err.user_message(), "No poll found");

        let err = SyncError::VoteRejected("Option does not exist".into());
        assert_eq!(err.user_message(), "Option does not exist");
    }

    #[test]
    fn test_user_message_hides_protocol_details() {
        let err = SyncError::Protocol("missing field `totalVotes`".into());
        assert!(!err.user_message().contains("totalVotes"));
    }

    #[test]
    fn test_json_error_is_protocol() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: SyncError = json_err.into();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Network("connection refused".into());
        assert_eq!(err.to_string(), "Network failure: connection refused");
    }
}

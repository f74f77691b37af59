//! Data models
//!
//! A `Poll` is always handled as a whole value: the engine replaces it
//! wholesale on every update and never edits individual fields.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SyncError;

/// One choice within a poll
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollOption {
    /// Identifier, unique within its poll
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display text
    pub text: String,
    /// Votes cast for this option
    pub votes: u64,
}

/// The question, its options and the aggregate tally
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: Vec<PollOption>,
    pub total_votes: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    /// Check the structural invariants of a poll received from the server
    ///
    /// `total_votes` must equal the sum of option votes and option ids must
    /// be unique.
    pub fn validate(&self) -> Result<(), SyncError> {
        let mut seen = HashSet::with_capacity(self.options.len());
        for option in &self.options {
            if !seen.insert(option.id.as_str()) {
                return Err(SyncError::Protocol(format!(
                    "poll {} has duplicate option id '{}'",
                    self.id, option.id
                )));
            }
        }

        let sum = self.options.iter().map(|o| o.votes).sum::<u64>();
        if sum != self.total_votes {
            return Err(SyncError::Protocol(format!(
                "poll {} reports totalVotes={} but options sum to {}",
                self.id, self.total_votes, sum
            )));
        }

        Ok(())
    }

    /// Look up an option by id
    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Share of the total for one option, in percent
    pub fn percentage(&self, option_id: &str) -> f64 {
        match self.option(option_id) {
            Some(option) if self.total_votes > 0 => {
                option.votes as f64 * 100.0 / self.total_votes as f64
            }
            _ => 0.0,
        }
    }
}

/// The backend sends numeric ids in some payloads and strings in others
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
pub(crate) fn sample_poll(id: &str, votes: &[(&str, u64)]) -> Poll {
    let created_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    Poll {
        id: id.to_string(),
        title: "Favourite language".to_string(),
        description: None,
        options: votes
            .iter()
            .map(|(option_id, count)| PollOption {
                id: option_id.to_string(),
                text: option_id.to_uppercase(),
                votes: *count,
            })
            .collect(),
        total_votes: votes.iter().map(|(_, count)| count).sum(),
        is_active: true,
        created_at,
        updated_at: created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_backend_payload() {
        let json = r#"{
            "id": "1",
            "title": "Lunch?",
            "description": "",
            "options": [
                {"id": "10", "text": "Pizza", "votes": 3},
                {"id": 11, "text": "Sushi", "votes": 2}
            ],
            "totalVotes": 5,
            "isActive": true,
            "createdAt": "2024-05-01T12:00:00Z",
            "updatedAt": "2024-05-01T12:00:00+00:00"
        }"#;

        let poll: Poll = serde_json::from_str(json).unwrap();
        assert_eq!(poll.id, "1");
        assert_eq!(poll.description.as_deref(), Some(""));
        assert_eq!(poll.options[1].id, "11");
        assert_eq!(poll.total_votes, 5);
        assert!(poll.validate().is_ok());
    }

    #[test]
    fn test_missing_description_is_none() {
        let json = r#"{
            "id": 7, "title": "t", "options": [], "totalVotes": 0,
            "isActive": false,
            "createdAt": "2024-05-01T12:00:00Z", "updatedAt": "2024-05-01T12:00:00Z"
        }"#;

        let poll: Poll = serde_json::from_str(json).unwrap();
        assert_eq!(poll.id, "7");
        assert!(poll.description.is_none());
        assert!(!poll.is_active);
    }

    #[test]
    fn test_validate_rejects_bad_total() {
        let mut poll = sample_poll("p1", &[("a", 3), ("b", 2)]);
        poll.total_votes = 6;

        let err = poll.validate().unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(err.to_string().contains("totalVotes=6"));
    }

    #[test]
    fn test_validate_rejects_duplicate_option() {
        let poll = sample_poll("p1", &[("a", 1), ("a", 2)]);
        assert!(matches!(poll.validate(), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn test_percentage() {
        let poll = sample_poll("p1", &[("a", 3), ("b", 1)]);
        assert_eq!(poll.percentage("a"), 75.0);
        assert_eq!(poll.percentage("missing"), 0.0);

        let empty = sample_poll("p2", &[("a", 0)]);
        assert_eq!(empty.percentage("a"), 0.0);
    }
}

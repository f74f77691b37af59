//! REST payload types

use serde::{Deserialize, Serialize};

use crate::models::Poll;

/// Envelope for `GET /poll`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /poll/vote`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub option_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
}

/// Response of `POST /poll/vote`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub poll: Option<Poll>,
}

/// Error bodies carry `message` from the app layer or `detail` from the
/// framework
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// First human-readable message in the body, if any
    pub(crate) fn message(&self) -> Option<String> {
        if let Some(ref message) = self.message {
            return Some(message.clone());
        }
        if let Some(serde_json::Value::String(ref detail)) = self.detail {
            return Some(detail.clone());
        }
        self.error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_request_encoding() {
        let request = VoteRequest {
            option_id: "a".to_string(),
            user_token: Some("user_1_abc".to_string()),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"optionId":"a","userToken":"user_1_abc"}"#);

        let anonymous = VoteRequest {
            option_id: "a".to_string(),
            user_token: None,
        };
        assert_eq!(serde_json::to_string(&anonymous).unwrap(), r#"{"optionId":"a"}"#);
    }

    #[test]
    fn test_poll_envelope_without_data() {
        let response: ApiResponse<Poll> =
            serde_json::from_str(r#"{"success": false, "error": "No active poll"}"#).unwrap();
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error.as_deref(), Some("No active poll"));
    }

    #[test]
    fn test_error_body_prefers_message() {
        let body = ErrorBody::parse(br#"{"message": "from app", "detail": "from framework"}"#);
        assert_eq!(body.message().as_deref(), Some("from app"));
    }

    #[test]
    fn test_error_body_detail_string() {
        let body = ErrorBody::parse(br#"{"detail": "Option does not exist"}"#);
        assert_eq!(body.message().as_deref(), Some("Option does not exist"));
    }

    #[test]
    fn test_error_body_ignores_structured_detail() {
        let body = ErrorBody::parse(br#"{"detail": [{"loc": ["body"], "msg": "field required"}]}"#);
        assert!(body.message().is_none());
    }

    #[test]
    fn test_error_body_not_json() {
        let body = ErrorBody::parse(b"<html>502 Bad Gateway</html>");
        assert!(body.message().is_none());
    }
}

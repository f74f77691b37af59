//! Socket.IO v4 packet codec
//!
//! Every WebSocket text frame is one Engine.IO packet; Engine.IO `message`
//! packets carry one Socket.IO packet. Only the default namespace and text
//! payloads are supported.
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}  open            (server -> client)
//! 2 / 3                          ping / pong
//! 40 / 40{"sid":..}              namespace connect
//! 41                             namespace disconnect
//! 42["event", data]              event
//! 44{"message":..}               connect error
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Codec failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet type '{0}'")]
    UnknownType(char),

    #[error("invalid packet payload: {0}")]
    InvalidPayload(String),

    #[error("event packet has no name")]
    MissingEventName,
}

/// Upper bound on the liveness window, whatever the server announces
pub const MAX_LIVENESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Engine.IO handshake sent with the `open` packet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

impl Handshake {
    /// How long the connection may stay silent before it counts as dropped
    pub fn liveness_window(&self) -> Duration {
        let millis = self.ping_interval.saturating_add(self.ping_timeout);
        Duration::from_millis(millis).min(MAX_LIVENESS_WINDOW)
    }
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// A decoded packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    Ack,
    ConnectError(Value),
}

impl Packet {
    /// Build an event packet
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Packet::Event {
            name: name.into(),
            data,
        }
    }

    /// Encode for the wire
    ///
    /// Only the packets a client sends are meaningful here; the rest encode
    /// to their bare type prefix.
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(_) => "0".to_string(),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(auth)) => format!("40{}", auth),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, data } => {
                let body = if data.is_null() {
                    Value::Array(vec![Value::String(name.clone())])
                } else {
                    Value::Array(vec![Value::String(name.clone()), data.clone()])
                };
                format!("42{}", body)
            }
            Packet::Ack => "43".to_string(),
            Packet::ConnectError(data) => format!("44{}", data),
        }
    }

    /// Decode one text frame
    pub fn decode(frame: &str) -> Result<Self, FrameError> {
        let mut chars = frame.chars();
        let engine_type = chars.next().ok_or(FrameError::Empty)?;
        let rest = chars.as_str();

        match engine_type {
            '0' => {
                let handshake = serde_json::from_str(rest)
                    .map_err(|e| FrameError::InvalidPayload(e.to_string()))?;
                Ok(Packet::Open(handshake))
            }
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket_packet(rest),
            '6' => Ok(Packet::Noop),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

fn decode_socket_packet(packet: &str) -> Result<Packet, FrameError> {
    let mut chars = packet.chars();
    let socket_type = chars.next().ok_or(FrameError::Empty)?;
    let payload = strip_ack_id(strip_namespace(chars.as_str()));

    match socket_type {
        '0' => {
            if payload.is_empty() {
                Ok(Packet::Connect(None))
            } else {
                Ok(Packet::Connect(Some(parse_json(payload)?)))
            }
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let Value::Array(mut items) = parse_json(payload)? else {
                return Err(FrameError::InvalidPayload(
                    "event payload is not an array".to_string(),
                ));
            };
            if items.is_empty() {
                return Err(FrameError::MissingEventName);
            }
            let Value::String(name) = items.remove(0) else {
                return Err(FrameError::MissingEventName);
            };
            let data = if items.is_empty() {
                Value::Null
            } else {
                items.remove(0)
            };
            Ok(Packet::Event { name, data })
        }
        '3' => Ok(Packet::Ack),
        '4' => {
            let data = if payload.is_empty() {
                Value::Null
            } else {
                parse_json(payload)?
            };
            Ok(Packet::ConnectError(data))
        }
        other => Err(FrameError::UnknownType(other)),
    }
}

/// `/admin,["x"]` -> `["x"]`
fn strip_namespace(payload: &str) -> &str {
    if payload.starts_with('/') {
        match payload.find(',') {
            Some(idx) => &payload[idx + 1..],
            None => "",
        }
    } else {
        payload
    }
}

/// `12["x"]` -> `["x"]`
fn strip_ack_id(payload: &str) -> &str {
    payload.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_json(payload: &str) -> Result<Value, FrameError> {
    serde_json::from_str(payload).map_err(|e| FrameError::InvalidPayload(e.to_string()))
}

/// Message carried by a connect error or a server `error` event
pub(crate) fn error_message(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet = Packet::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "abc");
                assert_eq!(handshake.liveness_window(), Duration::from_secs(45));
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_liveness_window_capped() {
        let handshake = Handshake {
            sid: "abc".to_string(),
            ping_interval: u64::MAX,
            ping_timeout: u64::MAX,
        };
        assert_eq!(handshake.liveness_window(), MAX_LIVENESS_WINDOW);
    }

    #[test]
    fn test_decode_connect() {
        assert_eq!(Packet::decode("40").unwrap(), Packet::Connect(None));
        assert_eq!(
            Packet::decode(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Connect(Some(json!({"sid": "xyz"})))
        );
    }

    #[test]
    fn test_decode_event() {
        let packet = Packet::decode(r#"42["poll_update",{"id":"p1"}]"#).unwrap();
        assert_eq!(packet, Packet::event("poll_update", json!({"id": "p1"})));
    }

    #[test]
    fn test_decode_event_without_data() {
        let packet = Packet::decode(r#"42["refresh"]"#).unwrap();
        assert_eq!(packet, Packet::event("refresh", Value::Null));
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack_id() {
        let packet = Packet::decode(r#"42/polls,7["vote_result",{"ok":true}]"#).unwrap();
        assert_eq!(packet, Packet::event("vote_result", json!({"ok": true})));
    }

    #[test]
    fn test_decode_connect_error() {
        let packet = Packet::decode(r#"44{"message":"Not authorized"}"#).unwrap();
        match packet {
            Packet::ConnectError(data) => assert_eq!(error_message(&data), "Not authorized"),
            other => panic!("expected connect error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(Packet::decode("1").unwrap(), Packet::Close);
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
        assert_eq!(Packet::decode("3").unwrap(), Packet::Pong);
        assert_eq!(Packet::decode("6").unwrap(), Packet::Noop);
        assert_eq!(Packet::decode("41").unwrap(), Packet::Disconnect);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Packet::decode(""), Err(FrameError::Empty));
        assert_eq!(Packet::decode("9"), Err(FrameError::UnknownType('9')));
        assert_eq!(Packet::decode("4"), Err(FrameError::Empty));
        assert_eq!(Packet::decode("42[]"), Err(FrameError::MissingEventName));
        assert_eq!(Packet::decode("42[1]"), Err(FrameError::MissingEventName));
        assert!(matches!(
            Packet::decode("42{\"a\":1}"),
            Err(FrameError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_encode_client_packets() {
        assert_eq!(Packet::Connect(None).encode(), "40");
        assert_eq!(Packet::Pong.encode(), "3");
        assert_eq!(Packet::Disconnect.encode(), "41");
        assert_eq!(
            Packet::event("join_poll", json!({"pollId": "current"})).encode(),
            r#"42["join_poll",{"pollId":"current"}]"#
        );
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&json!("boom")), "boom");
        assert_eq!(error_message(&json!({"message": "bad"})), "bad");
        assert_eq!(error_message(&json!({"code": 3})), r#"{"code":3}"#);
        assert_eq!(error_message(&Value::Null), "unknown error");
    }
}

//! Push channel
//!
//! A long-lived, auto-reconnecting Socket.IO connection that delivers
//! `poll_update` pushes and connectivity changes to subscribers.
//!
//! ## Lifecycle
//!
//! The channel is an owned value, not a global: `PushChannel::new` →
//! `connect()` → `disconnect()` → drop (or `dispose()`). While connected or
//! retrying, a background task owns the socket and the reconnect timer.
//!
//! ## Events
//!
//! Subscribers register per [`ChannelEventKind`] with `on()` and are removed
//! with `off()`. Connection state is observable through a `watch` channel
//! and is only ever written by the channel itself.
//!
//! ## Usage
//!
//! ```ignore
//! let mut channel = PushChannel::websocket(PushChannelConfig::from_config(&config));
//! channel.on(ChannelEventKind::PollUpdate, |event| { ...; Ok(()) });
//! channel.connect();
//! ```

mod frame;
mod listeners;
mod push;
mod state;
mod transport;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::models::Poll;

pub use frame::{FrameError, Handshake, Packet};
pub use listeners::{listener, Listener, Listeners, SubscriptionId};
pub use push::{PushChannel, PushChannelConfig};
pub use state::{ConnectionPhase, ConnectionState, ConnectionStatus, ReconnectPolicy};
pub use transport::{socket_io_url, Connection, Connector, WsConnector};

/// Why an open channel closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called locally
    ClientRequested,
    /// The server closed the namespace
    ServerClosed,
    /// The socket closed underneath us
    TransportClosed,
    /// The socket failed
    TransportError(String),
    /// No ping from the server within the agreed window
    PingTimeout,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientRequested => write!(f, "io client disconnect"),
            DisconnectReason::ServerClosed => write!(f, "io server disconnect"),
            DisconnectReason::TransportClosed => write!(f, "transport close"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {}", e),
            DisconnectReason::PingTimeout => write!(f, "ping timeout"),
        }
    }
}

/// Events delivered to channel subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Channel opened
    Connect { at: DateTime<Utc> },
    /// An open channel closed
    Disconnect { reason: DisconnectReason },
    /// Server-reported error, or the retry budget ran out
    Error { message: String, exhausted: bool },
    /// Complete poll snapshot pushed by the server
    PollUpdate(Poll),
    /// Server acknowledgement of a vote, passed through untouched
    VoteResult(serde_json::Value),
}

/// Subscription key for [`ChannelEvent`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEventKind {
    Connect,
    Disconnect,
    Error,
    PollUpdate,
    VoteResult,
}

impl ChannelEvent {
    pub fn kind(&self) -> ChannelEventKind {
        match self {
            ChannelEvent::Connect { .. } => ChannelEventKind::Connect,
            ChannelEvent::Disconnect { .. } => ChannelEventKind::Disconnect,
            ChannelEvent::Error { .. } => ChannelEventKind::Error,
            ChannelEvent::PollUpdate(_) => ChannelEventKind::PollUpdate,
            ChannelEvent::VoteResult(_) => ChannelEventKind::VoteResult,
        }
    }
}

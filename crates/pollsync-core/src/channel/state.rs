//! Push channel connection state machine
//!
//! ```text
//!            connect()              open
//!   Idle ──────────────▶ Connecting ─────▶ Connected
//!    ▲                    │   ▲  │             │
//!    │ disconnect()       │   └──┘ failed      │ drop
//!    └────────────────────┤     attempt        │
//!                         │                    ▼
//!                         │ attempts == max  Connecting
//!                         ▼
//!                     Exhausted ── connect() ──▶ Connecting
//! ```
//!
//! Retries use a fixed interval. The attempt counter resets on every
//! successful open.

use std::time::Duration;

use serde::Serialize;

/// Where the channel is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Not connected and not trying
    Idle,
    /// Opening a connection or waiting to retry
    Connecting,
    /// Open and receiving pushes
    Connected,
    /// Gave up after the maximum number of attempts
    Exhausted,
}

/// Coarse connectivity, as shown to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state owned by the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// Failed attempts since the last successful open
    pub attempts: u32,
}

impl ConnectionState {
    pub const fn idle() -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            attempts: 0,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.phase {
            ConnectionPhase::Idle | ConnectionPhase::Exhausted => ConnectionStatus::Disconnected,
            ConnectionPhase::Connecting => ConnectionStatus::Connecting,
            ConnectionPhase::Connected => ConnectionStatus::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == ConnectionPhase::Exhausted
    }

    /// Connecting or connected; `connect()` is a no-op in these phases
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            ConnectionPhase::Connecting | ConnectionPhase::Connected
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Fixed-interval retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Failed attempts before giving up
    pub max_attempts: u32,
    /// Delay between attempts
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(3),
        }
    }
}

/// What the connection loop does next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextStep {
    RetryAfter(Duration),
    GiveUp,
}

/// Transition logic, kept free of I/O
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    state: ConnectionState,
    policy: ReconnectPolicy,
}

impl Lifecycle {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::idle(),
            policy,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// Begin connecting; returns false when already connecting or connected
    pub(crate) fn start(&mut self) -> bool {
        if self.state.is_active() {
            return false;
        }
        self.state = ConnectionState {
            phase: ConnectionPhase::Connecting,
            attempts: 0,
        };
        true
    }

    pub(crate) fn opened(&mut self) {
        self.state = ConnectionState {
            phase: ConnectionPhase::Connected,
            attempts: 0,
        };
    }

    /// An attempt failed before the channel opened
    pub(crate) fn attempt_failed(&mut self) -> NextStep {
        let attempts = self.state.attempts.saturating_add(1);
        self.settle(attempts)
    }

    /// An open channel dropped
    pub(crate) fn dropped(&mut self) -> NextStep {
        self.settle(0)
    }

    fn settle(&mut self, attempts: u32) -> NextStep {
        if attempts >= self.policy.max_attempts {
            self.state = ConnectionState {
                phase: ConnectionPhase::Exhausted,
                attempts,
            };
            NextStep::GiveUp
        } else {
            self.state = ConnectionState {
                phase: ConnectionPhase::Connecting,
                attempts,
            };
            NextStep::RetryAfter(self.policy.interval)
        }
    }
}

//! Pollsync Core Library
//!
//! Client-side synchronization for a live poll: an initial snapshot fetch,
//! vote submission, and a push channel delivering tally updates, reconciled
//! into one observable [`SyncState`].
//!
//! # Architecture
//!
//! - **Snapshot fetcher / vote submitter**: one-shot REST calls behind [`PollApi`]
//! - **Push channel**: auto-reconnecting Socket.IO connection ([`PushChannel`])
//! - **Identity store**: client token and voted-poll record on disk
//! - **Engine**: owns the channel and the identity store, publishes state
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let mut engine = SyncEngine::from_config(&config)?;
//!
//! let state = engine.wait_until_loaded().await;
//! let outcome = engine.submit_vote("a").await;
//!
//! engine.shutdown().await;
//! ```
//!
//! # Modules
//!
//! - `engine`: Synchronization engine (main entry point)
//! - `api`: Snapshot fetcher and vote submitter
//! - `channel`: Push channel, wire codec and reconnect state machine
//! - `identity`: Client token and voted-poll record
//! - `models`: Poll data structures
//! - `config`: Application configuration

pub mod api;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{HttpPollApi, PollApi, VoteOutcome};
pub use channel::{
    ChannelEvent, ChannelEventKind, ConnectionPhase, ConnectionState, ConnectionStatus,
    DisconnectReason, PushChannel, PushChannelConfig, ReconnectPolicy,
};
pub use config::{Config, PushOrdering};
pub use engine::{EngineOptions, Notice, NoticeLevel, SubmitOutcome, SyncEngine, SyncState};
pub use error::{SyncError, SyncResult};
pub use identity::ClientIdentity;
pub use models::{Poll, PollOption};

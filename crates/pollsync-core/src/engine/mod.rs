//! Synchronization engine
//!
//! Reconciles three asynchronous inputs into one [`SyncState`]:
//!
//! - the snapshot fetch (on activation and on every refresh)
//! - vote submissions, one at a time
//! - push channel events
//!
//! An accepted vote installs the poll returned by the server. A push always
//! replaces the held poll with the pushed snapshot, so whichever arrives
//! last wins (see [`PushOrdering`] for the stricter alternative).
//!
//! The engine owns the push channel it is given and tears it down on
//! shutdown; no channel callback registered by the engine survives it.

mod state;
mod task;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{HttpPollApi, PollApi};
use crate::channel::{PushChannel, PushChannelConfig};
use crate::config::{Config, PushOrdering};
use crate::error::SyncResult;
use crate::identity::ClientIdentity;

pub use state::{Notice, NoticeLevel, SubmitOutcome, SyncState};

use task::{EngineTask, Input};

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Pause between tearing down and re-opening the channel on a manual
    /// reconnect
    pub manual_reconnect_delay: Duration,
    pub push_ordering: PushOrdering,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            manual_reconnect_delay: Duration::from_secs(1),
            push_ordering: PushOrdering::LastWriteWins,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            manual_reconnect_delay: config.manual_reconnect_delay(),
            push_ordering: config.push_ordering,
        }
    }
}

/// Handle to a running engine
///
/// Dropping the handle stops the engine; `shutdown()` also waits for the
/// teardown to finish.
pub struct SyncEngine {
    inbox: mpsc::UnboundedSender<Input>,
    state_rx: watch::Receiver<SyncState>,
    notices: Option<mpsc::UnboundedReceiver<Notice>>,
    task: Option<JoinHandle<()>>,
}

impl SyncEngine {
    /// Start the engine: fetch the current poll, then open the push channel
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate(
        api: Arc<dyn PollApi>,
        identity: ClientIdentity,
        channel: PushChannel,
        options: EngineOptions,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SyncState::loading());
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let task = EngineTask::new(
            api,
            identity,
            channel,
            options,
            state_tx,
            notice_tx,
            inbox_tx.clone(),
        );
        let handle = tokio::spawn(task.run(inbox_rx));

        Self {
            inbox: inbox_tx,
            state_rx,
            notices: Some(notice_rx),
            task: Some(handle),
        }
    }

    /// Start an engine wired to the configured HTTP API and WebSocket server
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        let api = HttpPollApi::from_config(config)?;
        let channel = PushChannel::websocket(PushChannelConfig::from_config(config));
        Ok(Self::activate(
            Arc::new(api),
            ClientIdentity::new(config),
            channel,
            EngineOptions::from_config(config),
        ))
    }

    /// Latest published state
    pub fn state(&self) -> SyncState {
        self.state_rx.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }

    /// Take the notice receiver (can only be called once)
    pub fn take_notices(&mut self) -> Option<mpsc::UnboundedReceiver<Notice>> {
        self.notices.take()
    }

    /// Fetch the poll again; ignored while a fetch is in flight
    pub fn refresh(&self) {
        self.send(Input::Refresh);
    }

    /// Tear down and re-open the push channel; ignored while a reconnect is
    /// in progress
    pub fn reconnect(&self) {
        self.send(Input::Reconnect);
    }

    /// Vote for an option in the current poll
    ///
    /// The vote is queued immediately. The returned future only waits for
    /// the outcome and does not borrow the engine, so it can be spawned.
    pub fn submit_vote(
        &self,
        option_id: &str,
    ) -> impl Future<Output = SubmitOutcome> + Send + 'static {
        let (reply, outcome) = oneshot::channel();
        self.send(Input::Submit {
            option_id: option_id.to_string(),
            reply,
        });
        async move { outcome.await.unwrap_or(SubmitOutcome::Stopped) }
    }

    /// Wait until no fetch is in flight and return that state
    pub async fn wait_until_loaded(&self) -> SyncState {
        let mut state_rx = self.state_rx.clone();
        let loaded = match state_rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        loaded
    }

    /// Stop the engine and wait for the channel to be torn down
    pub async fn shutdown(mut self) {
        self.send(Input::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("Engine task ended abnormally: {}", e);
            }
        }
    }

    fn send(&self, input: Input) {
        if self.inbox.send(input).is_err() {
            debug!("Sync engine already stopped");
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.inbox.send(Input::Shutdown);
        }
    }
}

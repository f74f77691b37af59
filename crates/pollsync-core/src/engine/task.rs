//! Engine event loop
//!
//! Everything that changes `SyncState` runs here, one input at a time.
//! Network calls are spawned and report back through the inbox, so a push
//! can be handled while a fetch or a vote is still in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::state::{Notice, SubmitOutcome, SyncState};
use super::EngineOptions;
use crate::api::{PollApi, VoteOutcome};
use crate::channel::{
    ChannelEvent, ChannelEventKind, ConnectionState, DisconnectReason, PushChannel, SubscriptionId,
};
use crate::config::PushOrdering;
use crate::error::{SyncError, SyncResult};
use crate::identity::ClientIdentity;
use crate::models::Poll;

/// How long shutdown waits for an in-flight vote
const VOTE_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything the loop reacts to
#[derive(Debug)]
pub(crate) enum Input {
    Refresh,
    Submit {
        option_id: String,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Reconnect,
    Shutdown,
    FetchCompleted(SyncResult<Poll>),
    VoteCompleted {
        poll_id: String,
        result: SyncResult<VoteOutcome>,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    ReconnectDelayElapsed,
    Channel(ChannelEvent),
}

pub(crate) struct EngineTask {
    api: Arc<dyn PollApi>,
    identity: ClientIdentity,
    channel: PushChannel,
    options: EngineOptions,
    state: SyncState,
    state_tx: watch::Sender<SyncState>,
    notices: mpsc::UnboundedSender<Notice>,
    inbox: mpsc::UnboundedSender<Input>,
    subscriptions: Vec<SubscriptionId>,
    fetching: bool,
    channel_started: bool,
}

impl EngineTask {
    pub(crate) fn new(
        api: Arc<dyn PollApi>,
        identity: ClientIdentity,
        channel: PushChannel,
        options: EngineOptions,
        state_tx: watch::Sender<SyncState>,
        notices: mpsc::UnboundedSender<Notice>,
        inbox: mpsc::UnboundedSender<Input>,
    ) -> Self {
        let state = state_tx.borrow().clone();
        Self {
            api,
            identity,
            channel,
            options,
            state,
            state_tx,
            notices,
            inbox,
            subscriptions: Vec::new(),
            fetching: false,
            channel_started: false,
        }
    }

    pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Input>) {
        self.subscribe_channel();
        self.start_fetch();

        let mut connection = self.channel.subscribe_state();

        loop {
            tokio::select! {
                input = inbox.recv() => match input {
                    Some(Input::Shutdown) | None => break,
                    Some(input) => self.handle(input),
                },
                changed = connection.changed() => {
                    if changed.is_ok() {
                        let current = *connection.borrow_and_update();
                        self.on_connection_state(current);
                    }
                }
            }
        }

        self.finish_vote(&mut inbox).await;
        self.teardown();
    }

    /// Wait for an in-flight vote so an accepted one is still recorded
    async fn finish_vote(&mut self, inbox: &mut mpsc::UnboundedReceiver<Input>) {
        if !self.state.submitting {
            return;
        }
        debug!("Waiting for the in-flight vote before shutting down");

        let finished = tokio::time::timeout(VOTE_DRAIN_TIMEOUT, async {
            while let Some(input) = inbox.recv().await {
                if let Input::VoteCompleted {
                    poll_id,
                    result,
                    reply,
                } = input
                {
                    self.vote_completed(poll_id, result, reply);
                    return;
                }
            }
        })
        .await;

        if finished.is_err() {
            warn!("Shut down with a vote still in flight");
        }
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Refresh => {
                if self.fetching {
                    debug!("Refresh ignored, fetch already in flight");
                } else {
                    self.start_fetch();
                }
            }
            Input::Submit { option_id, reply } => self.submit(option_id, reply),
            Input::Reconnect => self.reconnect(),
            Input::FetchCompleted(result) => self.fetch_completed(result),
            Input::VoteCompleted {
                poll_id,
                result,
                reply,
            } => self.vote_completed(poll_id, result, reply),
            Input::ReconnectDelayElapsed => {
                debug!("Manual reconnect delay elapsed");
                self.channel.connect();
            }
            Input::Channel(event) => self.on_channel_event(event),
            Input::Shutdown => {}
        }
    }

    /// Forward channel events into the inbox
    fn subscribe_channel(&mut self) {
        let kinds = [
            ChannelEventKind::Connect,
            ChannelEventKind::Disconnect,
            ChannelEventKind::Error,
            ChannelEventKind::PollUpdate,
            ChannelEventKind::VoteResult,
        ];
        for kind in kinds {
            let inbox = self.inbox.clone();
            let id = self.channel.on(kind, move |event| {
                inbox
                    .send(Input::Channel(event.clone()))
                    .map_err(|_| anyhow::anyhow!("sync engine stopped"))
            });
            self.subscriptions.push(id);
        }
    }

    fn start_fetch(&mut self) {
        info!("Fetching current poll");
        self.fetching = true;
        self.state.loading = true;
        self.publish();

        let api = Arc::clone(&self.api);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = api.fetch_current_poll().await;
            let _ = inbox.send(Input::FetchCompleted(result));
        });
    }

    fn fetch_completed(&mut self, result: SyncResult<Poll>) {
        self.fetching = false;
        self.state.loading = false;

        match result {
            Ok(poll) => {
                info!(
                    "Loaded poll {} (totalVotes={})",
                    poll.id, poll.total_votes
                );
                self.install(poll);
                self.state.error = None;
                self.publish();

                if !self.channel_started {
                    self.channel_started = true;
                    self.channel.connect();
                }
            }
            Err(e) => {
                warn!("Poll fetch failed: {}", e);
                let message = e.user_message();
                // A failed refresh keeps showing the last good poll
                if self.state.poll.is_some() {
                    self.notify(Notice::error(format!("Refresh failed: {}", message)));
                }
                self.state.error = Some(message);
                self.publish();
            }
        }
    }

    fn submit(&mut self, option_id: String, reply: oneshot::Sender<SubmitOutcome>) {
        if let Some(outcome) = self.check_submit(&option_id) {
            debug!("Vote for '{}' refused locally: {:?}", option_id, outcome);
            let _ = reply.send(outcome);
            return;
        }
        let Some(poll_id) = self.state.poll.as_ref().map(|poll| poll.id.clone()) else {
            let _ = reply.send(SubmitOutcome::NotReady);
            return;
        };

        info!("Submitting vote for '{}' in poll {}", option_id, poll_id);
        self.state.submitting = true;
        self.publish();

        let token = self.identity.get_or_create_token();
        let api = Arc::clone(&self.api);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = api.submit_vote(&option_id, &token).await;
            let _ = inbox.send(Input::VoteCompleted {
                poll_id,
                result,
                reply,
            });
        });
    }

    /// Local guards that refuse a vote without calling the server
    fn check_submit(&self, option_id: &str) -> Option<SubmitOutcome> {
        if self.state.submitting {
            return Some(SubmitOutcome::InProgress);
        }
        let Some(poll) = self.state.poll.as_ref() else {
            return Some(SubmitOutcome::NotReady);
        };
        if self.state.has_voted {
            return Some(SubmitOutcome::AlreadyVoted);
        }
        if !poll.is_active {
            return Some(SubmitOutcome::PollClosed);
        }
        if poll.option(option_id).is_none() {
            return Some(SubmitOutcome::UnknownOption(option_id.to_string()));
        }
        None
    }

    fn vote_completed(
        &mut self,
        poll_id: String,
        result: SyncResult<VoteOutcome>,
        reply: oneshot::Sender<SubmitOutcome>,
    ) {
        self.state.submitting = false;

        let outcome = match result {
            Ok(VoteOutcome::Accepted { poll, message }) => {
                info!(
                    "Vote accepted in poll {} (totalVotes={})",
                    poll_id, poll.total_votes
                );
                // Durable before has_voted is published
                self.identity.mark_voted(&poll_id);
                if poll.id != poll_id {
                    self.identity.mark_voted(&poll.id);
                }
                self.install(poll);

                let message = if message.is_empty() {
                    "Vote recorded".to_string()
                } else {
                    message
                };
                self.notify(Notice::success(message.clone()));
                SubmitOutcome::Accepted { message }
            }
            Ok(VoteOutcome::Rejected(message)) => {
                warn!("Vote rejected in poll {}: {}", poll_id, message);
                self.notify(Notice::error(
                    SyncError::VoteRejected(message.clone()).user_message(),
                ));
                SubmitOutcome::Rejected(message)
            }
            Err(e) => {
                warn!("Vote submission failed: {}", e);
                self.notify(Notice::error(e.user_message()));
                SubmitOutcome::Failed(e)
            }
        };

        self.publish();
        let _ = reply.send(outcome);
    }

    fn reconnect(&mut self) {
        if self.state.is_reconnecting {
            debug!("Reconnect already in progress");
            return;
        }

        info!("Manual reconnect requested");
        self.state.is_reconnecting = true;
        self.channel_started = true;
        self.channel.disconnect();
        self.publish();

        let delay = self.options.manual_reconnect_delay;
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(Input::ReconnectDelayElapsed);
        });
    }

    fn on_connection_state(&mut self, connection: ConnectionState) {
        self.state.connection = connection;
        if connection.is_connected() || connection.is_exhausted() {
            self.state.is_reconnecting = false;
        }
        self.publish();
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::PollUpdate(poll) => self.on_push(poll),
            ChannelEvent::Connect { .. } => {
                self.state.is_reconnecting = false;
                self.notify(Notice::success("Live updates connected"));
                self.publish();
            }
            ChannelEvent::Disconnect { reason } => {
                if reason != DisconnectReason::ClientRequested {
                    self.notify(Notice::warning(format!(
                        "Live updates interrupted ({}), reconnecting",
                        reason
                    )));
                }
            }
            ChannelEvent::Error { message, exhausted } => {
                if exhausted {
                    self.state.is_reconnecting = false;
                    self.publish();
                }
                self.notify(Notice::error(message));
            }
            ChannelEvent::VoteResult(result) => debug!("vote_result: {}", result),
        }
    }

    /// `error` belongs to the fetch path; pushes never clear it
    fn on_push(&mut self, poll: Poll) {
        if self.state.poll.is_none() {
            debug!("Ignoring push for poll {} before the first load", poll.id);
            return;
        }

        let previous_total = match self.state.poll {
            Some(ref current) if current.id == poll.id => {
                if self.options.push_ordering == PushOrdering::NewestUpdatedAt
                    && poll.updated_at < current.updated_at
                {
                    debug!(
                        "Ignoring stale push for poll {} ({} < {})",
                        poll.id, poll.updated_at, current.updated_at
                    );
                    return;
                }
                Some(current.total_votes)
            }
            _ => None,
        };

        debug!(
            "Installing pushed poll {} (totalVotes={})",
            poll.id, poll.total_votes
        );
        let total = poll.total_votes;
        self.install(poll);

        if let Some(previous) = previous_total {
            if total > previous {
                self.notify(Notice::info(format!("New votes in! {} total", total)));
            }
        }
        self.publish();
    }

    /// Replace the current poll and recompute the voted flag
    fn install(&mut self, poll: Poll) {
        self.state.has_voted = self.identity.has_voted(&poll.id);
        self.state.poll = Some(poll);
    }

    fn notify(&self, notice: Notice) {
        debug!("Notice ({:?}): {}", notice.level, notice.message);
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        self.state_tx.send_if_modified(|published| {
            if *published == self.state {
                false
            } else {
                *published = self.state.clone();
                true
            }
        });
    }

    /// Remove our subscriptions and close the channel
    fn teardown(mut self) {
        info!("Sync engine shutting down");
        for id in self.subscriptions.drain(..) {
            self.channel.off(id);
        }
        self.state.submitting = false;
        self.state.is_reconnecting = false;
        self.state.connection = ConnectionState::idle();
        self.publish();
        self.channel.dispose();
    }
}

//! Scripted doubles for the API and transport seams

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, watch, Semaphore};

use crate::api::{PollApi, VoteOutcome};
use crate::channel::{ChannelEvent, ChannelEventKind, Connection, Connector, PushChannel};
use crate::error::{SyncError, SyncResult};
use crate::models::Poll;

const WAIT: Duration = Duration::from_secs(5);

/// Engine.IO open packet with the default timings
pub(crate) const OPEN_FRAME: &str =
    r#"0{"sid":"mock-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// Wait until a watched value satisfies `pred`, failing the test on timeout
pub(crate) async fn wait_for_state<T: Clone>(
    rx: &mut watch::Receiver<T>,
    pred: impl FnMut(&T) -> bool,
) -> T {
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("state sender dropped")
        .clone()
}

/// Forward channel events of the given kinds into a queue
pub(crate) fn collect_events(
    channel: &PushChannel,
    kinds: &[ChannelEventKind],
) -> mpsc::UnboundedReceiver<ChannelEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in kinds {
        let tx = tx.clone();
        channel.on(*kind, move |event| {
            tx.send(event.clone())
                .map_err(|_| anyhow::anyhow!("collector gone"))
        });
    }
    rx
}

pub(crate) async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event queue closed")
}

enum Planned {
    Accept(MockConnection),
    Refuse(String),
}

/// Connector that hands out scripted connections in order
///
/// Once the script runs out every attempt is refused.
pub(crate) struct MockConnector {
    planned: Mutex<VecDeque<Planned>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            planned: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
        })
    }

    /// Plan a successful connection and return the server end of it
    pub(crate) fn accept(&self) -> MockServer {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        self.planned
            .lock()
            .unwrap()
            .push_back(Planned::Accept(MockConnection { incoming, outgoing }));
        MockServer {
            to_client,
            from_client,
        }
    }

    pub(crate) fn refuse(&self, message: &str) {
        self.planned
            .lock()
            .unwrap()
            .push_back(Planned::Refuse(message.to_string()));
    }

    /// Connection attempts made so far
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> SyncResult<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let planned = self.planned.lock().unwrap().pop_front();
        match planned {
            Some(Planned::Accept(conn)) => Ok(Box::new(conn)),
            Some(Planned::Refuse(message)) => Err(SyncError::Channel(message)),
            None => Err(SyncError::Channel("connection refused".to_string())),
        }
    }
}

struct MockConnection {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, frame: String) -> SyncResult<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| SyncError::Channel("server gone".to_string()))
    }

    async fn recv(&mut self) -> Option<SyncResult<String>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.incoming.close();
    }
}

/// Server end of a scripted connection; dropping it closes the socket
pub(crate) struct MockServer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockServer {
    pub(crate) fn send(&self, frame: &str) {
        // The client may already have hung up
        let _ = self.to_client.send(frame.to_string());
    }

    /// Queue the Engine.IO open and the namespace confirmation
    pub(crate) fn open(&self) {
        self.send(OPEN_FRAME);
        self.send(r#"40{"sid":"mock-ns"}"#);
    }

    /// Like `open`, with custom heartbeat timings in milliseconds
    pub(crate) fn open_with_ping(&self, interval: u64, timeout: u64) {
        let open = json!({
            "sid": "mock-sid",
            "upgrades": [],
            "pingInterval": interval,
            "pingTimeout": timeout,
        });
        self.send(&format!("0{}", open));
        self.send(r#"40{"sid":"mock-ns"}"#);
    }

    pub(crate) fn push_poll(&self, poll: &Poll) {
        self.send(&format!("42{}", json!(["poll_update", poll])));
    }

    /// Next frame the client sent, or `None` if it went quiet or hung up
    pub(crate) async fn next_frame(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    pub(crate) async fn expect_frame(&mut self) -> String {
        self.next_frame().await.expect("expected a frame from the client")
    }

    /// Wait until the client closes its end
    pub(crate) async fn closed(&mut self) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            match tokio::time::timeout_at(deadline, self.from_client.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

/// Poll API with queued responses
pub(crate) struct MockApi {
    fetches: Mutex<VecDeque<SyncResult<Poll>>>,
    votes: Mutex<VecDeque<SyncResult<VoteOutcome>>>,
    fetch_calls: AtomicUsize,
    vote_calls: AtomicUsize,
    submitted: Mutex<Vec<(String, String)>>,
    held: AtomicBool,
    gate: Semaphore,
}

impl MockApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            fetches: Mutex::new(VecDeque::new()),
            votes: Mutex::new(VecDeque::new()),
            fetch_calls: AtomicUsize::new(0),
            vote_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    pub(crate) fn queue_fetch(&self, result: SyncResult<Poll>) {
        self.fetches.lock().unwrap().push_back(result);
    }

    pub(crate) fn queue_vote(&self, result: SyncResult<VoteOutcome>) {
        self.votes.lock().unwrap().push_back(result);
    }

    /// Keep vote submissions in flight until `release_vote`
    pub(crate) fn hold_votes(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release_vote(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn vote_calls(&self) -> usize {
        self.vote_calls.load(Ordering::SeqCst)
    }

    /// `(option id, client token)` of every submission
    pub(crate) fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PollApi for MockApi {
    async fn fetch_current_poll(&self) -> SyncResult<Poll> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.fetches.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(SyncError::Network("no scripted fetch".to_string())))
    }

    async fn submit_vote(&self, option_id: &str, client_token: &str) -> SyncResult<VoteOutcome> {
        self.vote_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .lock()
            .unwrap()
            .push((option_id.to_string(), client_token.to_string()));

        if self.held.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        let next = self.votes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(SyncError::Network("no scripted vote".to_string())))
    }
}

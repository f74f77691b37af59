//! Push channel connection task
//!
//! `PushChannel` is the owned handle; a spawned task holds the socket and
//! runs the reconnect loop. Every `connect()` starts a new task generation
//! and every `disconnect()` retires the current one, so a retired task can
//! neither publish state nor emit events.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::frame::{error_message, Handshake, Packet, MAX_LIVENESS_WINDOW};
use super::listeners::{listener, Listeners, SubscriptionId};
use super::state::{ConnectionState, Lifecycle, NextStep, ReconnectPolicy};
use super::transport::{socket_io_url, Connection, Connector, WsConnector};
use super::{ChannelEvent, ChannelEventKind, DisconnectReason};
use crate::config::Config;
use crate::models::Poll;

/// How long the server gets to complete the open/connect handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the push channel
#[derive(Debug, Clone)]
pub struct PushChannelConfig {
    /// Server origin; the Socket.IO path is appended
    pub url: String,
    /// Room announced with `join_poll` after every open
    pub poll_room: String,
    pub policy: ReconnectPolicy,
}

impl Default for PushChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000".to_string(),
            poll_room: "current".to_string(),
            policy: ReconnectPolicy::default(),
        }
    }
}

impl PushChannelConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.ws_url.clone(),
            poll_room: config.poll_room.clone(),
            policy: ReconnectPolicy {
                max_attempts: config.reconnect_attempts,
                interval: config.reconnect_interval(),
            },
        }
    }
}

/// Commands sent to the connection task
#[derive(Debug)]
enum Command {
    /// Send an application event to the server
    Emit { event: String, data: Value },
    /// Close the socket and stop
    Shutdown,
}

/// State shared between the handle and its task
struct Shared {
    listeners: Listeners,
    state_tx: watch::Sender<ConnectionState>,
    generation: Mutex<u64>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner) == generation
    }

    /// Publish state on behalf of a task; ignored if the task was retired
    fn publish(&self, generation: u64, state: ConnectionState) -> bool {
        let current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != generation {
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }

    fn emit(&self, generation: u64, event: ChannelEvent) {
        if self.is_current(generation) {
            self.listeners.emit(&event);
        }
    }

    /// Retire the running task and publish a new state
    fn advance(&self, state: ConnectionState) -> u64 {
        let mut current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *current += 1;
        self.state_tx.send_replace(state);
        *current
    }
}

/// Auto-reconnecting push channel
pub struct PushChannel {
    config: PushChannelConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    state_rx: watch::Receiver<ConnectionState>,
    /// Command sender of the running task, if any
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl PushChannel {
    /// Create a channel using the given connector. Nothing connects until
    /// `connect()` is called.
    pub fn new(config: PushChannelConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::idle());
        Self {
            config,
            connector,
            shared: Arc::new(Shared {
                listeners: Listeners::new(),
                state_tx,
                generation: Mutex::new(0),
            }),
            state_rx,
            commands: None,
        }
    }

    /// Create a channel that connects over WebSockets
    pub fn websocket(config: PushChannelConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Subscribe to one kind of event
    pub fn on<F>(&self, kind: ChannelEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(kind, listener(callback))
    }

    /// Remove a subscription
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }

    /// Number of registered subscribers across all kinds
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.total()
    }

    /// Start connecting. No-op while already connecting or connected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&mut self) {
        if self.state().is_active() {
            debug!("Push channel already {:?}", self.state().phase);
            return;
        }

        self.stop_task();

        let mut lifecycle = Lifecycle::new(self.config.policy);
        lifecycle.start();
        let generation = self.shared.advance(lifecycle.state());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_channel(
            Arc::clone(&self.shared),
            generation,
            self.config.clone(),
            Arc::clone(&self.connector),
            lifecycle,
            command_rx,
        ));
        self.commands = Some(command_tx);
    }

    /// Tear down the connection and cancel any pending retry
    ///
    /// No automatic reconnection happens until `connect()` is called again.
    pub fn disconnect(&mut self) {
        let previous = self.state();
        self.shared.advance(ConnectionState::idle());
        self.stop_task();

        if previous.is_connected() {
            self.shared.listeners.emit(&ChannelEvent::Disconnect {
                reason: DisconnectReason::ClientRequested,
            });
        }
        info!("Push channel disconnected");
    }

    /// Send an application event; dropped with a warning unless connected
    pub fn send(&self, event: &str, data: Value) -> bool {
        if !self.state().is_connected() {
            warn!("Push channel not connected, dropping '{}'", event);
            return false;
        }

        match self.commands {
            Some(ref commands) => commands
                .send(Command::Emit {
                    event: event.to_string(),
                    data,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Disconnect and drop every subscriber
    pub fn dispose(mut self) {
        self.disconnect();
        self.shared.listeners.clear();
    }

    fn stop_task(&mut self) {
        if let Some(commands) = self.commands.take() {
            // The task may already have exited after exhausting its retries
            let _ = commands.send(Command::Shutdown);
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if self.commands.is_some() {
            self.shared.advance(ConnectionState::idle());
            self.stop_task();
        }
    }
}

/// How a session ended
#[derive(Debug)]
enum SessionEnd {
    /// Shutdown requested
    Shutdown,
    /// Was open, then closed
    Dropped(DisconnectReason),
    /// Never opened
    Failed(String),
}

/// Connection loop with fixed-interval retries
async fn run_channel(
    shared: Arc<Shared>,
    generation: u64,
    config: PushChannelConfig,
    connector: Arc<dyn Connector>,
    mut lifecycle: Lifecycle,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let url = socket_io_url(&config.url);

    loop {
        if !shared.is_current(generation) {
            return;
        }
        info!(
            "Connecting push channel to {} (failed attempts: {})",
            url,
            lifecycle.state().attempts
        );

        let end = tokio::select! {
            result = connector.connect(&url) => match result {
                Ok(conn) => {
                    run_session(conn, &shared, generation, &config, &mut lifecycle, &mut commands)
                        .await
                }
                Err(e) => SessionEnd::Failed(e.to_string()),
            },
            command = commands.recv() => match command {
                Some(Command::Emit { event, .. }) => {
                    debug!("Dropping '{}' while connecting", event);
                    continue;
                }
                Some(Command::Shutdown) | None => SessionEnd::Shutdown,
            },
        };

        let step = match end {
            SessionEnd::Shutdown => {
                debug!("Push channel task stopping");
                return;
            }
            SessionEnd::Dropped(reason) => {
                warn!("Push channel dropped: {}", reason);
                let step = lifecycle.dropped();
                shared.publish(generation, lifecycle.state());
                shared.emit(generation, ChannelEvent::Disconnect { reason });
                step
            }
            SessionEnd::Failed(message) => {
                warn!("Push channel attempt failed: {}", message);
                let step = lifecycle.attempt_failed();
                shared.publish(generation, lifecycle.state());
                step
            }
        };

        match step {
            NextStep::GiveUp => {
                let attempts = lifecycle.state().attempts;
                warn!("Push channel giving up after {} failed attempts", attempts);
                shared.emit(
                    generation,
                    ChannelEvent::Error {
                        message: format!(
                            "Live updates unavailable after {} attempts. Reconnect to try again.",
                            attempts
                        ),
                        exhausted: true,
                    },
                );
                return;
            }
            NextStep::RetryAfter(delay) => {
                debug!("Retrying push channel in {:?}", delay);
                let sleep = tokio::time::sleep(delay);
                tokio::pin!(sleep);
                loop {
                    tokio::select! {
                        _ = &mut sleep => break,
                        command = commands.recv() => match command {
                            Some(Command::Emit { event, .. }) => {
                                debug!("Dropping '{}' while reconnecting", event);
                            }
                            Some(Command::Shutdown) | None => return,
                        },
                    }
                }
            }
        }
    }
}

/// Drive one connection from handshake to close
async fn run_session(
    mut conn: Box<dyn Connection>,
    shared: &Shared,
    generation: u64,
    config: &PushChannelConfig,
    lifecycle: &mut Lifecycle,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
    let handshake = {
        let opening = tokio::time::timeout(HANDSHAKE_TIMEOUT, open_namespace(conn.as_mut()));
        tokio::pin!(opening);
        loop {
            tokio::select! {
                result = &mut opening => break result,
                command = commands.recv() => match command {
                    Some(Command::Emit { event, .. }) => {
                        debug!("Dropping '{}' during handshake", event);
                    }
                    Some(Command::Shutdown) | None => return SessionEnd::Shutdown,
                },
            }
        }
    };

    let handshake = match handshake {
        Ok(Ok(handshake)) => handshake,
        Ok(Err(message)) => {
            conn.close().await;
            return SessionEnd::Failed(message);
        }
        Err(_) => {
            conn.close().await;
            return SessionEnd::Failed("Timed out waiting for the server handshake".to_string());
        }
    };

    lifecycle.opened();
    shared.publish(generation, lifecycle.state());
    info!("Push channel connected (sid {})", handshake.sid);
    shared.emit(generation, ChannelEvent::Connect { at: Utc::now() });

    let join = Packet::event("join_poll", json!({ "pollId": config.poll_room }));
    if let Err(e) = conn.send(join.encode()).await {
        return SessionEnd::Dropped(DisconnectReason::TransportError(e.to_string()));
    }

    let window = handshake.liveness_window();
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit { event, data }) => {
                    if let Err(e) = conn.send(Packet::event(event, data).encode()).await {
                        return SessionEnd::Dropped(DisconnectReason::TransportError(e.to_string()));
                    }
                }
                Some(Command::Shutdown) | None => {
                    let _ = conn.send(Packet::Disconnect.encode()).await;
                    conn.close().await;
                    return SessionEnd::Shutdown;
                }
            },
            frame = conn.recv() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        return SessionEnd::Dropped(DisconnectReason::TransportError(e.to_string()));
                    }
                    None => return SessionEnd::Dropped(DisconnectReason::TransportClosed),
                };

                match Packet::decode(&frame) {
                    Ok(Packet::Ping) => {
                        deadline.as_mut().reset(deadline_after(window));
                        if let Err(e) = conn.send(Packet::Pong.encode()).await {
                            return SessionEnd::Dropped(DisconnectReason::TransportError(e.to_string()));
                        }
                    }
                    Ok(Packet::Event { name, data }) => dispatch_event(shared, generation, &name, data),
                    Ok(Packet::Disconnect) => return SessionEnd::Dropped(DisconnectReason::ServerClosed),
                    Ok(Packet::Close) => return SessionEnd::Dropped(DisconnectReason::TransportClosed),
                    Ok(other) => debug!("Ignoring packet {:?}", other),
                    Err(e) => warn!("Ignoring undecodable frame: {}", e),
                }
            }
            _ = &mut deadline => return SessionEnd::Dropped(DisconnectReason::PingTimeout),
        }
    }
}

/// Wait for the Engine.IO open, join the default namespace and wait for
/// the server to confirm it
/// Next liveness deadline, falling back to the capped window on overflow
fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + window.min(MAX_LIVENESS_WINDOW))
}

async fn open_namespace(conn: &mut dyn Connection) -> Result<Handshake, String> {
    let mut handshake: Option<Handshake> = None;

    loop {
        let frame = match conn.recv().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e.to_string()),
            None => return Err("Server closed the connection during handshake".to_string()),
        };

        match Packet::decode(&frame) {
            Ok(Packet::Open(open)) => {
                debug!("Engine.IO open, sid {}", open.sid);
                conn.send(Packet::Connect(None).encode())
                    .await
                    .map_err(|e| e.to_string())?;
                handshake = Some(open);
            }
            Ok(Packet::Connect(_)) => {
                return handshake
                    .take()
                    .ok_or_else(|| "Namespace connect arrived before open".to_string());
            }
            Ok(Packet::ConnectError(data)) => return Err(error_message(&data)),
            Ok(Packet::Ping) => {
                conn.send(Packet::Pong.encode())
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Ok(Packet::Close) => {
                return Err("Server closed the connection during handshake".to_string())
            }
            Ok(other) => debug!("Ignoring {:?} during handshake", other),
            Err(e) => warn!("Ignoring undecodable frame during handshake: {}", e),
        }
    }
}

/// Route an application event from the server to subscribers
fn dispatch_event(shared: &Shared, generation: u64, name: &str, data: Value) {
    match name {
        "poll_update" => match serde_json::from_value::<Poll>(data) {
            Ok(poll) => match poll.validate() {
                Ok(()) => {
                    debug!(
                        "poll_update for {} (totalVotes={})",
                        poll.id, poll.total_votes
                    );
                    shared.emit(generation, ChannelEvent::PollUpdate(poll));
                }
                Err(e) => warn!("Dropping inconsistent poll_update: {}", e),
            },
            Err(e) => warn!("Dropping malformed poll_update: {}", e),
        },
        "vote_result" => shared.emit(generation, ChannelEvent::VoteResult(data)),
        "error" => shared.emit(
            generation,
            ChannelEvent::Error {
                message: error_message(&data),
                exhausted: false,
            },
        ),
        other => debug!("Ignoring '{}' event", other),
    }
}

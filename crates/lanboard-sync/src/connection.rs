//! The single connection to the backend's event channel.
//!
//! One manager owns at most one live WebSocket. Inbound events fan out on a
//! broadcast channel and connection state on a watch channel, so any number
//! of observers can subscribe without clobbering each other. The manager is
//! constructed and injected explicitly; there is no global instance.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lanboard_core::errors::CommandSendError;
use lanboard_core::events::{ClientCommand, CommandSink, PushEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle as observed through [`ConnectionManager::state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Connection behavior knobs. Everything is injectable for tests.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub url: String,
    /// Consecutive failed attempts before giving up until a manual connect.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between attempts.
    pub reconnect_backoff: Duration,
    pub event_capacity: usize,
    pub outbound_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9090/events".to_string(),
            max_reconnect_attempts: 5,
            reconnect_backoff: Duration::from_secs(3),
            event_capacity: 256,
            outbound_capacity: 64,
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    event_tx: broadcast::Sender<PushEvent>,
    state_tx: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::Sender<ClientCommand>>>,
    failed_attempts: AtomicU32,
    /// The active run loop's cancellation token, keyed by generation so a
    /// finished loop never clears a newer loop's slot.
    run_slot: Mutex<Option<(u64, CancellationToken)>>,
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            event_tx,
            state_tx,
            outbound: Mutex::new(None),
            failed_attempts: AtomicU32::new(0),
            run_slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Register an event observer. Re-subscribing never replaces anyone
    /// else's subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.event_tx.subscribe()
    }

    /// Follow connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Consecutive failed attempts since the last success or manual connect.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    /// Start the connection loop. Idempotent: a no-op while a loop is
    /// already connecting or connected. Resets the attempt counter.
    pub fn connect(self: &Arc<Self>) {
        let token = {
            let mut slot = self.run_slot.lock();
            if slot.is_some() {
                debug!("connect ignored, already running");
                return;
            }
            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            let token = CancellationToken::new();
            *slot = Some((generation, token.clone()));
            self.failed_attempts.store(0, Ordering::Relaxed);
            (generation, token)
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(token.0, token.1).await;
        });
    }

    /// Tear down the socket and cancel any pending reconnect. Auto-reconnect
    /// stays suppressed until the next `connect()`.
    pub fn disconnect(&self) {
        if let Some((_, token)) = self.run_slot.lock().take() {
            token.cancel();
        }
        *self.outbound.lock() = None;
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    /// Queue a command on the socket writer.
    pub fn send(&self, command: &ClientCommand) -> Result<(), CommandSendError> {
        let guard = self.outbound.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(CommandSendError::NotConnected);
        };
        tx.try_send(command.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CommandSendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => CommandSendError::NotConnected,
        })
    }

    async fn run(self: Arc<Self>, generation: u64, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }
            let failures = self.failed_attempts.load(Ordering::Relaxed);
            if failures >= self.config.max_reconnect_attempts {
                warn!(
                    attempts = failures,
                    "giving up on the event channel until a manual connect"
                );
                break;
            }

            self.state_tx.send_replace(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = token.cancelled() => break,
                result = connect_async(&self.config.url) => result,
            };

            match connected {
                Ok((ws, _)) => {
                    info!(url = %self.config.url, "event channel connected");
                    self.failed_attempts.store(0, Ordering::Relaxed);
                    let (out_tx, out_rx) = mpsc::channel(self.config.outbound_capacity);
                    *self.outbound.lock() = Some(out_tx);
                    self.state_tx.send_replace(ConnectionState::Connected);

                    self.drive(ws, out_rx, &token).await;

                    *self.outbound.lock() = None;
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    if token.is_cancelled() {
                        break;
                    }
                    self.failed_attempts.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    let attempts = self.failed_attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(error = %e, attempt = attempts, "connection attempt failed");
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        let mut slot = self.run_slot.lock();
        if slot.as_ref().is_some_and(|(g, _)| *g == generation) {
            *slot = None;
        }
    }

    /// Pump one live socket until it closes, errors, or is cancelled.
    async fn drive(
        &self,
        ws: WsStream,
        mut out_rx: mpsc::Receiver<ClientCommand>,
        token: &CancellationToken,
    ) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                command = out_rx.recv() => {
                    let Some(command) = command else { break };
                    match serde_json::to_string(&command) {
                        Ok(json) => {
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to encode outbound command"),
                    }
                }
                message = ws_rx.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("event channel closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "event channel transport error");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Parse and fan out one inbound payload. Malformed payloads are
    /// dropped here and never reach subscribers or kill the loop.
    fn dispatch(&self, raw: &str) {
        match serde_json::from_str::<PushEvent>(raw) {
            Ok(PushEvent::Unknown) => {
                debug!(payload_len = raw.len(), "dropping unrecognized event type");
            }
            Ok(event) => {
                let _ = self.event_tx.send(event);
            }
            Err(e) => {
                warn!(error = %e, payload_len = raw.len(), "dropping malformed event payload");
            }
        }
    }
}

impl CommandSink for ConnectionManager {
    fn send_command(&self, command: &ClientCommand) -> Result<(), CommandSendError> {
        self.send(command)
    }
}

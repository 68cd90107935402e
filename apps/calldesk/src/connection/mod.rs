//! Connection Manager.
//!
//! Owns the single link to the backend, reconnects with linear backoff after
//! an involuntary close, and fans normalized events out to subscribers keyed
//! by [`SignalKind`]. Status is published on a `watch` channel.

mod link;
mod memory;
mod websocket;

pub use link::{ConnectError, Connector, Link, LinkPeer};
pub use memory::MemoryConnector;
pub use websocket::WebSocketConnector;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use call_protocol::{normalize, CallEvent, Envelope, EventKind};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use signal_bus::{SignalBus, Subscription};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    /// Badge text for the board.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Live Updates",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Disconnected => "Offline",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Connected,
    Disconnected,
    Event(EventKind),
}

impl SignalKind {
    /// Lifecycle kinds followed by every event kind.
    pub fn all() -> impl Iterator<Item = SignalKind> {
        [SignalKind::Connected, SignalKind::Disconnected]
            .into_iter()
            .chain(EventKind::ALL.into_iter().map(SignalKind::Event))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Connected,
    Disconnected,
    Event(CallEvent),
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Connected => SignalKind::Connected,
            Signal::Disconnected => SignalKind::Disconnected,
            Signal::Event(event) => SignalKind::Event(event.kind()),
        }
    }
}

pub type SignalHandler = Subscription<Signal>;

/// Linear backoff: attempt `n` waits `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Connected,
    /// Reconnect timer pending.
    Waiting,
}

struct LinkState {
    endpoint: String,
    phase: Phase,
    attempts: u32,
    /// Bumped whenever a link or timer is superseded; stale callbacks compare against it.
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    link_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    signals: SignalBus<SignalKind, Signal>,
    state: Mutex<LinkState>,
    status: watch::Sender<ConnectionStatus>,
}

/// Cloning shares the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        endpoint: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                policy,
                signals: SignalBus::new(),
                state: Mutex::new(LinkState {
                    endpoint: endpoint.into(),
                    phase: Phase::Idle,
                    attempts: 0,
                    generation: 0,
                    outbound: None,
                    link_task: None,
                    reconnect_timer: None,
                }),
                status,
            }),
        }
    }

    pub fn on<F>(&self, kind: SignalKind, handler: F) -> SignalHandler
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.shared.signals.on(kind, handler)
    }

    /// Registers an existing handler under another kind.
    pub fn subscribe(&self, kind: SignalKind, handler: SignalHandler) {
        self.shared.signals.subscribe(kind, handler);
    }

    pub fn off(&self, kind: SignalKind, handler: &SignalHandler) -> bool {
        self.shared.signals.off(kind, handler)
    }

    pub fn handler_count(&self, kind: SignalKind) -> usize {
        self.shared.signals.handler_count(kind)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().phase == Phase::Connected
    }

    /// Reconnect attempts used since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.state.lock().attempts
    }

    pub fn endpoint(&self) -> String {
        self.shared.state.lock().endpoint.clone()
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }

    /// Opens the link, optionally switching endpoint first.
    ///
    /// No-op while connecting or connected. A pending reconnect timer is
    /// cancelled and the attempt budget starts over.
    pub fn connect(&self, endpoint: Option<&str>) {
        let mut state = self.shared.state.lock();
        match state.phase {
            Phase::Connecting | Phase::Connected => {
                debug!(
                    target: "calldesk::connection",
                    phase = ?state.phase,
                    "connect ignored, link already active"
                );
                return;
            }
            Phase::Waiting => {
                if let Some(timer) = state.reconnect_timer.take() {
                    timer.abort();
                }
                debug!(target: "calldesk::connection", "pending reconnect replaced by explicit connect");
            }
            Phase::Idle => {}
        }
        if let Some(endpoint) = endpoint {
            state.endpoint = endpoint.to_string();
        }
        state.attempts = 0;
        self.shared.begin_attempt(&mut state);
    }

    /// Closes the link on purpose. No reconnect follows.
    pub fn disconnect(&self) {
        let was_open = {
            let mut state = self.shared.state.lock();
            if let Some(timer) = state.reconnect_timer.take() {
                timer.abort();
            }
            if let Some(task) = state.link_task.take() {
                task.abort();
            }
            state.generation += 1;
            state.outbound = None;
            state.attempts = 0;
            let was_open = matches!(state.phase, Phase::Connecting | Phase::Connected);
            state.phase = Phase::Idle;
            self.shared
                .status
                .send_replace(ConnectionStatus::Disconnected);
            was_open
        };
        if was_open {
            info!(target: "calldesk::connection", "disconnected on request");
            self.shared
                .signals
                .emit(SignalKind::Disconnected, &Signal::Disconnected);
        }
    }

    /// Cancels a pending reconnect timer. Returns whether one was pending.
    pub fn cancel_reconnect(&self) -> bool {
        let mut state = self.shared.state.lock();
        match state.reconnect_timer.take() {
            Some(timer) => {
                timer.abort();
                state.generation += 1;
                if state.phase == Phase::Waiting {
                    state.phase = Phase::Idle;
                }
                true
            }
            None => false,
        }
    }

    pub fn send(&self, message: &Envelope) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "calldesk::connection", kind = %message.kind, error = %err, "failed to encode outbound message");
                return false;
            }
        };
        let sent = {
            let state = self.shared.state.lock();
            state.phase == Phase::Connected
                && state
                    .outbound
                    .as_ref()
                    .is_some_and(|tx| tx.send(text).is_ok())
        };
        if !sent {
            warn!(
                target: "calldesk::connection",
                kind = %message.kind,
                "cannot send message, websocket is not connected"
            );
        }
        sent
    }

    pub fn send_event(&self, name: &str, payload: Value) -> bool {
        self.send(&Envelope::named(name, payload))
    }

    /// Teardown: cancel the reconnect timer, drop every subscription, then close.
    pub fn shutdown(&self) {
        self.cancel_reconnect();
        self.shared.signals.clear();
        self.disconnect();
        debug!(target: "calldesk::connection", "connection manager shut down");
    }
}

impl Shared {
    fn begin_attempt(self: &Arc<Self>, state: &mut LinkState) {
        state.generation += 1;
        state.phase = Phase::Connecting;
        self.status.send_replace(ConnectionStatus::Connecting);

        let generation = state.generation;
        let url = state.endpoint.clone();
        info!(target: "calldesk::connection", url = %url, "connecting");
        let shared = Arc::clone(self);
        state.link_task = Some(tokio::spawn(async move {
            shared.run_link(generation, url).await;
        }));
    }

    async fn run_link(self: Arc<Self>, generation: u64, url: String) {
        let Link {
            outbound,
            mut inbound,
        } = match self.connector.connect(&url).await {
            Ok(link) => link,
            Err(err) => {
                warn!(target: "calldesk::connection", url = %url, error = %err, "connection attempt failed");
                self.link_closed(generation);
                return;
            }
        };

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!(target: "calldesk::connection", "discarding link from superseded attempt");
                return;
            }
            state.phase = Phase::Connected;
            state.attempts = 0;
            state.outbound = Some(outbound);
            self.status.send_replace(ConnectionStatus::Connected);
        }
        info!(target: "calldesk::connection", url = %url, "connected");
        self.signals.emit(SignalKind::Connected, &Signal::Connected);
        self.send_frontend_ready(generation);

        while let Some(frame) = inbound.recv().await {
            self.dispatch(&frame);
        }
        self.link_closed(generation);
    }

    fn send_frontend_ready(&self, generation: u64) {
        let text = match serde_json::to_string(&Envelope::frontend_ready()) {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "calldesk::connection", error = %err, "failed to encode frontend_ready");
                return;
            }
        };
        let state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if let Some(tx) = state.outbound.as_ref() {
            if tx.send(text).is_ok() {
                debug!(target: "calldesk::connection", "frontend_ready sent");
            }
        }
    }

    fn dispatch(&self, frame: &str) {
        match normalize(frame) {
            Ok(event) => {
                let kind = SignalKind::Event(event.kind());
                let delivered = self.signals.emit(kind, &Signal::Event(event));
                trace!(target: "calldesk::connection", ?kind, delivered, "event dispatched");
            }
            Err(err) => {
                warn!(target: "calldesk::connection", error = %err, "dropping inbound message");
            }
        }
    }

    fn link_closed(self: &Arc<Self>, generation: u64) {
        let retry = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.outbound = None;
            state.link_task = None;
            state.phase = Phase::Idle;
            self.status.send_replace(ConnectionStatus::Disconnected);

            if state.attempts < self.policy.max_attempts {
                state.attempts += 1;
                let attempt = state.attempts;
                let delay = self.policy.delay_for(attempt);
                state.phase = Phase::Waiting;
                let shared = Arc::clone(self);
                state.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.reconnect(generation);
                }));
                Some((attempt, delay))
            } else {
                None
            }
        };

        info!(target: "calldesk::connection", "disconnected");
        self.signals
            .emit(SignalKind::Disconnected, &Signal::Disconnected);

        match retry {
            Some((attempt, delay)) => info!(
                target: "calldesk::connection",
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            ),
            None => error!(
                target: "calldesk::connection",
                max_attempts = self.policy.max_attempts,
                "max reconnection attempts reached"
            ),
        }
    }

    fn reconnect(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation || state.phase != Phase::Waiting {
            return;
        }
        state.reconnect_timer = None;
        info!(
            target: "calldesk::connection",
            attempt = state.attempts,
            max_attempts = self.policy.max_attempts,
            "attempting to reconnect"
        );
        self.begin_attempt(&mut state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear_in_attempt() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn badge_labels() {
        assert_eq!(ConnectionStatus::Connected.label(), "Live Updates");
        assert_eq!(ConnectionStatus::Connecting.label(), "Connecting...");
        assert_eq!(ConnectionStatus::Disconnected.label(), "Offline");
    }

    #[test]
    fn signal_kinds_cover_lifecycle_and_events() {
        let kinds: Vec<_> = SignalKind::all().collect();
        assert_eq!(kinds.len(), 2 + EventKind::ALL.len());
        assert_eq!(kinds[0], SignalKind::Connected);
        assert!(kinds.contains(&SignalKind::Event(EventKind::LiveTranscriptChunk)));
    }
}

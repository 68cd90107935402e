//! Session: one Connection Manager feeding one Call Store.
//!
//! Every mutation (normalized events, operator edits, highlight expiry)
//! goes through a single queue and is applied by a single reducer task, so
//! reductions never interleave. Readers get `Arc` snapshots from a `watch`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use call_store::{display_order, CallId, CallPatch, CallRecord, CallStore, StoreError};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connection::{
    ConnectionManager, ConnectionStatus, Connector, ReconnectPolicy, Signal, SignalHandler,
    SignalKind,
};

pub const HIGHLIGHT_WINDOW: Duration = Duration::from_secs(3);

pub type Snapshot = Arc<Vec<CallRecord>>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub endpoint: String,
    pub policy: ReconnectPolicy,
    /// Records shown before the backend sends anything.
    pub seed: Vec<CallRecord>,
    pub highlight_window: Duration,
    pub auto_connect: bool,
}

impl SessionOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            policy: ReconnectPolicy::default(),
            seed: Vec::new(),
            highlight_window: HIGHLIGHT_WINDOW,
            auto_connect: true,
        }
    }
}

enum SessionInput {
    Signal(Signal),
    Remove {
        id: CallId,
        reply: oneshot::Sender<Option<CallRecord>>,
    },
    Patch {
        id: CallId,
        patch: CallPatch,
        reply: oneshot::Sender<Result<bool, StoreError>>,
    },
    Append {
        record: CallRecord,
        reply: oneshot::Sender<CallId>,
    },
    ExpireHighlight {
        id: CallId,
        token: u64,
    },
    Stop,
}

pub struct Session {
    handle: SessionHandle,
    reducer: Option<JoinHandle<()>>,
}

impl Session {
    /// Seeds the store, wires the connection into the reducer queue and,
    /// unless disabled, starts connecting. Must be called inside a runtime.
    pub fn start(options: SessionOptions, connector: Arc<dyn Connector>) -> Self {
        let store = CallStore::with_seed(options.seed);
        let seeded = store.len();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(store.calls().to_vec()));
        let connection = ConnectionManager::new(connector, options.endpoint, options.policy);

        let forward = inputs_tx.clone();
        let forwarder = SignalHandler::new(move |signal: &Signal| {
            let _ = forward.send(SessionInput::Signal(signal.clone()));
        });
        for kind in SignalKind::all() {
            connection.subscribe(kind, forwarder.clone());
        }

        let reducer = Reducer {
            store,
            inputs: inputs_tx.clone(),
            highlights: HashMap::new(),
            next_token: 0,
            window: options.highlight_window,
            snapshot: snapshot_tx,
        };
        let reducer = tokio::spawn(reducer.run(inputs_rx));

        info!(
            target: "calldesk::session",
            seeded,
            endpoint = %connection.endpoint(),
            "session started"
        );

        let handle = SessionHandle {
            inputs: inputs_tx,
            calls: snapshot_rx,
            connection,
            forwarder,
        };
        if options.auto_connect {
            handle.connect(None);
        }
        Self {
            handle,
            reducer: Some(reducer),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Tears the session down and waits for the reducer to finish.
    pub async fn shutdown(mut self) {
        self.handle.shutdown();
        if let Some(reducer) = self.reducer.take() {
            let _ = reducer.await;
        }
        info!(target: "calldesk::session", "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropped without shutdown(): close the link and abort the reducer.
        if let Some(reducer) = self.reducer.take() {
            self.handle.shutdown();
            reducer.abort();
            debug!(target: "calldesk::session", "session dropped without shutdown");
        }
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<SessionInput>,
    calls: watch::Receiver<Snapshot>,
    connection: ConnectionManager,
    forwarder: SignalHandler,
}

impl SessionHandle {
    /// Storage-order snapshots, refreshed after every applied change.
    pub fn calls(&self) -> watch::Receiver<Snapshot> {
        self.calls.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.calls.borrow().clone()
    }

    /// Derived on every call; never cached.
    pub fn display_order(&self) -> Vec<CallRecord> {
        display_order(&self.snapshot())
    }

    pub fn active_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|call| call.is_in_progress())
            .count()
    }

    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub async fn remove(&self, id: CallId) -> Result<Option<CallRecord>, SessionError> {
        self.request(|reply| SessionInput::Remove { id, reply }).await
    }

    pub async fn patch(&self, id: CallId, patch: CallPatch) -> Result<bool, SessionError> {
        let result = self
            .request(|reply| SessionInput::Patch { id, patch, reply })
            .await?;
        Ok(result?)
    }

    pub async fn append(&self, record: CallRecord) -> Result<CallId, SessionError> {
        self.request(|reply| SessionInput::Append { record, reply })
            .await
    }

    pub fn connect(&self, endpoint: Option<&str>) {
        self.connection.connect(endpoint);
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn send_event(&self, name: &str, payload: Value) -> bool {
        self.connection.send_event(name, payload)
    }

    pub fn is_closed(&self) -> bool {
        self.inputs.is_closed()
    }

    /// Cancels any pending reconnect, drops this session's subscriptions,
    /// closes the link and stops the reducer.
    pub fn shutdown(&self) {
        self.connection.cancel_reconnect();
        for kind in SignalKind::all() {
            self.connection.off(kind, &self.forwarder);
        }
        self.connection.disconnect();
        let _ = self.inputs.send(SessionInput::Stop);
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionInput,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.inputs
            .send(build(reply))
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }
}

struct Reducer {
    store: CallStore,
    inputs: mpsc::UnboundedSender<SessionInput>,
    // Latest highlight token and its expiry timer, per call.
    highlights: HashMap<CallId, (u64, JoinHandle<()>)>,
    next_token: u64,
    window: Duration,
    snapshot: watch::Sender<Snapshot>,
}

impl Reducer {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<SessionInput>) {
        while let Some(input) = inputs.recv().await {
            let changed = match input {
                SessionInput::Stop => break,
                SessionInput::Signal(signal) => self.on_signal(signal),
                SessionInput::Remove { id, reply } => {
                    let removed = self.store.remove(id);
                    let changed = removed.is_some();
                    debug!(target: "calldesk::session", id, changed, "remove");
                    let _ = reply.send(removed);
                    changed
                }
                SessionInput::Patch { id, patch, reply } => {
                    let raises_highlight = patch.is_new == Some(true);
                    let result = self.store.patch(id, patch);
                    let changed = matches!(result, Ok(true));
                    if changed && raises_highlight {
                        self.highlight(id);
                    }
                    debug!(target: "calldesk::session", id, changed, "patch");
                    let _ = reply.send(result);
                    changed
                }
                SessionInput::Append { record, reply } => {
                    let raises_highlight = record.is_new;
                    let id = self.store.append(record);
                    if raises_highlight {
                        self.highlight(id);
                    }
                    debug!(target: "calldesk::session", id, "append");
                    let _ = reply.send(id);
                    true
                }
                SessionInput::ExpireHighlight { id, token } => self.expire(id, token),
            };
            if changed {
                self.snapshot
                    .send_replace(Arc::new(self.store.calls().to_vec()));
            }
        }

        for (_, (_, timer)) in self.highlights.drain() {
            timer.abort();
        }
        debug!(target: "calldesk::session", "reducer stopped");
    }

    fn on_signal(&mut self, signal: Signal) -> bool {
        match signal {
            Signal::Connected => {
                info!(target: "calldesk::session", calls = self.store.len(), "live updates connected");
                false
            }
            Signal::Disconnected => {
                info!(target: "calldesk::session", calls = self.store.len(), "live updates offline");
                false
            }
            Signal::Event(event) => {
                let kind = event.kind();
                let outcome = self.store.apply(&event);
                debug!(target: "calldesk::session", %kind, ?outcome, "event reduced");
                if let Some(id) = outcome.highlighted() {
                    self.highlight(id);
                }
                outcome.changed()
            }
        }
    }

    fn highlight(&mut self, id: CallId) {
        self.next_token += 1;
        let token = self.next_token;
        let inputs = self.inputs.clone();
        let window = self.window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = inputs.send(SessionInput::ExpireHighlight { id, token });
        });
        if let Some((_, previous)) = self.highlights.insert(id, (token, timer)) {
            previous.abort();
        }
    }

    fn expire(&mut self, id: CallId, token: u64) -> bool {
        match self.highlights.get(&id) {
            Some((current, _)) if *current == token => {
                self.highlights.remove(&id);
                self.store.clear_new(id)
            }
            _ => false,
        }
    }
}

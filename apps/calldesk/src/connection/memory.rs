use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::link::{ConnectError, Connector, Link, LinkPeer};

/// In-process connector. Each accepted attempt hands its [`LinkPeer`] to the
/// receiver returned by [`MemoryConnector::new`], so a test can play backend.
pub struct MemoryConnector {
    inner: Mutex<MemoryState>,
    peers: mpsc::UnboundedSender<LinkPeer>,
}

#[derive(Default)]
struct MemoryState {
    script: VecDeque<bool>,
    refuse_by_default: bool,
    attempts: Vec<(String, Instant)>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<LinkPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            inner: Mutex::new(MemoryState::default()),
            peers,
        });
        (connector, rx)
    }

    /// Queues outcomes for the next attempts; `true` accepts, `false` refuses.
    pub fn script(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.inner.lock().script.extend(outcomes);
    }

    /// Outcome once the script is exhausted.
    pub fn refuse_all(&self, refuse: bool) {
        self.inner.lock().refuse_by_default = refuse;
    }

    pub fn attempt_count(&self) -> usize {
        self.inner.lock().attempts.len()
    }

    /// Instants at which each attempt was made, oldest first.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.inner.lock().attempts.iter().map(|(_, at)| *at).collect()
    }

    pub fn attempted_urls(&self) -> Vec<String> {
        self.inner
            .lock()
            .attempts
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Link, ConnectError> {
        let accept = {
            let mut state = self.inner.lock();
            state.attempts.push((url.to_string(), Instant::now()));
            let default = !state.refuse_by_default;
            state.script.pop_front().unwrap_or(default)
        };
        if !accept {
            return Err(ConnectError::Refused(url.to_string()));
        }
        let (link, peer) = Link::pair();
        if self.peers.send(peer).is_err() {
            return Err(ConnectError::Refused(url.to_string()));
        }
        Ok(link)
    }
}

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("websocket handshake with {url} failed: {source}")]
    Handshake {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("connection to {0} refused")]
    Refused(String),
}

/// An open text link to the backend.
///
/// The link is closed once `inbound` yields `None`. Dropping every clone of
/// `outbound` asks the far side to close.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// The backend's side of a [`Link`] built with [`Link::pair`].
#[derive(Debug)]
pub struct LinkPeer {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl Link {
    /// In-memory link plus the peer that drives it.
    pub fn pair() -> (Link, LinkPeer) {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        (
            Link { outbound, inbound },
            LinkPeer {
                to_client,
                from_client,
            },
        )
    }
}

impl LinkPeer {
    /// Pushes one raw frame to the client. Returns false once the client is gone.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(frame.into()).is_ok()
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, ConnectError>;
}

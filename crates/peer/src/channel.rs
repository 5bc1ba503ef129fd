//! Peer channels.
//!
//! A [`Connection`] is a bidirectional, ordered, best-effort frame channel
//! between two identities. Transports ([`PeerTransport`]) establish
//! connections; everything above them only sees frames. Dropping either
//! half's sender closes that direction, which the other side observes as
//! `recv() == None`.
//!
//! [`LoopbackNetwork`] is an in-process rendezvous: listeners register under
//! an identity and connecting peers are handed a fresh connection pair.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{CHANNEL_CAPACITY, PeerError};

/// One encoded protocol message.
pub type Frame = Vec<u8>;

// ============================================================================
// Connection
// ============================================================================

/// An open channel to a remote identity.
#[derive(Debug)]
pub struct Connection {
    remote: String,
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
}

impl Connection {
    /// Two connected endpoints: the first talks to `b`, the second to `a`.
    pub fn pair(a: &str, b: &str, capacity: usize) -> (Connection, Connection) {
        let (a_to_b, b_inbox) = mpsc::channel(capacity);
        let (b_to_a, a_inbox) = mpsc::channel(capacity);
        (
            Connection {
                remote: b.to_string(),
                tx: a_to_b,
                rx: a_inbox,
            },
            Connection {
                remote: a.to_string(),
                tx: b_to_a,
                rx: b_inbox,
            },
        )
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Split into independently owned send and receive halves.
    pub fn split(self) -> (ConnSender, ConnReceiver) {
        (ConnSender { tx: self.tx }, ConnReceiver { rx: self.rx })
    }
}

/// Sending half of a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnSender {
    tx: mpsc::Sender<Frame>,
}

impl ConnSender {
    /// Send, waiting for buffer space. Returns `false` if the channel closed.
    pub async fn send(&self, frame: Frame) -> bool {
        self.tx.send(frame).await.is_ok()
    }

    /// Send without waiting. A full buffer drops the frame; there is no retry.
    pub fn try_send(&self, frame: Frame) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

/// Receiving half of a [`Connection`].
#[derive(Debug)]
pub struct ConnReceiver {
    rx: mpsc::Receiver<Frame>,
}

impl ConnReceiver {
    /// Next frame, or `None` once the remote side has closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

// ============================================================================
// Listener & Transport
// ============================================================================

/// Incoming connections for one registered identity. Dropping the listener
/// releases the identity.
pub struct Listener {
    identity: String,
    incoming: mpsc::Receiver<Connection>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Listener {
    pub fn new(
        identity: impl Into<String>,
        incoming: mpsc::Receiver<Connection>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            identity: identity.into(),
            incoming,
            release: Some(Box::new(release)),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Next incoming connection, or `None` once the transport is gone.
    pub async fn accept(&mut self) -> Option<Connection> {
        self.incoming.recv().await
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Rendezvous and connection establishment.
pub trait PeerTransport: Send + Sync + 'static {
    /// Register `identity` and accept connections addressed to it.
    fn listen(&self, identity: &str) -> Result<Listener, PeerError>;

    /// Open a connection from `local` to the peer listening as `remote`.
    fn connect(
        &self,
        local: &str,
        remote: &str,
    ) -> impl Future<Output = Result<Connection, PeerError>> + Send;
}

// ============================================================================
// Loopback
// ============================================================================

/// In-process transport. Clones share one rendezvous table.
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    listeners: Arc<Mutex<HashMap<String, mpsc::Sender<Connection>>>>,
    capacity: usize,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl LoopbackNetwork {
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }
}

impl PeerTransport for LoopbackNetwork {
    fn listen(&self, identity: &str) -> Result<Listener, PeerError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        {
            let mut listeners = self.listeners.lock();
            if listeners.get(identity).is_some_and(|tx| !tx.is_closed()) {
                return Err(PeerError::IdentityTaken(identity.to_string()));
            }
            listeners.insert(identity.to_string(), tx.clone());
        }
        debug!(identity, "listening");

        let table = Arc::clone(&self.listeners);
        let owned = identity.to_string();
        Ok(Listener::new(identity, rx, move || {
            let mut listeners = table.lock();
            if listeners.get(&owned).is_some_and(|current| current.same_channel(&tx)) {
                listeners.remove(&owned);
            }
        }))
    }

    fn connect(
        &self,
        local: &str,
        remote: &str,
    ) -> impl Future<Output = Result<Connection, PeerError>> + Send {
        let listener = self.listeners.lock().get(remote).cloned();
        let (ours, theirs) = Connection::pair(local, remote, self.capacity);
        let remote = remote.to_string();

        async move {
            let Some(listener) = listener else {
                return Err(PeerError::Unreachable(remote));
            };
            if listener.send(theirs).await.is_err() {
                return Err(PeerError::Unreachable(remote));
            }
            debug!(remote = %remote, "connected");
            Ok(ours)
        }
    }
}

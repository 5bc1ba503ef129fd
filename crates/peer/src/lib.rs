//! Hide-and-Seek Peer Runtime
//!
//! Drives a [`HostSession`](hideseek_session::HostSession) or a
//! [`ClientSession`](hideseek_session::ClientSession) over peer channels on a
//! tokio runtime. Each process runs exactly one event loop; message handling,
//! timer firing and the movement tick all happen on that loop and never
//! interleave mid-mutation.
//!
//! # Layout
//!
//! - [`channel`]: the peer-channel abstraction and an in-process loopback
//!   rendezvous
//! - [`input`]: per-tick movement intent sources
//! - [`host`]: the host event loop
//! - [`client`]: the client event loop
//!
//! Renderers observe a session through a `watch` channel of
//! [`SessionView`](hideseek_session::SessionView) values and never mutate it.

#![deny(unsafe_code)]

pub mod channel;
pub mod client;
pub mod host;
pub mod input;

use std::time::Duration;

use hideseek_session::SessionError;

pub use channel::{Connection, Listener, LoopbackNetwork, PeerTransport};
pub use client::{ClientHandle, spawn_client};
pub use host::{HostHandle, spawn_host};
pub use input::{HeldInput, Idle, IntentSource, Wander};

// ============================================================================
// Runtime Parameters
// ============================================================================

/// Movement tick rate in Hz.
pub const TICK_RATE_HZ: u32 = 60;

/// Per-direction frame buffer of a peer channel.
pub const CHANNEL_CAPACITY: usize = 256;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub tick_rate_hz: u32,
    pub channel_capacity: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: TICK_RATE_HZ,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl PeerConfig {
    /// Time between movement ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures reported to the user of a peer.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Nobody is listening under the identity; the session was not entered.
    #[error("peer {0} is unreachable")]
    Unreachable(String),

    #[error("identity {0} is already in use")]
    IdentityTaken(String),

    /// The host closed the connection without admitting us, for example
    /// because its game has ended. The session was not entered.
    #[error("host {0} refused the connection")]
    Refused(String),

    /// The connection to the host closed. Fatal for a client session.
    #[error("lost connection to the host")]
    HostLost,

    /// The peer's event loop is no longer running.
    #[error("peer task has stopped")]
    Stopped,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Current instant on the runtime clock, as the session core expects it.
///
/// Taken from tokio so that paused-time tests drive the session timers.
pub(crate) fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

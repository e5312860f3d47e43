//! Events delivered from I/O tasks into the control loop.
//!
//! Both the stream client and the discovery listener run on their own
//! tasks and report everything through one mpsc channel. Every event is
//! tagged with the generation of the instance that produced it so the
//! control loop can drop stragglers from a superseded instance: stop is
//! asynchronous and a stale terminal event may arrive after its
//! replacement is already up.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::decode::PixelBuffer;

// ── InstanceId ───────────────────────────────────────────────────

/// Generation tag for a spawned I/O instance (stream client or
/// discovery listener). Monotonic per process, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

impl InstanceId {
    pub fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Anything an I/O task can tell the control loop.
#[derive(Debug)]
pub enum Event {
    Discovery {
        instance: InstanceId,
        kind: DiscoveryEvent,
    },
    Client {
        instance: InstanceId,
        kind: ClientEvent,
    },
    /// A delayed-restart timer fired. Stale timers from a superseded
    /// cycle are filtered by instance like any other event.
    Retry { instance: InstanceId },
}

/// Outcomes of the beacon listener.
#[derive(Debug)]
pub enum DiscoveryEvent {
    /// A beacon arrived; connect to this address.
    AddressFound(IpAddr),
    /// No beacon within the wait window. The listener keeps waiting.
    Timeout,
    /// The listener itself is unhealthy (e.g. no network interface).
    /// It retries internally; this is a status report, not a terminal.
    Failure(String),
}

/// Lifecycle of one stream client instance.
#[derive(Debug)]
pub enum ClientEvent {
    /// TCP established; no session exists yet.
    Connected,
    /// The raw intro-header block, exactly once, before any image.
    HandshakeReceived(Bytes),
    /// A selected window's frame decoded successfully.
    WindowImage { window_id: u8, pixels: PixelBuffer },
    /// Terminal; emitted exactly once per instance. `reason` is a
    /// human-readable protocol violation, or `None` for plain loss.
    Disconnected { reason: Option<String> },
}

/// Sender half used by every I/O task.
pub type EventSender = mpsc::Sender<Event>;

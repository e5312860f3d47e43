//! Connection lifecycle state.
//!
//! Exactly one phase is active at a time, owned exclusively by the
//! [`ConnectionManager`](crate::manager::ConnectionManager) control loop.
//!
//! ```text
//!  Idle ──► Discovering ──► Connecting ──► AwaitingHandshake ──► Streaming
//!               ▲    (manual address skips discovery)   │            │
//!               │                                       ▼            ▼
//!               └───────────────────────────────── Disconnected ◄────┘
//! ```
//!
//! Failures never park the machine for good: any error tears the
//! connection down and re-enters `Discovering` or `Connecting`. The
//! machine rests in `Disconnected` only during a shutdown, or while a
//! delayed-retry timer runs after a failed manual-address resolve.

/// The current phase of the plugin connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// Nothing started yet. Initial state only.
    #[default]
    Idle,

    /// Listening for the beacon broadcast that names the peer.
    Discovering,

    /// TCP connection initiated but not yet established.
    Connecting,

    /// TCP link is up; waiting for the intro header.
    AwaitingHandshake,

    /// Intro header accepted; window images are flowing.
    Streaming,

    /// Torn down with nothing running: shutdown in progress, or a
    /// delayed retry armed after a failed manual-address resolve.
    Disconnected,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Discovering => write!(f, "Discovering"),
            Self::Connecting => write!(f, "Connecting"),
            Self::AwaitingHandshake => write!(f, "AwaitingHandshake"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl ConnectionPhase {
    /// Window images are expected in this phase and no other.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// A stream client instance should exist in these phases.
    pub fn has_client(&self) -> bool {
        matches!(self, Self::Connecting | Self::AwaitingHandshake | Self::Streaming)
    }

    /// Terminal or not-yet-started.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_idle() {
        assert_eq!(ConnectionPhase::default(), ConnectionPhase::Idle);
        assert!(ConnectionPhase::default().is_stopped());
    }

    #[test]
    fn client_exists_in_connected_phases() {
        assert!(!ConnectionPhase::Discovering.has_client());
        assert!(ConnectionPhase::Connecting.has_client());
        assert!(ConnectionPhase::AwaitingHandshake.has_client());
        assert!(ConnectionPhase::Streaming.has_client());
        assert!(!ConnectionPhase::Disconnected.has_client());
    }

    #[test]
    fn display_format() {
        assert_eq!(ConnectionPhase::Discovering.to_string(), "Discovering");
        assert_eq!(
            ConnectionPhase::AwaitingHandshake.to_string(),
            "AwaitingHandshake"
        );
    }
}

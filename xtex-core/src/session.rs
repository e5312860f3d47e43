//! Per-connection session state and window selection.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::protocol::handshake::{Handshake, WindowDescriptor};

// ── PeerSession ──────────────────────────────────────────────────

/// Everything learned from one intro header.
///
/// Replaced wholesale on every new handshake and dropped when the
/// connection does; a session exists if and only if we are streaming.
#[derive(Debug, Clone)]
pub struct PeerSession {
    pub address: IpAddr,
    pub port: u16,
    pub aircraft: String,
    pub texture_size: (u32, u32),
    /// Window sequence in wire order; a frame's window id indexes this.
    pub windows: Vec<WindowDescriptor>,
    pub protocol_version: String,
}

impl PeerSession {
    pub fn new(address: IpAddr, port: u16, handshake: Handshake) -> Self {
        Self {
            address,
            port,
            aircraft: handshake.aircraft,
            texture_size: (handshake.texture_width, handshake.texture_height),
            windows: handshake.windows,
            protocol_version: handshake.version,
        }
    }

    /// Window names in wire order, for UI-driven selection changes.
    pub fn window_names(&self) -> Vec<String> {
        self.windows.iter().map(|w| w.name.clone()).collect()
    }
}

// ── Selection ────────────────────────────────────────────────────

/// The two consumer-chosen window indices whose frames get decoded.
///
/// Indices are positions into the current session's window sequence and
/// survive reconnects; they are re-clamped against every new handshake
/// rather than reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub slot_a: usize,
    pub slot_b: usize,
}

impl Default for Selection {
    fn default() -> Self {
        Self { slot_a: 0, slot_b: 1 }
    }
}

impl Selection {
    /// Clamp both slots into `0..window_count`.
    ///
    /// An out-of-range slot A falls back to 0; an out-of-range slot B
    /// falls back to 1 when at least two windows exist, else 0.
    pub fn clamped(self, window_count: usize) -> Self {
        let slot_a = if self.slot_a < window_count { self.slot_a } else { 0 };
        let slot_b = if self.slot_b < window_count {
            self.slot_b
        } else if window_count > 1 {
            1
        } else {
            0
        };
        Self { slot_a, slot_b }
    }

    /// Whether a frame for `window_id` is currently of interest.
    pub fn matches(&self, window_id: u8) -> bool {
        let id = window_id as usize;
        self.slot_a == id || self.slot_b == id
    }
}

// ── SharedSelection ──────────────────────────────────────────────

/// Cross-task view of the selection.
///
/// The control loop writes it, the stream client's read loop queries it
/// fresh for every incoming frame. Two relaxed atomics are enough: the
/// slots are independent and a frame racing a selection change may be
/// decoded or skipped either way.
#[derive(Debug, Clone)]
pub struct SharedSelection {
    inner: Arc<Slots>,
}

#[derive(Debug)]
struct Slots {
    a: AtomicUsize,
    b: AtomicUsize,
}

impl SharedSelection {
    pub fn new(selection: Selection) -> Self {
        Self {
            inner: Arc::new(Slots {
                a: AtomicUsize::new(selection.slot_a),
                b: AtomicUsize::new(selection.slot_b),
            }),
        }
    }

    pub fn get(&self) -> Selection {
        Selection {
            slot_a: self.inner.a.load(Ordering::Relaxed),
            slot_b: self.inner.b.load(Ordering::Relaxed),
        }
    }

    pub fn set(&self, selection: Selection) {
        self.inner.a.store(selection.slot_a, Ordering::Relaxed);
        self.inner.b.store(selection.slot_b, Ordering::Relaxed);
    }
}

impl Default for SharedSelection {
    fn default() -> Self {
        Self::new(Selection::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_slots_survive_reclamp() {
        let sel = Selection { slot_a: 2, slot_b: 0 };
        assert_eq!(sel.clamped(3), sel);
    }

    #[test]
    fn out_of_range_slots_fall_back() {
        let sel = Selection { slot_a: 7, slot_b: 9 };
        assert_eq!(sel.clamped(3), Selection { slot_a: 0, slot_b: 1 });
    }

    #[test]
    fn single_window_session_clamps_both_to_zero() {
        let sel = Selection { slot_a: 2, slot_b: 5 };
        assert_eq!(sel.clamped(1), Selection { slot_a: 0, slot_b: 0 });
    }

    #[test]
    fn slot_b_keeps_its_value_when_in_range() {
        let sel = Selection { slot_a: 9, slot_b: 2 };
        assert_eq!(sel.clamped(3), Selection { slot_a: 0, slot_b: 2 });
    }

    #[test]
    fn matches_either_slot() {
        let sel = Selection { slot_a: 0, slot_b: 2 };
        assert!(sel.matches(0));
        assert!(!sel.matches(1));
        assert!(sel.matches(2));
        assert!(!sel.matches(3));
    }

    #[test]
    fn shared_selection_roundtrip() {
        let shared = SharedSelection::default();
        assert_eq!(shared.get(), Selection { slot_a: 0, slot_b: 1 });

        let other = shared.clone();
        other.set(Selection { slot_a: 3, slot_b: 4 });
        assert_eq!(shared.get(), Selection { slot_a: 3, slot_b: 4 });
    }
}

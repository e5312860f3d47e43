//! # xtex-core
//!
//! Client library for the XTextureExtractor cockpit texture stream.
//!
//! This crate contains:
//! - **Protocol**: intro-header and image-record parsing, wire constants
//! - **Session**: `PeerSession`, window descriptors, selection slots
//! - **Client**: `StreamClient`, the TCP read loop with event emission
//! - **Manager**: `ConnectionManager`, the discovery/connect/retry state machine
//! - **Discovery**: the collaborator interface for beacon listeners
//! - **Decode**: the image-codec seam with a PNG implementation
//! - **Error**: `XtexError`, the typed `thiserror`-based error hierarchy

pub mod client;
pub mod decode;
pub mod discovery;
pub mod error;
pub mod event;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::StreamClient;
pub use decode::{ImageDecoder, PixelBuffer, PngDecoder};
pub use discovery::{DiscoveryHandle, DiscoverySpawner};
pub use error::XtexError;
pub use event::{ClientEvent, DiscoveryEvent, Event, EventSender, InstanceId};
pub use manager::{Command, ConnectionManager, ManagerConfig, Notification, Slot};
pub use protocol::{
    BECN_GROUP, BECN_PORT, Handshake, INTRO_HEADER_LEN, PLUGIN_PORT, PLUGIN_VERSION,
    WindowDescriptor,
};
pub use session::{PeerSession, Selection, SharedSelection};
pub use state::ConnectionPhase;

//! Wire protocol for the XTextureExtractor plugin stream.
//!
//! A connection carries one fixed-size text intro header followed by an
//! endless sequence of per-window image records:
//!
//! ```text
//! ┌────────────────────┬──────────────────────────────────────────┐
//! │ intro header       │ 4096 bytes, NUL-terminated ASCII text    │
//! ├────────────────────┼──────────────────────────────────────────┤
//! │ frame marker       │ 8 bytes  `!` `_` `_` `_` `_` `_` id `_`  │
//! │ payload length     │ 4 bytes  u32 little-endian               │
//! │ trailer            │ 4 bytes  `_` `_` `_` `_`                 │
//! │ payload            │ <length> bytes of PNG data               │
//! │ padding            │ 1..=1024 NUL bytes to the next 1024      │
//! └────────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Everything in this module is pure byte-buffer parsing; no I/O.

pub mod frame;
pub mod handshake;

pub use frame::{FRAME_HEADER_LEN, LENGTH_FIELD_LEN, TRAILER_LEN, padding_after};
pub use handshake::{Handshake, WindowDescriptor};

/// TCP port the plugin listens on.
pub const PLUGIN_PORT: u16 = 52500;

/// Size of the intro header block sent once per connection.
pub const INTRO_HEADER_LEN: usize = 4096;

/// Protocol version string; compared for exact equality.
pub const PLUGIN_VERSION: &str = "XTEv3";

/// Each image record is padded to a multiple of this.
pub const FRAME_ALIGN: usize = 1024;

/// Sanity ceiling on a single payload. The plugin sends PNG snapshots of
/// panel sub-textures; anything near this size is a corrupted stream.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// X-Plane beacon (BECN) multicast group used for discovery.
pub const BECN_GROUP: std::net::Ipv4Addr = std::net::Ipv4Addr::new(239, 255, 1, 1);

/// X-Plane beacon port.
pub const BECN_PORT: u16 = 49707;

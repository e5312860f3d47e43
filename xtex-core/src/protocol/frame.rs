//! Per-window image record framing.
//!
//! Every record starts with an 8-byte marker whose only variable byte is
//! the window id, followed by a little-endian length and a 4-byte trailer.
//! The marker bytes are checked individually so a parse failure can name
//! the exact offending byte, which is the only diagnostic available when
//! the stream desynchronises.

use crate::error::XtexError;
use crate::protocol::FRAME_ALIGN;

/// Frame marker size on the wire: `!` + five `_` + window id + `_`.
pub const FRAME_HEADER_LEN: usize = 8;

/// Payload length field size (u32 little-endian).
pub const LENGTH_FIELD_LEN: usize = 4;

/// Trailer size (four `_` bytes).
pub const TRAILER_LEN: usize = 4;

/// Parse the 8-byte frame marker, returning the window id.
///
/// The id is a raw unsigned byte (0–255); every other byte is fixed and
/// any mismatch is a protocol violation, not an I/O failure.
pub fn parse_frame_header(buf: &[u8; FRAME_HEADER_LEN]) -> Result<u8, XtexError> {
    let window_id = buf[6];
    let fixed_ok = buf[0] == b'!'
        && buf[1] == b'_'
        && buf[2] == b'_'
        && buf[3] == b'_'
        && buf[4] == b'_'
        && buf[5] == b'_'
        && buf[7] == b'_';
    if !fixed_ok {
        return Err(XtexError::FrameHeader(format!(
            "![{}] _[{}] _[{}] _[{}] _[{}] _[{}] W[{}] _[{}]",
            buf[0] as char,
            buf[1] as char,
            buf[2] as char,
            buf[3] as char,
            buf[4] as char,
            buf[5] as char,
            window_id,
            buf[7] as char,
        )));
    }
    Ok(window_id)
}

/// Decode the payload length field. Cannot fail; bounds are the
/// stream client's concern.
pub fn parse_payload_len(buf: &[u8; LENGTH_FIELD_LEN]) -> u32 {
    u32::from_le_bytes(*buf)
}

/// Validate the 4-byte trailer that follows the length field.
pub fn check_trailer(buf: &[u8; TRAILER_LEN]) -> Result<(), XtexError> {
    if buf != b"____" {
        return Err(XtexError::FrameTrailer(format!(
            "_[{}] _[{}] _[{}] _[{}]",
            buf[0] as char, buf[1] as char, buf[2] as char, buf[3] as char,
        )));
    }
    Ok(())
}

/// Padding bytes to skip after the payload.
///
/// Always 1..=1024: a payload that is already a multiple of 1024 is
/// followed by a full extra block of padding. That is how the plugin
/// writes the stream; do not "fix" it without breaking every peer.
pub fn padding_after(payload_len: usize) -> usize {
    FRAME_ALIGN - (payload_len % FRAME_ALIGN)
}

// ── Tests ────────────────────────────────────────────────────────

//! Domain-specific error types for the XTextureExtractor client.
//!
//! All fallible operations return `Result<T, XtexError>`.
//! No panics on invalid input; every error is typed and recoverable
//! (recovery is always "tear down and reconnect", never "resume").

use thiserror::Error;

/// The canonical error type for the texture stream client.
#[derive(Debug, Error)]
pub enum XtexError {
    // ── Discovery Errors ─────────────────────────────────────────
    /// No beacon broadcast arrived within the listener's wait window.
    #[error("timed out waiting for beacon broadcast")]
    DiscoveryTimeout,

    /// The beacon listener itself failed (e.g. no usable interface).
    #[error("beacon listener failed: {0}")]
    DiscoveryFailure(String),

    // ── Connection Errors ────────────────────────────────────────
    /// Opening the TCP connection to the plugin failed.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The stream closed or errored with no structural cause.
    #[error("connection lost")]
    ConnectionLost,

    // ── Handshake Errors ─────────────────────────────────────────
    /// The stream ended before the full intro header arrived.
    #[error("failed to read intro header")]
    HandshakeRead,

    /// The intro header text could not be parsed.
    #[error("invalid intro header: {0}")]
    HandshakeParse(String),

    /// The plugin speaks a different protocol version.
    #[error("version [{actual}] is not expected [{expected}]")]
    VersionMismatch {
        expected: &'static str,
        actual: String,
    },

    // ── Frame Errors ─────────────────────────────────────────────
    /// The 8-byte frame marker did not match `!_____<id>_`.
    #[error("image header invalid {0}")]
    FrameHeader(String),

    /// The 4-byte trailer after the length field was not `____`.
    #[error("image second header invalid {0}")]
    FrameTrailer(String),

    /// The declared payload length exceeds the sanity ceiling.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload bytes were not a decodable image.
    #[error("payload decode failure: {0}")]
    PayloadDecode(String),

    // ── Plumbing Errors ──────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

impl XtexError {
    /// Human-readable disconnect reason, but only for protocol-level
    /// failures. Plain connection loss carries no reason so the caller
    /// can tell "the peer broke the rules" apart from "the link died".
    pub fn disconnect_reason(&self) -> Option<String> {
        match self {
            Self::FrameHeader(_)
            | Self::FrameTrailer(_)
            | Self::PayloadTooLarge { .. }
            | Self::PayloadDecode(_)
            | Self::HandshakeParse(_)
            | Self::VersionMismatch { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for XtexError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        XtexError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = XtexError::VersionMismatch {
            expected: "XTEv3",
            actual: "XTEv1".into(),
        };
        assert!(e.to_string().contains("XTEv1"));
        assert!(e.to_string().contains("XTEv3"));

        let e = XtexError::PayloadTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn protocol_errors_carry_reasons() {
        assert!(
            XtexError::PayloadDecode("bad png".into())
                .disconnect_reason()
                .is_some()
        );
        assert!(
            XtexError::FrameHeader("![?]".into())
                .disconnect_reason()
                .is_some()
        );
    }

    #[test]
    fn io_errors_carry_no_reason() {
        assert!(XtexError::ConnectionLost.disconnect_reason().is_none());
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        assert!(XtexError::Io(io_err).disconnect_reason().is_none());
        assert!(XtexError::HandshakeRead.disconnect_reason().is_none());
    }
}

//! Intro-header parsing.
//!
//! The first 4096 bytes of every connection are newline-delimited ASCII
//! terminated by a NUL byte:
//!
//! ```text
//! XTEv3 <build info ignored>
//! Boeing 737-800
//! 2048 2048
//! CAP 0 0 512 256
//! FMC 512 0 1024 512
//! __EOF__
//! ```
//!
//! Line 1 carries the protocol version (first token), line 2 the aircraft
//! label, line 3 the texture dimensions, and every following line one
//! window until `__EOF__` or end of text. The version check is separate
//! from parsing: a well-formed header from the wrong plugin build is a
//! [`XtexError::VersionMismatch`], not a parse failure.

use crate::error::XtexError;
use crate::protocol::PLUGIN_VERSION;

/// One named sub-rectangle of the shared panel texture.
///
/// Bounds are texel coordinates within the texture reported on line 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDescriptor {
    pub name: String,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Parsed intro header.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub version: String,
    pub aircraft: String,
    pub texture_width: u32,
    pub texture_height: u32,
    /// Window sequence in wire order; index = window id in later frames.
    pub windows: Vec<WindowDescriptor>,
}

impl Handshake {
    /// Parse the raw intro-header buffer.
    ///
    /// Text after the first NUL byte is ignored. Fails if the three
    /// required lines are missing, any integer fails to parse, or no
    /// window lines are present.
    pub fn parse(raw: &[u8]) -> Result<Self, XtexError> {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let text = std::str::from_utf8(&raw[..end])
            .map_err(|e| XtexError::HandshakeParse(format!("non-ASCII header: {e}")))?;

        let mut lines = text.lines();
        let version = lines
            .next()
            .and_then(|l| l.split_whitespace().next())
            .ok_or_else(|| XtexError::HandshakeParse("missing version line".into()))?
            .to_string();
        let aircraft = lines
            .next()
            .ok_or_else(|| XtexError::HandshakeParse("missing aircraft line".into()))?
            .trim()
            .to_string();
        let texture = lines
            .next()
            .ok_or_else(|| XtexError::HandshakeParse("missing texture size line".into()))?;
        let mut dims = texture.split_whitespace();
        let texture_width = parse_int(dims.next(), "texture width")?;
        let texture_height = parse_int(dims.next(), "texture height")?;

        let mut windows = Vec::new();
        for line in lines {
            if line.contains("__EOF__") {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let name = fields
                .next()
                .ok_or_else(|| XtexError::HandshakeParse("window line missing name".into()))?
                .to_string();
            let left = parse_int(fields.next(), "window left")?;
            let top = parse_int(fields.next(), "window top")?;
            let right = parse_int(fields.next(), "window right")?;
            let bottom = parse_int(fields.next(), "window bottom")?;
            windows.push(WindowDescriptor {
                name,
                left,
                top,
                right,
                bottom,
            });
        }

        if windows.is_empty() {
            return Err(XtexError::HandshakeParse("no valid windows were sent".into()));
        }

        Ok(Self {
            version,
            aircraft,
            texture_width,
            texture_height,
            windows,
        })
    }

    /// Exact-equality version check against the build-time constant.
    pub fn check_version(&self) -> Result<(), XtexError> {
        if self.version != PLUGIN_VERSION {
            return Err(XtexError::VersionMismatch {
                expected: PLUGIN_VERSION,
                actual: self.version.clone(),
            });
        }
        Ok(())
    }
}

fn parse_int<T: std::str::FromStr>(field: Option<&str>, what: &str) -> Result<T, XtexError> {
    field
        .ok_or_else(|| XtexError::HandshakeParse(format!("missing {what}")))?
        .parse()
        .map_err(|_| XtexError::HandshakeParse(format!("invalid {what} [{}]", field.unwrap_or(""))))
}

// ── Tests ────────────────────────────────────────────────────────

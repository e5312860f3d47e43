//! Image payload decoding.
//!
//! The wire carries compressed snapshots; decoding them is a single
//! fallible operation behind a trait so tests can substitute a stub and
//! the stream client never cares about the pixel format details.

use std::fmt;

use crate::error::XtexError;

/// A decoded frame: tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// `width * height * 4` bytes, row-major.
    pub data: Vec<u8>,
}

impl fmt::Display for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} rgba ({} bytes)", self.width, self.height, self.data.len())
    }
}

/// Decodes one payload into pixels, or fails.
///
/// A decode failure is fatal to the connection: the stream may be
/// desynchronised, so the caller tears everything down and reconnects.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, XtexError>;
}

/// Production decoder for the PNG payloads the plugin sends.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngDecoder;

impl ImageDecoder for PngDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, XtexError> {
        let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|e| XtexError::PayloadDecode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = (rgba.width(), rgba.height());
        Ok(PixelBuffer {
            width,
            height,
            data: rgba.into_raw(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_real_png() {
        // 2x1 image, pixels (255,0,0,255) and (0,0,255,255).
        let mut png = Vec::new();
        {
            use image::{ImageBuffer, Rgba};
            let img: ImageBuffer<Rgba<u8>, _> = ImageBuffer::from_fn(2, 1, |x, _| {
                if x == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) }
            });
            img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
                .unwrap();
        }

        let buf = PngDecoder.decode(&png).unwrap();
        assert_eq!((buf.width, buf.height), (2, 1));
        assert_eq!(buf.data, vec![255, 0, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn garbage_fails_with_decode_error() {
        let err = PngDecoder.decode(b"not a png at all").unwrap_err();
        assert!(matches!(err, XtexError::PayloadDecode(_)));
    }
}

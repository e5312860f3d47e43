//! Viewer-side support for the XTextureExtractor client: the TOML
//! settings store and the BECN beacon listener.

pub mod config;
pub mod discovery;

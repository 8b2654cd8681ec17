//! Error types for the Orb renderer

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrbError {
    /// The offscreen raster surface could not be created. Fatal at construction.
    #[error("rendering surface unavailable ({width}x{height})")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("engine configured with zero particles")]
    NoParticles,

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot failed: {0}")]
    Snapshot(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, OrbError>;

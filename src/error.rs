use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the acquisition pipeline.
#[derive(Debug, Error)]
pub enum DaqError {
    #[error("cannot open device {port}: {reason}")]
    Connection { port: String, reason: String },

    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no recording session is active")]
    NotRecording,

    #[error("a writer is already open for {}", .0.display())]
    AlreadyOpen(PathBuf),

    #[error("invalid filter band {low_hz}-{high_hz} Hz at {sample_rate} Hz (need 0 < low < high < Nyquist)")]
    InvalidFilterConfig {
        low_hz: f64,
        high_hz: f64,
        sample_rate: f64,
    },

    #[error("write to {} failed: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed container file: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaqError>;

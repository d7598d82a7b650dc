//! Errors of the tracer and of snapshot processing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TracerError {
    #[error("the tracer must be started before taking a snapshot")]
    NotTracing,

    #[error("traceback limit must be in 1..={max}, got {got}")]
    InvalidFrameLimit { got: usize, max: usize },

    #[error("cannot load debug info from {0}")]
    SymbolizationFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("cumulative mode cannot be used with the traceback key type")]
    CumulativeTraceback,

    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

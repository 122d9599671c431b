//! # Error types

use std::path::PathBuf;

/// Result type used throughout the occupancy pipeline.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reasons a log refuses further appends.
#[derive(thiserror::Error, Debug)]
pub enum LogWriteError {
    #[error("log at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },
    #[error("log at {path} was poisoned by an earlier failed append")]
    Poisoned { path: PathBuf },
    #[error("i/o error on log at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error on log at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Occupancy pipeline errors.
///
/// Configuration errors (`InvalidGridConfig`, `InvalidChannelMode`) and stream errors
/// (`InsufficientFrames`, `DimensionMismatch`) are fatal. `CellClassification` only aborts the
/// current frame cycle; the driver's `CyclePolicy` decides what happens next.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid grid configuration: {0}")]
    InvalidGridConfig(String),
    #[error("invalid channel mode `{0}`")]
    InvalidChannelMode(String),
    #[error("frame dimensions differ: {expected:?} vs {found:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("at least two frames are needed, got {0}")]
    InsufficientFrames(usize),
    #[error("failed to classify cell ({row}, {col}): {reason}")]
    CellClassification {
        row: usize,
        col: usize,
        reason: String,
    },
    #[error(transparent)]
    LogWrite(#[from] LogWriteError),
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

impl Error {
    /// Whether the error only invalidates the current frame cycle.
    pub fn is_per_cycle(&self) -> bool {
        matches!(self, Self::CellClassification { .. })
    }
}

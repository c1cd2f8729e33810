use std::io;
use thiserror::Error;

pub type EcgResult<T> = Result<T, EcgError>;

/// Failure modes across conditioning, detection, extraction and acquisition.
#[derive(Debug, Error)]
pub enum EcgError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{stage} needs at least {required} samples, got {actual}")]
    InsufficientData {
        stage: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("need at least 3 R-peaks for interval features, found {found}")]
    NoPeaksDetected { found: usize },

    #[error("signal has zero variance")]
    DegenerateSignal,

    #[error("line {line} is not a sample: {content:?}")]
    MalformedSample { line: usize, content: String },

    #[error("beat segment [{start}, {end}) runs outside signal of length {len}")]
    SegmentOutOfBounds { start: isize, end: usize, len: usize },

    #[error("empty {wave} search window")]
    EmptySearchWindow { wave: &'static str },

    #[error("non-finite {field} feature")]
    NonFiniteFeature { field: &'static str },

    #[error("stream ended after {collected} of {expected} samples")]
    Disconnected { collected: usize, expected: usize },

    #[error("acquisition cancelled after {collected} samples")]
    Cancelled { collected: usize },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl EcgError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EcgError::InvalidParameter(msg.into())
    }

    /// True for errors that only affect a single beat during extraction.
    pub fn is_per_beat(&self) -> bool {
        matches!(
            self,
            EcgError::SegmentOutOfBounds { .. }
                | EcgError::EmptySearchWindow { .. }
                | EcgError::NonFiniteFeature { .. }
        )
    }
}

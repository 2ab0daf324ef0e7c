//! Error taxonomy for the chunking-and-dispatch engine.
//!
//! Public operations return [`anyhow::Result`]. Failures raised by the engine
//! itself are [`ApplyError`] values wrapped in an [`anyhow::Error`], so callers can
//! `downcast_ref::<ApplyError>()` to tell them apart from errors produced by the
//! user's function, which are passed through untouched.

use thiserror::Error;

/// Errors raised by the engine (as opposed to the applied function).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// An axis value other than `0`/`1`/`"index"`/`"columns"`.
    #[error("No axis named {0:?}; expected 0, 1, \"index\" or \"columns\"")]
    InvalidAxis(String),

    /// A one-dimensional input was asked to apply along columns.
    #[error("Passing axis=1 is not allowed for a one-dimensional input")]
    SeriesAxis,

    /// Settings that cannot drive a plan (e.g. a zero unit size).
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The caller cancelled result collection.
    #[error("apply cancelled before all units completed")]
    Cancelled,

    /// A unit panicked inside a worker; the payload message is preserved.
    #[error("worker panicked while processing unit {index}: {message}")]
    WorkerPanicked { index: usize, message: String },

    /// Partial results could not be stitched back together.
    #[error("cannot reassemble results: {0}")]
    Shape(String),
}

impl ApplyError {
    /// True for errors raised before any unit was dispatched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ApplyError::InvalidAxis(_) | ApplyError::SeriesAxis | ApplyError::InvalidSettings(_)
        )
    }
}

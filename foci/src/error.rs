//! Error types for a FindFoci run.

use thiserror::Error;

/// Reasons a run produced no result. Callers must not display partial output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Run interrupted")]
    Interrupted,

    #[error("Too many candidate maxima: search capacity of {capacity} exceeded")]
    SearchCapacityExceeded { capacity: usize },

    #[error("Cannot build a 16-bit mask for {peaks} peaks (capacity {capacity})")]
    MaskCapacityExceeded { peaks: usize, capacity: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

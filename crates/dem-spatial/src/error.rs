//! Error types for spatial operations.

use thiserror::Error;

/// Errors that can occur in spatial partition operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpatialError {
    /// Invalid cell size (must be positive and finite).
    #[error("invalid cell size: {0}")]
    InvalidCellSize(f64),

    /// A partition extent collapsed to nothing.
    #[error("empty partition extent")]
    EmptyExtent,
}

//! Error types for rank-to-rank exchange.

use thiserror::Error;

/// Errors that can occur during exchange operations.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Payload serialization or deserialization failed.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A peer rank disconnected mid-operation.
    #[error("rank {rank} disconnected")]
    Disconnected {
        /// The peer that went away.
        rank: usize,
    },

    /// A payload did not match its announced record count.
    #[error("rank {rank} announced {announced} records but sent {received}")]
    CountMismatch {
        /// Sending rank.
        rank: usize,
        /// Count from the first exchange phase.
        announced: usize,
        /// Records decoded in the second phase.
        received: usize,
    },

    /// An operation addressed a rank outside the communicator.
    #[error("rank {rank} out of range (communicator size {size})")]
    RankOutOfRange {
        /// The invalid rank.
        rank: usize,
        /// Communicator size.
        size: usize,
    },

    /// A journal file could not be read or written.
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

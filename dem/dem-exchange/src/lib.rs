//! Rank-to-rank exchange: transports, migration protocol, reductions,
//! journals.
//!
//! Everything that crosses a rank boundary lives here:
//!
//! - [`Transport`] - the three collectives the engine needs (all-to-all,
//!   all-gather, barrier), with [`SoloTransport`] and [`LocalCluster`]
//!   implementations
//! - [`BodyRecord`] - the fixed-shape wire form of one body
//! - [`evaluate_transition`] / [`exchange_records`] - the per-step
//!   migration state machine and the two-phase count-then-payload exchange
//! - [`reduce_bounds`] / [`reduce_partition`] - global domain reductions
//! - [`RankJournal`] - JSON checkpoints
//!
//! The migration evaluation is a pure function of the partition's view of
//! one body; applying transitions to collections is the engine's job, which
//! keeps this crate free of any body or geometry types.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::missing_errors_doc)]

mod error;
mod journal;
mod migrate;
mod record;
mod reduce;
mod transport;

pub use error::ExchangeError;
pub use journal::{JournalRecord, PopulationJournal, RankJournal};
pub use migrate::{evaluate_transition, exchange_records, Transition};
pub use record::BodyRecord;
pub use reduce::{reduce_bounds, reduce_partition};
pub use transport::{LocalCluster, LocalTransport, SoloTransport, Transport};

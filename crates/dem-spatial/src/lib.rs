//! Sparse voxel partition mapping space to compute ranks.
//!
//! The partition answers three questions the migration layer asks every
//! step:
//!
//! - Which rank owns the cell a body's center of gravity is in?
//! - Is that cell near a boundary between ranks?
//! - Which foreign ranks border it?
//!
//! Each rank claims the cells its share of the flow mesh covers, the claims
//! are max-combined into a global map, and every rank keeps an identical
//! copy. Lookup is a floor division and a hash probe.
//!
//! # Example
//!
//! ```
//! use dem_spatial::SpatialPartition;
//! use dem_types::{Aabb, RankId};
//! use nalgebra::Point3;
//!
//! let mut partition = SpatialPartition::try_new(0.5, Point3::origin())?;
//! partition.mark_extent(
//!     &Aabb::new(Point3::origin(), Point3::new(2.0, 2.0, 2.0)),
//!     RankId::new(0),
//! );
//!
//! assert_eq!(partition.owner_at(&Point3::new(1.0, 1.0, 1.0)), Some(RankId::new(0)));
//! # Ok::<(), dem_spatial::SpatialError>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]

mod cell;
mod error;
mod partition;

pub use cell::CellIndex;
pub use error::SpatialError;
pub use partition::SpatialPartition;

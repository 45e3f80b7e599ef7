//! Core types for the distributed particle engine.
//!
//! This crate provides the foundational types shared by every layer of the
//! engine:
//!
//! - [`BodyKey`] - Globally unique composite body identifier
//! - [`KinematicState`] - Position, orientation, velocity of a body
//! - [`ForceLedger`] - Per-source force and torque accumulation
//! - [`Residency`] - Lifecycle tag of the cross-rank migration protocol
//! - [`ContactPartner`] / [`ContactCandidate`] - Adhesion bonds and tracked
//!   face pairs
//! - [`PopulationConfig`] / [`EngineConfig`] - Validated configuration
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no geometry and no physics:
//! the body mesh lives in `dem-body`, the collision resolver in `dem-engine`,
//! the wire protocol in `dem-exchange`. Everything here is cheap to copy and
//! serializes behind the `serde` feature.
//!
//! # Example
//!
//! ```
//! use dem_types::{BodyKey, KinematicState, PopulationId, RankId};
//! use nalgebra::Point3;
//!
//! let key = BodyKey::new(RankId::new(0), PopulationId::new(1), 7);
//! let state = KinematicState::at_rest(Point3::new(0.0, 0.0, 1.0));
//!
//! assert_eq!(key.to_string(), "r0/p1/7");
//! assert_eq!(state.center.z, 1.0);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod aabb;
mod config;
mod contact;
mod error;
mod forces;
mod ids;
mod kinematics;
mod residency;

pub use aabb::Aabb;
pub use config::{EngineConfig, PopulationConfig, ProximityShape};
pub use contact::{ContactCandidate, ContactKinematics, ContactPartner, ContactPhase};
pub use error::DemError;
pub use forces::{ForceLedger, ForceSource, ForceTorque};
pub use ids::{BodyKey, PopulationId, RankId};
pub use kinematics::KinematicState;
pub use residency::Residency;

// Re-export math types for convenience
pub use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, DemError>;

//! Triangulated rigid bodies with flux-integral mass properties.
//!
//! A body is an explicit closed triangle mesh plus its motion state. Mass,
//! center of gravity and inertia are integrated directly over the mesh by
//! tetrahedral decomposition, so arbitrarily shaped particles get exact
//! mass properties for their triangulation.
//!
//! - [`TriSurface`] - closed triangle mesh with rigid-motion operations
//! - [`MassDistribution`] - volume, centroid and inertia integrals
//! - [`RigidBody`] - surface + state + per-source force ledger
//! - [`BodySnapshot`] - cheap motion-state checkpoint for trial stepping
//!
//! # Example
//!
//! ```
//! use dem_body::{RigidBody, TriSurface};
//! use dem_types::{BodyKey, ForceSource, KinematicState, PopulationId, RankId, Residency};
//! use nalgebra::{Point3, Vector3};
//!
//! let key = BodyKey::new(RankId::new(0), PopulationId::new(0), 0);
//! let mut body = RigidBody::from_prototype(
//!     key,
//!     Residency::Free,
//!     &TriSurface::icosphere(1),
//!     1000.0,
//!     KinematicState::at_rest(Point3::origin()),
//! )?;
//!
//! body.apply_body_force(ForceSource::External, Vector3::new(0.0, 0.0, -9.81) * body.mass());
//! body.integrate_motion(1e-3, 1.0);
//! assert!(body.state.velocity.z < 0.0);
//! # Ok::<(), dem_types::DemError>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::suboptimal_flops
)]

mod body;
mod inertia;
mod surface;

pub use body::{BodySnapshot, RigidBody};
pub use inertia::MassDistribution;
pub use surface::TriSurface;

//! The distributed particle engine: populations, collision resolution,
//! agglomeration, migration, flow coupling.
//!
//! This crate ties the lower layers together into a running simulation:
//!
//! - [`ParticleWorld`] / [`Population`] - the rank-local body store
//! - [`CollisionEngine`] - energy-matched impulsive collision resolution
//! - [`Agglomerate`] - bonded clusters moving as rigid bodies, with
//!   structure-contact constraints and bond breakup
//! - [`SimulationStep`] - the per-step orchestrator: injection, migration,
//!   collisions, motion, retention
//! - [`map_bodies`] - void-fraction and solid-velocity fields for the flow
//!   solver
//!
//! # Example
//!
//! ```
//! use dem_contact::{ContactLaw, ContactLawTableBuilder};
//! use dem_engine::{ParticleWorld, SimulationStep};
//! use dem_exchange::SoloTransport;
//! use dem_spatial::SpatialPartition;
//! use dem_types::{Aabb, EngineConfig, KinematicState, PopulationConfig, RankId};
//! use dem_body::TriSurface;
//! use nalgebra::{Point3, Vector3};
//!
//! let mut partition = SpatialPartition::try_new(1.0, Point3::origin())?;
//! partition.mark_extent(
//!     &Aabb::new(Point3::origin(), Point3::new(10.0, 10.0, 10.0)),
//!     RankId::new(0),
//! );
//!
//! let mut world = ParticleWorld::new(
//!     RankId::new(0),
//!     EngineConfig::aerosol(1.0e-4, 1.0),
//!     partition,
//! )?;
//! let soot = world.add_population(
//!     PopulationConfig::rigid_particle(1800.0).with_collision_distance(1.0),
//!     TriSurface::icosphere(2),
//! )?;
//! world.inject(
//!     soot,
//!     KinematicState::moving(Point3::new(5.0, 5.0, 5.0), Vector3::x()),
//! )?;
//!
//! let laws = ContactLawTableBuilder::new()
//!     .with_default_law(&[soot], ContactLaw::adhesive_powder())
//!     .build(&[soot])?;
//!
//! let mut engine = SimulationStep::new(world, laws, SoloTransport);
//! engine.advance()?;
//! assert_eq!(engine.step(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::suboptimal_flops
)]

mod agglomerate;
mod collision;
mod mapping;
mod population;
mod prune;
mod step;
mod world;

pub use agglomerate::{reassign_contact_partners, Agglomerate};
pub use collision::{prune_stale_partners, CollisionEngine};
pub use mapping::{map_bodies, CouplingFields, FlowMesh, UniformGridMesh};
pub use population::Population;
pub use prune::candidate_pairs;
pub use step::{EngineError, Injector, SimulationStep};
pub use world::ParticleWorld;

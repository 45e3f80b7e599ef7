//! Population and engine configuration.
//!
//! A [`PopulationConfig`] describes one kind of body: its material, its
//! proximity thresholds and its role (mobile particle, immobile structure,
//! point tracer). The [`EngineConfig`] holds the global numerical knobs of
//! the time stepper and collision resolver.
//!
//! Both validate eagerly: a bad value is reported with the offending
//! parameter name and value, before the first step runs.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::DemError;
use crate::ids::PopulationId;

/// Shape of the proximity region used when searching for collision partners.
///
/// Mobile particle pairs always use a sphere around the center of gravity.
/// Structures can restrict the search to an axis or a plane so that long
/// walls or rails do not pull in every particle within their bounding
/// sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProximityShape {
    /// Full spherical neighborhood around the center of gravity.
    #[default]
    Sphere,
    /// Distance measured only along one coordinate axis (0 = x, 1 = y, 2 = z).
    Axis(u8),
    /// Distance measured only within the plane normal to one axis.
    Plane(u8),
}

impl ProximityShape {
    fn validate(self, population: PopulationId) -> Result<(), DemError> {
        match self {
            Self::Sphere => Ok(()),
            Self::Axis(axis) | Self::Plane(axis) if axis < 3 => Ok(()),
            Self::Axis(axis) | Self::Plane(axis) => Err(DemError::invalid_parameter(
                population,
                "proximity_axis",
                f64::from(axis),
            )),
        }
    }
}

/// Material and behavioral parameters of one particle population.
///
/// # Example
///
/// ```
/// use dem_types::{PopulationConfig, PopulationId};
///
/// let soot = PopulationConfig::rigid_particle(1800.0)
///     .with_collision_distance(2.0e-6)
///     .with_adhesion(0.05);
/// assert!(soot.validate(PopulationId::new(0)).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PopulationConfig {
    /// Material density (kg/m³).
    pub density: f64,
    /// Center-to-surface distance within which collision candidates are
    /// collected, for a unit-scale body (m). Scaled per body.
    pub collision_distance: f64,
    /// Influence radius for flow-field mapping, for a unit-scale body (m).
    pub mapping_distance: f64,
    /// Adhesion energy density used for bond strength (J/m²).
    pub adhesion: f64,
    /// Coulomb friction coefficient against any partner.
    pub friction: f64,
    /// Contact pressure above which deformation becomes plastic (Pa).
    pub restitution_pressure: f64,
    /// Flow pressure during plastic deformation (Pa).
    pub plastic_flow_pressure: f64,
    /// Fraction of impact kinetic energy retained after a collision, in
    /// `[0, 1]`. `1.0` is perfectly elastic, `0.0` perfectly inelastic.
    pub energy_conservation: f64,
    /// Immobile structure population. Structures never move or migrate.
    pub is_structure: bool,
    /// Point-particle population: no surface mesh, no mutual collisions.
    pub is_point_particle: bool,
    /// Shape of the proximity region for candidate search.
    pub proximity_shape: ProximityShape,
}

impl PopulationConfig {
    /// Mobile rigid particles of the given material density.
    #[must_use]
    pub fn rigid_particle(density: f64) -> Self {
        Self {
            density,
            collision_distance: 0.0,
            mapping_distance: 0.0,
            adhesion: 0.0,
            friction: 0.3,
            restitution_pressure: f64::INFINITY,
            plastic_flow_pressure: 0.0,
            energy_conservation: 1.0,
            is_structure: false,
            is_point_particle: false,
            proximity_shape: ProximityShape::Sphere,
        }
    }

    /// Immobile structure bodies (walls, internals).
    #[must_use]
    pub fn structure(density: f64) -> Self {
        Self {
            is_structure: true,
            ..Self::rigid_particle(density)
        }
    }

    /// Massless point tracers: advected and mapped, never collided.
    #[must_use]
    pub fn point_particle(density: f64) -> Self {
        Self {
            is_point_particle: true,
            ..Self::rigid_particle(density)
        }
    }

    /// Set the collision candidate distance.
    #[must_use]
    pub fn with_collision_distance(mut self, distance: f64) -> Self {
        self.collision_distance = distance;
        self
    }

    /// Set the flow mapping distance.
    #[must_use]
    pub fn with_mapping_distance(mut self, distance: f64) -> Self {
        self.mapping_distance = distance;
        self
    }

    /// Set the adhesion energy density.
    #[must_use]
    pub fn with_adhesion(mut self, adhesion: f64) -> Self {
        self.adhesion = adhesion;
        self
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Set the energy conservation coefficient.
    #[must_use]
    pub fn with_energy_conservation(mut self, coefficient: f64) -> Self {
        self.energy_conservation = coefficient;
        self
    }

    /// Switch to plastic contact with the given pressures.
    #[must_use]
    pub fn with_plasticity(mut self, restitution_pressure: f64, flow_pressure: f64) -> Self {
        self.restitution_pressure = restitution_pressure;
        self.plastic_flow_pressure = flow_pressure;
        self
    }

    /// Restrict the proximity search shape.
    #[must_use]
    pub fn with_proximity_shape(mut self, shape: ProximityShape) -> Self {
        self.proximity_shape = shape;
        self
    }

    /// Validate all parameters, reporting the first offending one.
    pub fn validate(&self, population: PopulationId) -> Result<(), DemError> {
        let positive: [(&'static str, f64); 1] = [("density", self.density)];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(DemError::invalid_parameter(population, name, value));
            }
        }

        let non_negative = [
            ("collision_distance", self.collision_distance),
            ("mapping_distance", self.mapping_distance),
            ("adhesion", self.adhesion),
            ("friction", self.friction),
            ("plastic_flow_pressure", self.plastic_flow_pressure),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(DemError::invalid_parameter(population, name, value));
            }
        }

        // Infinite restitution pressure means "never plastic" and is valid.
        if self.restitution_pressure.is_nan() || self.restitution_pressure < 0.0 {
            return Err(DemError::invalid_parameter(
                population,
                "restitution_pressure",
                self.restitution_pressure,
            ));
        }

        if !(0.0..=1.0).contains(&self.energy_conservation) {
            return Err(DemError::invalid_parameter(
                population,
                "energy_conservation",
                self.energy_conservation,
            ));
        }

        if self.is_structure && self.is_point_particle {
            return Err(DemError::invalid_config(format!(
                "population {population}: structure and point-particle are exclusive"
            )));
        }

        self.proximity_shape.validate(population)
    }
}

/// Global numerical parameters of the engine.
///
/// The defaults match the reference operating point for micron-scale
/// particles; only `timestep` and `granularity` have no sensible default
/// and must be set explicitly.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Time step length (s).
    pub timestep: f64,
    /// Relative tolerance of the post-collision kinetic-energy check.
    pub energy_tolerance: f64,
    /// Maximum iterations of the energy-matching force search.
    pub energy_iteration_cap: usize,
    /// Upper bound of the collision force scale factor searched.
    pub force_scale_max: f64,
    /// Staleness factor for contact candidates: a candidate is dropped once
    /// its separation exceeds this factor times the square root of its area.
    pub contact_radius_factor: f64,
    /// Spatial partition cell size (m).
    pub granularity: f64,
    /// Retention bounds of the physical domain; bodies whose center leaves
    /// the box are removed. `None` disables the cull.
    pub retention_bounds: Option<crate::aabb::Aabb>,
    /// Keep bodies whose owning rank disappears (collect them on rank 0)
    /// instead of deleting them.
    pub retain_orphans: bool,
    /// Maximum recursion depth of the agglomerate breakup search.
    pub breakup_iteration_depth: usize,
}

impl EngineConfig {
    /// Configuration for micron-scale aerosol particles.
    #[must_use]
    pub fn aerosol(timestep: f64, granularity: f64) -> Self {
        Self {
            timestep,
            energy_tolerance: 1.0e-3,
            energy_iteration_cap: 50,
            force_scale_max: 4.0,
            contact_radius_factor: 2.0,
            granularity,
            retention_bounds: None,
            retain_orphans: false,
            breakup_iteration_depth: 8,
        }
    }

    /// Set the retention bounds.
    #[must_use]
    pub fn with_retention_bounds(mut self, bounds: crate::aabb::Aabb) -> Self {
        self.retention_bounds = Some(bounds);
        self
    }

    /// Keep orphaned bodies on rank 0 instead of deleting them.
    #[must_use]
    pub fn with_orphan_retention(mut self) -> Self {
        self.retain_orphans = true;
        self
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), DemError> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(DemError::InvalidTimestep(self.timestep));
        }
        if !(self.granularity.is_finite() && self.granularity > 0.0) {
            return Err(DemError::InvalidGranularity(self.granularity));
        }
        if !(self.energy_tolerance.is_finite() && self.energy_tolerance > 0.0) {
            return Err(DemError::invalid_config(format!(
                "energy_tolerance = {} must be positive",
                self.energy_tolerance
            )));
        }
        if self.energy_iteration_cap == 0 {
            return Err(DemError::invalid_config(
                "energy_iteration_cap must be at least 1",
            ));
        }
        if !(self.force_scale_max.is_finite() && self.force_scale_max > 0.0) {
            return Err(DemError::invalid_config(format!(
                "force_scale_max = {} must be positive",
                self.force_scale_max
            )));
        }
        if !(self.contact_radius_factor.is_finite() && self.contact_radius_factor > 0.0) {
            return Err(DemError::invalid_config(format!(
                "contact_radius_factor = {} must be positive",
                self.contact_radius_factor
            )));
        }
        Ok(())
    }
}

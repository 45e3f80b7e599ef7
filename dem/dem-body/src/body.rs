//! Rigid bodies with explicit surface geometry.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use dem_types::{
    Aabb, BodyKey, ContactPartner, DemError, ForceLedger, ForceSource, KinematicState, Residency,
};

use crate::inertia::MassDistribution;
use crate::surface::TriSurface;

/// Checkpoint of a body's motion state.
///
/// Deliberately excludes the surface geometry: restoring applies the rigid
/// transform delta between the snapshot pose and the current pose, so a
/// snapshot is a cheap value copy no matter how fine the triangulation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodySnapshot {
    /// Kinematic state at snapshot time.
    pub state: KinematicState,
    /// Force ledger at snapshot time.
    pub forces: ForceLedger,
}

/// A rigid body: triangulated surface, mass properties, motion state.
///
/// The inertia tensor is kept world-aligned about the center of gravity and
/// is co-rotated with every rotation of the surface, so `inertia()` is
/// always directly usable in world-frame dynamics.
///
/// # Example
///
/// ```
/// use dem_body::{RigidBody, TriSurface};
/// use dem_types::{BodyKey, KinematicState, PopulationId, RankId, Residency};
/// use nalgebra::Point3;
///
/// let key = BodyKey::new(RankId::new(0), PopulationId::new(0), 0);
/// let proto = TriSurface::icosphere(2);
/// let body = RigidBody::from_prototype(
///     key,
///     Residency::Free,
///     &proto,
///     1000.0,
///     KinematicState::at_rest(Point3::new(0.0, 0.0, 1.0)),
/// ).unwrap();
///
/// assert!(body.mass() > 0.0);
/// assert_eq!(body.state.center.z, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    key: BodyKey,
    /// Lifecycle tag of the migration protocol.
    pub residency: Residency,
    surface: TriSurface,
    mass: f64,
    inertia: Matrix3<f64>,
    /// Motion state. The center is the center of gravity.
    pub state: KinematicState,
    /// Per-source force accumulation, cleared once per step.
    pub forces: ForceLedger,
    /// Adhesion bonds to other bodies. Symmetric by construction.
    pub partners: Vec<ContactPartner>,
    is_point: bool,
}

impl RigidBody {
    /// Instantiate a body from a population prototype surface.
    ///
    /// The prototype is scaled, oriented and positioned per `state`, and the
    /// mass properties are integrated over the instantiated surface. The
    /// state's center is snapped to the computed center of gravity.
    ///
    /// # Errors
    ///
    /// Returns an error if the prototype encloses no volume or the density
    /// is not positive.
    pub fn from_prototype(
        key: BodyKey,
        residency: Residency,
        prototype: &TriSurface,
        density: f64,
        state: KinematicState,
    ) -> Result<Self, DemError> {
        if !(density.is_finite() && density > 0.0) {
            return Err(DemError::invalid_parameter(key.population, "density", density));
        }
        let surface = TriSurface::from_prototype(prototype, &state);
        let dist = MassDistribution::of_surface(&surface)?;
        let mut state = state;
        state.center = dist.centroid;
        Ok(Self {
            key,
            residency,
            surface,
            mass: density * dist.volume,
            inertia: dist.inertia * density,
            state,
            forces: ForceLedger::new(),
            partners: Vec::new(),
            is_point: false,
        })
    }

    /// Create a point particle: mass but no surface, no rotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the mass is not positive, since integration
    /// divides by it.
    pub fn point(
        key: BodyKey,
        residency: Residency,
        mass: f64,
        state: KinematicState,
    ) -> Result<Self, DemError> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(DemError::invalid_parameter(key.population, "mass", mass));
        }
        Ok(Self {
            key,
            residency,
            surface: TriSurface::empty(),
            mass,
            inertia: Matrix3::zeros(),
            state,
            forces: ForceLedger::new(),
            partners: Vec::new(),
            is_point: true,
        })
    }

    /// The body's globally unique key.
    #[must_use]
    pub const fn key(&self) -> BodyKey {
        self.key
    }

    /// The world-space surface.
    #[must_use]
    pub const fn surface(&self) -> &TriSurface {
        &self.surface
    }

    /// Mass (kg).
    #[must_use]
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// World-aligned inertia tensor about the center of gravity (kg·m²).
    #[must_use]
    pub const fn inertia(&self) -> &Matrix3<f64> {
        &self.inertia
    }

    /// Whether this is a surfaceless point particle.
    #[must_use]
    pub const fn is_point(&self) -> bool {
        self.is_point
    }

    /// Scale a per-population base distance by this body's size.
    #[must_use]
    pub fn scaled_distance(&self, base: f64) -> f64 {
        base * self.state.scale
    }

    /// Current kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        self.state.kinetic_energy(self.mass, &self.inertia)
    }

    /// Bounding box of the surface; a point particle yields a degenerate
    /// box at its center.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        self.surface
            .aabb()
            .unwrap_or_else(|| Aabb::new(self.state.center, self.state.center))
    }

    /// Accumulate a force acting at `offset` from the center of gravity.
    pub fn apply_force(&mut self, source: ForceSource, force: Vector3<f64>, offset: &Vector3<f64>) {
        self.forces.accumulate(source, force, offset.cross(&force));
    }

    /// Accumulate a body force (no torque).
    pub fn apply_body_force(&mut self, source: ForceSource, force: Vector3<f64>) {
        self.forces.accumulate(source, force, Vector3::zeros());
    }

    /// Accumulate a force acting at a face centroid.
    pub fn apply_face_force(&mut self, source: ForceSource, face: u32, force: Vector3<f64>) {
        let offset = self.surface.face_centroid(face) - self.state.center;
        self.apply_force(source, force, &offset);
    }

    /// New velocities implied by the accumulated forces, without moving
    /// anything. `relaxation` under-relaxes the velocity increment.
    #[must_use]
    pub fn predicted_velocities(&self, dt: f64, relaxation: f64) -> (Vector3<f64>, Vector3<f64>) {
        let accel = self.forces.total_force() / self.mass;
        let ang_accel = self
            .inertia
            .try_inverse()
            .map_or_else(Vector3::zeros, |inv| inv * self.forces.total_torque());
        (
            self.state.velocity + accel * (relaxation * dt),
            self.state.angular_velocity + ang_accel * (relaxation * dt),
        )
    }

    /// One semi-implicit Euler step: update velocities from the force
    /// ledger, then displace by the half-step mean of old and new velocity.
    ///
    /// Structures never move; their ledger is simply cleared.
    pub fn integrate_motion(&mut self, dt: f64, relaxation: f64) {
        if self.residency.is_structure() {
            self.forces.clear();
            return;
        }
        let (new_v, new_w) = self.predicted_velocities(dt, relaxation);
        let mean_v = (self.state.velocity + new_v) * 0.5;
        let mean_w = (self.state.angular_velocity + new_w) * 0.5;

        let rotation = UnitQuaternion::from_scaled_axis(mean_w * dt);
        self.apply_rigid_step(&(mean_v * dt), &rotation);

        self.state.velocity = new_v;
        self.state.angular_velocity = new_w;
        self.state.mean_velocity = mean_v;
        self.state.mean_angular_velocity = mean_w;
        self.forces.clear();
    }

    /// Advance only the kinematic state by the given velocities, leaving
    /// surface, inertia and partners untouched. Used for trial steps that
    /// will be rolled back or committed wholesale.
    pub fn advance_kinematics(&mut self, dt: f64, velocity: Vector3<f64>, angular: Vector3<f64>) {
        let mean_v = (self.state.velocity + velocity) * 0.5;
        let mean_w = (self.state.angular_velocity + angular) * 0.5;
        self.state.center += mean_v * dt;
        self.state.orientation =
            UnitQuaternion::from_scaled_axis(mean_w * dt) * self.state.orientation;
        self.state.velocity = velocity;
        self.state.angular_velocity = angular;
        self.state.mean_velocity = mean_v;
        self.state.mean_angular_velocity = mean_w;
    }

    /// Apply a rigid displacement: rotate about the center of gravity, then
    /// translate. Surface, inertia tensor and partner bonds co-move.
    pub fn apply_rigid_step(&mut self, translation: &Vector3<f64>, rotation: &UnitQuaternion<f64>) {
        if !self.is_point {
            self.surface.rotate_about(rotation, &self.state.center);
            self.surface.translate(translation);
            let r = rotation.to_rotation_matrix().into_inner();
            self.inertia = r * self.inertia * r.transpose();
        }
        for partner in &mut self.partners {
            partner.rotate(rotation);
        }
        self.state.center += translation;
        self.state.orientation = rotation * self.state.orientation;
    }

    /// Take a checkpoint of the motion state.
    #[must_use]
    pub fn snapshot(&self) -> BodySnapshot {
        BodySnapshot {
            state: self.state,
            forces: self.forces,
        }
    }

    /// Restore a checkpoint, moving the geometry by the rigid transform
    /// delta between the snapshot pose and the current pose.
    pub fn restore(&mut self, snapshot: &BodySnapshot) {
        let dq = snapshot.state.orientation * self.state.orientation.inverse();
        let dx = snapshot.state.center - self.state.center;
        self.apply_rigid_step(&dx, &dq);
        self.state = snapshot.state;
        self.forces = snapshot.forces;
    }

    /// Drop the partner entry referencing `key`, if present.
    pub fn forget_partner(&mut self, key: BodyKey) {
        self.partners.retain(|p| p.key != key);
    }
}

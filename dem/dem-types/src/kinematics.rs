//! Kinematic state of a rigid body.
//!
//! The state carries the center of gravity, orientation, current velocities
//! and the half-step average velocities produced by the last integration.
//! The averages are what actually displace the geometry: a semi-implicit
//! Euler step moves the body by the mean of the old and new velocity, which
//! keeps the displacement second-order accurate for constant acceleration.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Full kinematic state of a rigid body.
///
/// This is the unit of checkpointing: `snapshot()`/`restore()` on a body
/// copies exactly this struct (plus the force ledger), never the triangulated
/// geometry. The geometry is re-derived from the rigid transform delta on
/// restore.
///
/// # Example
///
/// ```
/// use dem_types::KinematicState;
/// use nalgebra::{Point3, Vector3};
///
/// let state = KinematicState::at_rest(Point3::new(0.0, 0.0, 1.0));
/// assert_eq!(state.center.z, 1.0);
/// assert!(state.velocity.norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KinematicState {
    /// Center of gravity in world coordinates.
    pub center: Point3<f64>,
    /// Orientation relative to the prototype shape.
    pub orientation: UnitQuaternion<f64>,
    /// Linear velocity of the center of gravity (m/s).
    pub velocity: Vector3<f64>,
    /// Angular velocity about the center of gravity (rad/s).
    pub angular_velocity: Vector3<f64>,
    /// Half-step average linear velocity from the last integration.
    pub mean_velocity: Vector3<f64>,
    /// Half-step average angular velocity from the last integration.
    pub mean_angular_velocity: Vector3<f64>,
    /// Uniform scale factor relative to the prototype shape.
    pub scale: f64,
}

impl Default for KinematicState {
    fn default() -> Self {
        Self::at_rest(Point3::origin())
    }
}

impl KinematicState {
    /// Create a state at rest at the given center of gravity.
    #[must_use]
    pub fn at_rest(center: Point3<f64>) -> Self {
        Self {
            center,
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            mean_velocity: Vector3::zeros(),
            mean_angular_velocity: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Create a moving state.
    #[must_use]
    pub fn moving(center: Point3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            velocity,
            mean_velocity: velocity,
            ..Self::at_rest(center)
        }
    }

    /// Velocity of a material point at `offset` from the center of gravity.
    ///
    /// `v_point = v + ω × offset`
    #[must_use]
    pub fn velocity_at_offset(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.velocity + self.angular_velocity.cross(offset)
    }

    /// Kinetic energy given mass and world-aligned inertia tensor about the cg.
    #[must_use]
    pub fn kinetic_energy(&self, mass: f64, inertia: &Matrix3<f64>) -> f64 {
        let translational = 0.5 * mass * self.velocity.norm_squared();
        let rotational = 0.5
            * self
                .angular_velocity
                .dot(&(inertia * self.angular_velocity));
        translational + rotational
    }

    /// Linear momentum.
    #[must_use]
    pub fn linear_momentum(&self, mass: f64) -> Vector3<f64> {
        self.velocity * mass
    }

    /// Angular momentum about the center of gravity.
    #[must_use]
    pub fn angular_momentum(&self, inertia: &Matrix3<f64>) -> Vector3<f64> {
        inertia * self.angular_velocity
    }

    /// Check the state for `NaN`/`Inf` contamination.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.center.coords.iter().all(|x| x.is_finite())
            && self.orientation.coords.iter().all(|x| x.is_finite())
            && self.velocity.iter().all(|x| x.is_finite())
            && self.angular_velocity.iter().all(|x| x.is_finite())
            && self.scale.is_finite()
    }
}

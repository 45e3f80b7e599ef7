//! Wire records for body state.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use dem_types::{BodyKey, KinematicState};

/// The state of one body on the wire.
///
/// Deliberately small and fixed-shape: geometry is never exchanged. The
/// receiver reconstructs the surface from its population's prototype plus
/// the scale, orientation and position carried here, so a record costs the
/// same no matter how finely the body is triangulated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    /// Identity of the body; survives migration unchanged.
    pub key: BodyKey,
    /// Uniform scale relative to the population prototype.
    pub scale: f64,
    /// Center of gravity.
    pub center: [f64; 3],
    /// Linear velocity.
    pub velocity: [f64; 3],
    /// Angular velocity.
    pub angular_velocity: [f64; 3],
    /// Orientation as a scaled rotation axis (angle × unit axis).
    pub orientation: [f64; 3],
}

impl BodyRecord {
    /// Capture a body's kinematic state.
    #[must_use]
    pub fn from_state(key: BodyKey, state: &KinematicState) -> Self {
        let axis = state.orientation.scaled_axis();
        Self {
            key,
            scale: state.scale,
            center: state.center.coords.into(),
            velocity: state.velocity.into(),
            angular_velocity: state.angular_velocity.into(),
            orientation: axis.into(),
        }
    }

    /// Reconstruct the kinematic state. Mean velocities start equal to the
    /// current velocities; they are overwritten by the next integration.
    #[must_use]
    pub fn to_state(&self) -> KinematicState {
        KinematicState {
            center: Point3::from(Vector3::from(self.center)),
            orientation: UnitQuaternion::from_scaled_axis(Vector3::from(self.orientation)),
            velocity: Vector3::from(self.velocity),
            angular_velocity: Vector3::from(self.angular_velocity),
            mean_velocity: Vector3::from(self.velocity),
            mean_angular_velocity: Vector3::from(self.angular_velocity),
            scale: self.scale,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dem_types::{PopulationId, RankId};

    #[test]
    fn state_survives_the_wire() {
        let key = BodyKey::new(RankId::new(1), PopulationId::new(2), 99);
        let mut state = KinematicState::moving(
            Point3::new(1.0, -2.0, 3.0),
            Vector3::new(0.5, 0.0, -0.5),
        );
        state.angular_velocity = Vector3::new(0.0, 4.0, 0.0);
        state.orientation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.2);
        state.scale = 2.5;

        let record = BodyRecord::from_state(key, &state);
        let json = serde_json::to_vec(&record).unwrap();
        let back: BodyRecord = serde_json::from_slice(&json).unwrap();
        let restored = back.to_state();

        assert_eq!(back.key, key);
        assert_relative_eq!(restored.center.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(restored.scale, 2.5, epsilon = 1e-12);
        assert_relative_eq!(
            restored.orientation.angle_to(&state.orientation),
            0.0,
            epsilon = 1e-12
        );
    }
}

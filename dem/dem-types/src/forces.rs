//! Per-source force and torque accumulation.
//!
//! Forces on a body are bucketed by physical origin so that individual
//! contributions can be inspected, zeroed, or excluded independently. The
//! collision engine zeroes only the contact bucket when a pair adheres, and
//! the mapping layer reads only the fluid bucket.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Physical origin of a force contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ForceSource {
    /// Hydrodynamic coupling from the continuum flow field.
    Fluid,
    /// Discrete collision forces.
    Contact,
    /// Adhesive (van der Waals / Hamaker) bond forces.
    Adhesion,
    /// Thermophoretic forces from temperature gradients.
    Thermophoretic,
    /// Electromagnetic forces.
    Electromagnetic,
    /// Externally applied forces (gravity, user actions).
    External,
}

impl ForceSource {
    /// All force sources in ledger order.
    pub const ALL: [Self; 6] = [
        Self::Fluid,
        Self::Contact,
        Self::Adhesion,
        Self::Thermophoretic,
        Self::Electromagnetic,
        Self::External,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Fluid => 0,
            Self::Contact => 1,
            Self::Adhesion => 2,
            Self::Thermophoretic => 3,
            Self::Electromagnetic => 4,
            Self::External => 5,
        }
    }
}

/// A force/torque pair accumulated for one source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForceTorque {
    /// Accumulated force (N).
    pub force: Vector3<f64>,
    /// Accumulated torque about the body's center of gravity (N·m).
    pub torque: Vector3<f64>,
}

impl Default for ForceTorque {
    fn default() -> Self {
        Self::zero()
    }
}

impl ForceTorque {
    /// A zero force/torque pair.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }
}

/// Per-source force and torque ledger for one body.
///
/// # Example
///
/// ```
/// use dem_types::{ForceLedger, ForceSource};
/// use nalgebra::Vector3;
///
/// let mut ledger = ForceLedger::new();
/// ledger.accumulate(ForceSource::Fluid, Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());
/// ledger.accumulate(ForceSource::External, Vector3::new(0.0, 0.0, -9.81), Vector3::zeros());
///
/// let total = ledger.total_force();
/// assert_eq!(total.x, 1.0);
/// assert_eq!(total.z, -9.81);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForceLedger {
    entries: [ForceTorque; 6],
}

impl ForceLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a force/torque contribution to a source bucket.
    pub fn accumulate(&mut self, source: ForceSource, force: Vector3<f64>, torque: Vector3<f64>) {
        let entry = &mut self.entries[source.index()];
        entry.force += force;
        entry.torque += torque;
    }

    /// Read one source bucket.
    #[must_use]
    pub fn source(&self, source: ForceSource) -> &ForceTorque {
        &self.entries[source.index()]
    }

    /// Zero one source bucket.
    pub fn clear_source(&mut self, source: ForceSource) {
        self.entries[source.index()] = ForceTorque::zero();
    }

    /// Zero the whole ledger.
    pub fn clear(&mut self) {
        self.entries = [ForceTorque::zero(); 6];
    }

    /// Total force over all sources.
    #[must_use]
    pub fn total_force(&self) -> Vector3<f64> {
        self.entries.iter().map(|e| e.force).sum()
    }

    /// Total torque over all sources.
    #[must_use]
    pub fn total_torque(&self) -> Vector3<f64> {
        self.entries.iter().map(|e| e.torque).sum()
    }
}

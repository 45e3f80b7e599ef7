//! Pairwise contact laws.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use dem_types::{DemError, PopulationConfig};

/// Deformation regime of a contact.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContactModel {
    /// Purely elastic contact: all stored deformation energy is returned.
    Elastic,
    /// Elastic up to the restitution pressure, then plastic flow.
    Plastic {
        /// Flow pressure during plastic deformation (Pa).
        flow_pressure: f64,
    },
}

impl ContactModel {
    /// Parse a model by name (`"elastic"` or `"plastic"`).
    ///
    /// Plastic models parsed this way start with zero flow pressure.
    pub fn from_name(name: &str) -> Result<Self, DemError> {
        match name {
            "elastic" => Ok(Self::Elastic),
            "plastic" => Ok(Self::Plastic { flow_pressure: 0.0 }),
            other => Err(DemError::UnknownStrategy {
                name: other.to_string(),
            }),
        }
    }
}

/// Contact behavior of one population pair.
///
/// Laws are pair-symmetric: the table stores them under the canonically
/// ordered population pair, so `(a, b)` and `(b, a)` see the same law.
///
/// # Example
///
/// ```
/// use dem_contact::ContactLaw;
///
/// let law = ContactLaw::dry_elastic()
///     .with_friction(0.4)
///     .with_adhesion(0.02);
///
/// // Bond strength grows with the square root of the contact area.
/// let weak = law.bond_strength(1e-12);
/// let strong = law.bond_strength(4e-12);
/// assert!((strong / weak - 2.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactLaw {
    /// Adhesion energy density of the pair (J/m²).
    pub adhesion: f64,
    /// Coulomb friction coefficient of the pair.
    pub friction: f64,
    /// Fraction of impact kinetic energy retained, in `[0, 1]`.
    pub energy_conservation: f64,
    /// Deformation regime.
    pub model: ContactModel,
}

impl ContactLaw {
    /// Frictional elastic contact with no adhesion.
    #[must_use]
    pub fn dry_elastic() -> Self {
        Self {
            adhesion: 0.0,
            friction: 0.3,
            energy_conservation: 1.0,
            model: ContactModel::Elastic,
        }
    }

    /// Adhesive, strongly dissipative contact typical of fine powders.
    #[must_use]
    pub fn adhesive_powder() -> Self {
        Self {
            adhesion: 0.05,
            friction: 0.5,
            energy_conservation: 0.1,
            model: ContactModel::Elastic,
        }
    }

    /// Derive the pair law from two population material configurations.
    ///
    /// Adhesion combines as the geometric mean (either side can suppress
    /// bonding entirely), friction and dissipation take the rougher and
    /// lossier of the two sides, and the contact turns plastic as soon as
    /// either material yields.
    #[must_use]
    pub fn between(a: &PopulationConfig, b: &PopulationConfig) -> Self {
        let restitution = a.restitution_pressure.min(b.restitution_pressure);
        let model = if restitution.is_finite() {
            ContactModel::Plastic {
                flow_pressure: a.plastic_flow_pressure.max(b.plastic_flow_pressure),
            }
        } else {
            ContactModel::Elastic
        };
        Self {
            adhesion: (a.adhesion * b.adhesion).max(0.0).sqrt(),
            friction: a.friction.max(b.friction),
            energy_conservation: a.energy_conservation.min(b.energy_conservation),
            model,
        }
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

    /// Switch to a plastic model with the given flow pressure.
    #[must_use]
    pub fn with_plastic_flow(mut self, flow_pressure: f64) -> Self {
        self.model = ContactModel::Plastic { flow_pressure };
        self
    }

    /// Whether this pair forms adhesive bonds at all.
    #[must_use]
    pub fn is_adhesive(&self) -> bool {
        self.adhesion > 0.0
    }

    /// Strength of an adhesive bond over a contact of the given area (N).
    ///
    /// Scales with `sqrt(area)`: bond rupture is governed by the contact
    /// perimeter rather than the full contact patch.
    #[must_use]
    pub fn bond_strength(&self, area: f64) -> f64 {
        self.adhesion * area.max(0.0).sqrt()
    }

    /// Validate the law's parameters.
    pub fn validate(&self) -> Result<(), DemError> {
        if !(self.adhesion.is_finite() && self.adhesion >= 0.0) {
            return Err(DemError::invalid_config(format!(
                "adhesion = {} must be non-negative",
                self.adhesion
            )));
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(DemError::invalid_config(format!(
                "friction = {} must be non-negative",
                self.friction
            )));
        }
        if !(0.0..=1.0).contains(&self.energy_conservation) {
            return Err(DemError::invalid_config(format!(
                "energy_conservation = {} must be in [0, 1]",
                self.energy_conservation
            )));
        }
        if let ContactModel::Plastic { flow_pressure } = self.model {
            if !(flow_pressure.is_finite() && flow_pressure >= 0.0) {
                return Err(DemError::invalid_config(format!(
                    "flow_pressure = {flow_pressure} must be non-negative"
                )));
            }
        }
        Ok(())
    }
}

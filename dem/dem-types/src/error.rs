//! Error types shared across the particle engine.

use thiserror::Error;

use crate::ids::PopulationId;

/// Errors that can occur while configuring or running the particle engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DemError {
    /// Malformed textual identifier.
    #[error("invalid identifier: {identifier:?}")]
    InvalidIdentifier {
        /// The text that failed to parse.
        identifier: String,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Spatial granularity must be a positive finite cell size.
    #[error("invalid spatial granularity: {0}")]
    InvalidGranularity(f64),

    /// A required configuration parameter is absent.
    #[error("population {population}: missing parameter {name}")]
    MissingParameter {
        /// Population the parameter belongs to.
        population: PopulationId,
        /// Parameter name.
        name: &'static str,
    },

    /// A configuration parameter is out of range.
    #[error("population {population}: parameter {name} = {value} out of range")]
    InvalidParameter {
        /// Population the parameter belongs to.
        population: PopulationId,
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A contact model name did not match any known strategy.
    #[error("unknown contact model: {name:?}")]
    UnknownStrategy {
        /// The unrecognized model name.
        name: String,
    },

    /// No contact law registered for a population pair.
    #[error("no contact law for populations ({0}, {1})")]
    MissingContactLaw(PopulationId, PopulationId),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },
}

impl DemError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an out-of-range parameter error.
    #[must_use]
    pub fn invalid_parameter(population: PopulationId, name: &'static str, value: f64) -> Self {
        Self::InvalidParameter {
            population,
            name,
            value,
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingParameter { .. }
                | Self::InvalidParameter { .. }
        )
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }
}

//! Body lifecycle tags for the migration state machine.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a body stands in the cross-rank duplication protocol.
///
/// Transitions are evaluated once per time step, after motion integration,
/// by comparing the body's cell against the spatial partition's ownership
/// and boundary maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Residency {
    /// Interior body, no duplication needed.
    Free,
    /// Authoritative copy near a partition boundary; ghosted to neighbor ranks.
    Master,
    /// Non-authoritative duplicate received from another rank.
    Slave,
    /// Immobile body, resident wherever it geometrically lies, never migrates.
    Structure,
}

impl Residency {
    /// Whether this rank's copy is the authoritative one.
    #[must_use]
    pub const fn is_authoritative(self) -> bool {
        matches!(self, Self::Free | Self::Master | Self::Structure)
    }

    /// Whether the body is an immobile structure.
    #[must_use]
    pub const fn is_structure(self) -> bool {
        matches!(self, Self::Structure)
    }

    /// Whether the body participates in migration at all.
    #[must_use]
    pub const fn migrates(self) -> bool {
        !matches!(self, Self::Structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority() {
        assert!(Residency::Free.is_authoritative());
        assert!(Residency::Master.is_authoritative());
        assert!(Residency::Structure.is_authoritative());
        assert!(!Residency::Slave.is_authoritative());
    }

    #[test]
    fn structures_never_migrate() {
        assert!(!Residency::Structure.migrates());
        assert!(Residency::Slave.migrates());
    }
}

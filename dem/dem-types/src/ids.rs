//! Identifiers for ranks, populations and bodies.
//!
//! Bodies are identified by a composite key of the rank that created them,
//! the population they belong to, and a rank-local counter. The composite
//! is globally unique without any central allocator: no two ranks ever mint
//! the same key, and a key survives migration unchanged.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::DemError;

/// Identifier of a compute rank (one domain partition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RankId(pub u32);

impl RankId {
    /// Create a new rank ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw rank number.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl From<u32> for RankId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identifier of a particle population (one kind of body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PopulationId(pub u16);

impl PopulationId {
    /// Create a new population ID.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the raw population number.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Order a pair of population IDs canonically (smaller first).
    ///
    /// Used as the lookup key of the contact-law table so that `(a, b)` and
    /// `(b, a)` resolve to the same entry.
    #[must_use]
    pub fn ordered_pair(a: Self, b: Self) -> (Self, Self) {
        if a.0 <= b.0 {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl fmt::Display for PopulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl From<u16> for PopulationId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

/// Globally unique body identifier.
///
/// Composite of originating rank, population, and a rank-local counter.
/// Partner relations store these keys as weak references: a key names a body
/// but never owns it, and every holder must re-validate through a collection
/// lookup before use.
///
/// # Example
///
/// ```
/// use dem_types::{BodyKey, PopulationId, RankId};
///
/// let key = BodyKey::new(RankId::new(2), PopulationId::new(0), 17);
/// assert_eq!(key.to_string(), "r2/p0/17");
/// assert_eq!(key.to_string().parse::<BodyKey>().unwrap(), key);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyKey {
    /// Rank that created the body.
    pub rank: RankId,
    /// Population the body belongs to.
    pub population: PopulationId,
    /// Rank-local sequence number within the population.
    pub local: u64,
}

impl BodyKey {
    /// Create a new body key.
    #[must_use]
    pub const fn new(rank: RankId, population: PopulationId, local: u64) -> Self {
        Self {
            rank,
            population,
            local,
        }
    }
}

impl fmt::Display for BodyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.rank, self.population, self.local)
    }
}

impl FromStr for BodyKey {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DemError::InvalidIdentifier {
            identifier: s.to_string(),
        };

        let mut parts = s.split('/');
        let rank = parts
            .next()
            .and_then(|p| p.strip_prefix('r'))
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(bad)?;
        let population = parts
            .next()
            .and_then(|p| p.strip_prefix('p'))
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(bad)?;
        let local = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(bad)?;
        if parts.next().is_some() {
            return Err(bad());
        }

        Ok(Self::new(RankId::new(rank), PopulationId::new(population), local))
    }
}

//! The immutable contact-law table.

use std::collections::HashMap;

use dem_types::{DemError, PopulationId};

use crate::law::ContactLaw;

/// Builder for a [`ContactLawTable`].
///
/// Laws are registered under unordered population pairs; registering the
/// same pair twice overwrites. `build` verifies that every pair over the
/// given populations has a law, so a missing entry fails at setup instead
/// of mid-simulation.
#[derive(Debug, Clone, Default)]
pub struct ContactLawTableBuilder {
    laws: HashMap<(PopulationId, PopulationId), ContactLaw>,
}

impl ContactLawTableBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the law for a population pair (order-insensitive).
    #[must_use]
    pub fn with_law(mut self, a: PopulationId, b: PopulationId, law: ContactLaw) -> Self {
        self.laws.insert(PopulationId::ordered_pair(a, b), law);
        self
    }

    /// Register one law for every pair over `populations` that has none yet.
    #[must_use]
    pub fn with_default_law(mut self, populations: &[PopulationId], law: ContactLaw) -> Self {
        for (i, &a) in populations.iter().enumerate() {
            for &b in &populations[i..] {
                self.laws
                    .entry(PopulationId::ordered_pair(a, b))
                    .or_insert(law);
            }
        }
        self
    }

    /// Finalize the table, checking completeness over `populations` and
    /// validating every law.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::MissingContactLaw`] for the first uncovered pair,
    /// or the validation error of the first invalid law.
    pub fn build(self, populations: &[PopulationId]) -> Result<ContactLawTable, DemError> {
        let mut sorted = populations.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for (i, &a) in sorted.iter().enumerate() {
            for &b in &sorted[i..] {
                if !self.laws.contains_key(&PopulationId::ordered_pair(a, b)) {
                    return Err(DemError::MissingContactLaw(a, b));
                }
            }
        }
        for law in self.laws.values() {
            law.validate()?;
        }
        Ok(ContactLawTable { laws: self.laws })
    }
}

/// Immutable map from population pairs to contact laws.
///
/// Built once at setup and then only read; the collision engine borrows it
/// freely from any phase without synchronization concerns.
///
/// # Example
///
/// ```
/// use dem_contact::{ContactLaw, ContactLawTableBuilder};
/// use dem_types::PopulationId;
///
/// let soot = PopulationId::new(0);
/// let wall = PopulationId::new(1);
///
/// let table = ContactLawTableBuilder::new()
///     .with_law(soot, soot, ContactLaw::adhesive_powder())
///     .with_law(soot, wall, ContactLaw::dry_elastic())
///     .with_law(wall, wall, ContactLaw::dry_elastic())
///     .build(&[soot, wall])?;
///
/// // Lookup is order-insensitive.
/// assert_eq!(table.law(wall, soot), table.law(soot, wall));
/// # Ok::<(), dem_types::DemError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ContactLawTable {
    laws: HashMap<(PopulationId, PopulationId), ContactLaw>,
}

impl ContactLawTable {
    /// The law for a population pair, if registered.
    #[must_use]
    pub fn law(&self, a: PopulationId, b: PopulationId) -> Option<&ContactLaw> {
        self.laws.get(&PopulationId::ordered_pair(a, b))
    }

    /// The law for a population pair, as an error if unregistered.
    pub fn require(&self, a: PopulationId, b: PopulationId) -> Result<&ContactLaw, DemError> {
        self.law(a, b).ok_or(DemError::MissingContactLaw(a, b))
    }

    /// Number of registered pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.laws.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.laws.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_missing_pair() {
        let a = PopulationId::new(0);
        let b = PopulationId::new(1);
        let err = ContactLawTableBuilder::new()
            .with_law(a, a, ContactLaw::dry_elastic())
            .with_law(a, b, ContactLaw::dry_elastic())
            .build(&[a, b])
            .unwrap_err();
        assert_eq!(err, DemError::MissingContactLaw(b, b));
    }

    #[test]
    fn lookup_is_order_insensitive() {
        let a = PopulationId::new(0);
        let b = PopulationId::new(3);
        let table = ContactLawTableBuilder::new()
            .with_default_law(&[a, b], ContactLaw::dry_elastic())
            .build(&[a, b])
            .unwrap();
        assert!(table.law(b, a).is_some());
        assert_eq!(table.law(a, b), table.law(b, a));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn default_law_does_not_overwrite() {
        let a = PopulationId::new(0);
        let table = ContactLawTableBuilder::new()
            .with_law(a, a, ContactLaw::adhesive_powder())
            .with_default_law(&[a], ContactLaw::dry_elastic())
            .build(&[a])
            .unwrap();
        assert!(table.law(a, a).unwrap().is_adhesive());
    }

    #[test]
    fn build_validates_laws() {
        let a = PopulationId::new(0);
        let bad = ContactLaw::dry_elastic().with_friction(-1.0);
        assert!(ContactLawTableBuilder::new()
            .with_law(a, a, bad)
            .build(&[a])
            .is_err());
    }

    #[test]
    fn require_reports_pair() {
        let table = ContactLawTableBuilder::new().build(&[]).unwrap();
        let err = table
            .require(PopulationId::new(1), PopulationId::new(0))
            .unwrap_err();
        assert_eq!(
            err,
            DemError::MissingContactLaw(PopulationId::new(0), PopulationId::new(1))
        );
    }
}

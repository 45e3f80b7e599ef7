//! The rank-local body store.

use dem_body::{RigidBody, TriSurface};
use dem_contact::{ContactLaw, ContactLawTable, ContactLawTableBuilder};
use dem_spatial::SpatialPartition;
use dem_types::{BodyKey, DemError, EngineConfig, KinematicState, PopulationId, RankId};

use crate::population::Population;

/// Everything one rank holds: its populations, its copy of the global
/// spatial partition, and the engine configuration.
///
/// The world is the only place bodies are removed, so the symmetric
/// partner invariant can be enforced here: removing a body strips it from
/// every partner's list, across populations, before control returns.
#[derive(Debug)]
pub struct ParticleWorld {
    rank: RankId,
    config: EngineConfig,
    partition: SpatialPartition,
    populations: Vec<Population>,
}

impl ParticleWorld {
    /// Create an empty world.
    ///
    /// # Errors
    ///
    /// Fails if the engine configuration is invalid.
    pub fn new(
        rank: RankId,
        config: EngineConfig,
        partition: SpatialPartition,
    ) -> Result<Self, DemError> {
        config.validate()?;
        Ok(Self {
            rank,
            config,
            partition,
            populations: Vec::new(),
        })
    }

    /// This rank's identity.
    #[must_use]
    pub const fn rank(&self) -> RankId {
        self.rank
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The spatial partition.
    #[must_use]
    pub const fn partition(&self) -> &SpatialPartition {
        &self.partition
    }

    /// The spatial partition, mutably (ownership reduction at setup).
    pub fn partition_mut(&mut self) -> &mut SpatialPartition {
        &mut self.partition
    }

    /// Register a population, assigning the next free identifier.
    ///
    /// # Errors
    ///
    /// Fails if the population configuration is invalid.
    pub fn add_population(
        &mut self,
        config: dem_types::PopulationConfig,
        prototype: TriSurface,
    ) -> Result<PopulationId, DemError> {
        #[allow(clippy::cast_possible_truncation)]
        let id = PopulationId::new(self.populations.len() as u16);
        self.populations.push(Population::new(id, config, prototype)?);
        Ok(id)
    }

    /// All registered population identifiers.
    #[must_use]
    pub fn population_ids(&self) -> Vec<PopulationId> {
        self.populations.iter().map(Population::id).collect()
    }

    /// A population by identifier.
    #[must_use]
    pub fn population(&self, id: PopulationId) -> Option<&Population> {
        self.populations.get(id.raw() as usize)
    }

    /// A population by identifier, mutably.
    pub fn population_mut(&mut self, id: PopulationId) -> Option<&mut Population> {
        self.populations.get_mut(id.raw() as usize)
    }

    /// Iterate over all populations.
    pub fn populations(&self) -> impl Iterator<Item = &Population> {
        self.populations.iter()
    }

    /// Iterate mutably over all populations.
    pub fn populations_mut(&mut self) -> impl Iterator<Item = &mut Population> {
        self.populations.iter_mut()
    }

    /// Build the pairwise contact-law table from the populations' material
    /// configurations.
    ///
    /// Every pair gets [`ContactLaw::between`] of the two configurations.
    /// Runs that need per-pair overrides build the table by hand instead.
    ///
    /// # Errors
    ///
    /// Fails if a derived law is invalid.
    pub fn derive_law_table(&self) -> Result<ContactLawTable, DemError> {
        let mut builder = ContactLawTableBuilder::new();
        for (i, a) in self.populations.iter().enumerate() {
            for b in &self.populations[i..] {
                builder =
                    builder.with_law(a.id(), b.id(), ContactLaw::between(a.config(), b.config()));
            }
        }
        builder.build(&self.population_ids())
    }

    /// Inject a new authoritative body.
    ///
    /// # Errors
    ///
    /// Fails for an unknown population or an uninstantiable state.
    pub fn inject(
        &mut self,
        population: PopulationId,
        state: KinematicState,
    ) -> Result<BodyKey, DemError> {
        let rank = self.rank;
        self.populations
            .get_mut(population.raw() as usize)
            .ok_or(DemError::MissingParameter {
                population,
                name: "population",
            })?
            .inject(rank, state)
    }

    /// Look up a body across all populations.
    #[must_use]
    pub fn body(&self, key: BodyKey) -> Option<&RigidBody> {
        self.population(key.population)?.body(key)
    }

    /// Look up a body mutably.
    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut RigidBody> {
        self.population_mut(key.population)?.body_mut(key)
    }

    /// Remove a body and strip it from every partner's list.
    ///
    /// Returns the removed body, if it existed.
    pub fn remove_body(&mut self, key: BodyKey) -> Option<RigidBody> {
        let body = self
            .populations
            .get_mut(key.population.raw() as usize)?
            .remove(key)?;
        for partner in &body.partners {
            if let Some(other) = self.body_mut(partner.key) {
                other.forget_partner(key);
            }
        }
        Some(body)
    }

    /// Total resident body count over all populations.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.populations.iter().map(Population::len).sum()
    }

    /// All resident body keys over all populations.
    #[must_use]
    pub fn all_keys(&self) -> Vec<BodyKey> {
        self.populations
            .iter()
            .flat_map(|p| p.keys())
            .collect()
    }

    /// Iterate over all resident bodies.
    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.populations.iter().flat_map(|p| p.iter())
    }
}

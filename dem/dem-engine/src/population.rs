//! Populations: homogeneous collections of bodies.

use hashbrown::HashMap;

use dem_body::{RigidBody, TriSurface};
use dem_exchange::BodyRecord;
use dem_types::{BodyKey, DemError, KinematicState, PopulationId, RankId, Residency};

/// All bodies of one kind resident on this rank.
///
/// A population couples a validated configuration with a prototype surface:
/// every member is an instance of the prototype at its own scale, pose and
/// velocity, which is what lets migration ship thirteen scalars instead of
/// a mesh.
#[derive(Debug, Clone)]
pub struct Population {
    id: PopulationId,
    config: dem_types::PopulationConfig,
    prototype: TriSurface,
    bodies: HashMap<BodyKey, RigidBody>,
    next_local: u64,
}

impl Population {
    /// Create an empty population.
    ///
    /// The prototype surface must be centered on its own center of gravity;
    /// point-particle populations may pass an empty surface.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn new(
        id: PopulationId,
        config: dem_types::PopulationConfig,
        prototype: TriSurface,
    ) -> Result<Self, DemError> {
        config.validate(id)?;
        if !config.is_point_particle && prototype.face_count() == 0 {
            return Err(DemError::MissingParameter {
                population: id,
                name: "prototype surface",
            });
        }
        Ok(Self {
            id,
            config,
            prototype,
            bodies: HashMap::new(),
            next_local: 0,
        })
    }

    /// The population's identifier.
    #[must_use]
    pub const fn id(&self) -> PopulationId {
        self.id
    }

    /// The population's configuration.
    #[must_use]
    pub const fn config(&self) -> &dem_types::PopulationConfig {
        &self.config
    }

    /// The prototype surface.
    #[must_use]
    pub const fn prototype(&self) -> &TriSurface {
        &self.prototype
    }

    /// Number of resident bodies (authoritative and slaves).
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether no bodies are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Residency a new authoritative body of this population starts with.
    #[must_use]
    pub fn initial_residency(&self) -> Residency {
        if self.config.is_structure {
            Residency::Structure
        } else {
            Residency::Free
        }
    }

    /// Create a new body owned by `rank`, minting a fresh key.
    ///
    /// # Errors
    ///
    /// Fails if the prototype cannot be instantiated at the given state.
    pub fn inject(&mut self, rank: RankId, state: KinematicState) -> Result<BodyKey, DemError> {
        let key = BodyKey::new(rank, self.id, self.next_local);
        let body = self.instantiate(key, self.initial_residency(), state)?;
        self.next_local += 1;
        self.bodies.insert(key, body);
        Ok(key)
    }

    /// Build a body of this population without inserting it.
    pub fn instantiate(
        &self,
        key: BodyKey,
        residency: Residency,
        state: KinematicState,
    ) -> Result<RigidBody, DemError> {
        if self.config.is_point_particle {
            let volume = state.scale.powi(3);
            RigidBody::point(key, residency, self.config.density * volume, state)
        } else {
            RigidBody::from_prototype(key, residency, &self.prototype, self.config.density, state)
        }
    }

    /// Insert or refresh a body from a wire record.
    ///
    /// Receipt is idempotent: a duplicate record leaves exactly one
    /// resident copy. A repeated receipt updates the existing body's state
    /// in place (ghost refresh) and adopts the given residency.
    ///
    /// # Errors
    ///
    /// Fails if a new body cannot be instantiated from the prototype.
    pub fn upsert_from_record(
        &mut self,
        record: &BodyRecord,
        residency: Residency,
    ) -> Result<(), DemError> {
        let state = record.to_state();
        if let Some(existing) = self.bodies.get_mut(&record.key) {
            // Move the existing geometry by the rigid delta instead of
            // re-instantiating the mesh.
            let snap = dem_body::BodySnapshot {
                state,
                forces: existing.forces,
            };
            existing.restore(&snap);
            existing.residency = residency;
        } else {
            let body = self.instantiate(record.key, residency, state)?;
            self.bodies.insert(record.key, body);
        }
        Ok(())
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, key: BodyKey) -> Option<&RigidBody> {
        self.bodies.get(&key)
    }

    /// Look up a body mutably.
    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut RigidBody> {
        self.bodies.get_mut(&key)
    }

    /// Remove a body, returning it.
    pub fn remove(&mut self, key: BodyKey) -> Option<RigidBody> {
        self.bodies.remove(&key)
    }

    /// Iterate over all resident bodies.
    pub fn iter(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.values()
    }

    /// Iterate mutably over all resident bodies.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RigidBody> {
        self.bodies.values_mut()
    }

    /// All resident keys.
    pub fn keys(&self) -> impl Iterator<Item = BodyKey> + '_ {
        self.bodies.keys().copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dem_types::PopulationConfig;
    use nalgebra::Point3;

    fn population() -> Population {
        Population::new(
            PopulationId::new(0),
            PopulationConfig::rigid_particle(1000.0).with_collision_distance(1.0),
            TriSurface::icosphere(1),
        )
        .unwrap()
    }

    #[test]
    fn injection_mints_sequential_keys() {
        let mut pop = population();
        let a = pop
            .inject(RankId::new(3), KinematicState::at_rest(Point3::origin()))
            .unwrap();
        let b = pop
            .inject(RankId::new(3), KinematicState::at_rest(Point3::origin()))
            .unwrap();
        assert_eq!(a.local, 0);
        assert_eq!(b.local, 1);
        assert_eq!(a.rank, RankId::new(3));
        assert_eq!(pop.len(), 2);
    }

    #[test]
    fn duplicate_receipt_is_idempotent() {
        let mut pop = population();
        let key = BodyKey::new(RankId::new(1), PopulationId::new(0), 5);
        let record = BodyRecord::from_state(key, &KinematicState::at_rest(Point3::origin()));

        pop.upsert_from_record(&record, Residency::Slave).unwrap();
        pop.upsert_from_record(&record, Residency::Slave).unwrap();

        assert_eq!(pop.len(), 1);
        assert_eq!(pop.body(key).unwrap().residency, Residency::Slave);
    }

    #[test]
    fn ghost_refresh_moves_the_existing_copy() {
        let mut pop = population();
        let key = BodyKey::new(RankId::new(1), PopulationId::new(0), 0);
        let first = BodyRecord::from_state(key, &KinematicState::at_rest(Point3::origin()));
        pop.upsert_from_record(&first, Residency::Slave).unwrap();

        let moved =
            BodyRecord::from_state(key, &KinematicState::at_rest(Point3::new(2.0, 0.0, 0.0)));
        pop.upsert_from_record(&moved, Residency::Slave).unwrap();

        let body = pop.body(key).unwrap();
        assert_eq!(pop.len(), 1);
        assert!((body.state.center.x - 2.0).abs() < 1e-9);
        // The geometry followed the state.
        assert!((body.aabb().center().x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn missing_prototype_is_a_setup_error() {
        let err = Population::new(
            PopulationId::new(2),
            PopulationConfig::rigid_particle(1000.0),
            TriSurface::empty(),
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn point_population_accepts_empty_prototype() {
        let mut pop = Population::new(
            PopulationId::new(1),
            PopulationConfig::point_particle(1000.0),
            TriSurface::empty(),
        )
        .unwrap();
        let key = pop
            .inject(RankId::new(0), KinematicState::at_rest(Point3::origin()))
            .unwrap();
        assert!(pop.body(key).unwrap().is_point());
    }
}

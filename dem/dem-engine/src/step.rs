//! The per-step orchestrator.
//!
//! One call to [`SimulationStep::advance`] runs a full engine step:
//!
//! 1. injection of new bodies (skipped on ranks that do not own the site),
//! 2. migration: residency transitions evaluated against the partition and
//!    records exchanged with the peers,
//! 3. collision resolution with energy matching,
//! 4. adhesion bookkeeping: over-stressed bonds broken, drifted bonds
//!    pruned,
//! 5. motion integration of everything the collision pass did not already
//!    move, agglomerates as rigid clusters,
//! 6. retention cull of bodies that left the physical domain.
//!
//! Flow-field coupling is the caller's business: run
//! [`map_bodies`](crate::mapping::map_bodies) and deposit fluid forces on
//! the bodies between steps.

use std::io::{Read, Write};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use dem_body::BodySnapshot;
use dem_contact::{ContactLawTable, ContactOracle, EdgePierceOracle};
use dem_exchange::{
    evaluate_transition, exchange_records, BodyRecord, ExchangeError, JournalRecord,
    PopulationJournal, RankJournal, Transition, Transport,
};
use dem_types::{BodyKey, DemError, KinematicState, PopulationId, RankId, Residency};

use crate::agglomerate::{reassign_contact_partners, Agglomerate};
use crate::collision::{prune_stale_partners, CollisionEngine};
use crate::world::ParticleWorld;

/// Any failure of a simulation step.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A model-level error: bad configuration, missing law, divergence.
    #[error(transparent)]
    Model(#[from] DemError),
    /// A rank-to-rank communication error.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// One body on the migration wire.
///
/// `ghost` distinguishes a master's boundary copy (the receiver holds it as
/// a `Slave`) from an ownership handoff (the receiver adopts it as `Free`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct MigrationRecord {
    record: BodyRecord,
    ghost: bool,
}

/// A source of new bodies, polled once per step.
pub trait Injector {
    /// Bodies to create this step. Every rank polls the same injectors;
    /// only the rank owning an emission site instantiates the body.
    fn emit(&mut self, step: u64, time: f64) -> Vec<(PopulationId, KinematicState)>;
}

impl<F> Injector for F
where
    F: FnMut(u64, f64) -> Vec<(PopulationId, KinematicState)>,
{
    fn emit(&mut self, step: u64, time: f64) -> Vec<(PopulationId, KinematicState)> {
        self(step, time)
    }
}

/// A restorable point-in-time copy of the rank's bodies.
struct Checkpoint {
    step: u64,
    time: f64,
    snapshots: HashMap<BodyKey, BodySnapshot>,
}

/// The top-level engine: world, laws, collision resolver, transport.
pub struct SimulationStep<T, O = EdgePierceOracle> {
    world: ParticleWorld,
    laws: ContactLawTable,
    engine: CollisionEngine<O>,
    transport: T,
    injectors: Vec<Box<dyn Injector>>,
    relaxation: f64,
    step: u64,
    time: f64,
    checkpoint: Option<Checkpoint>,
}

impl<T: Transport> SimulationStep<T> {
    /// Create an engine with the exact edge-piercing contact oracle.
    pub fn new(world: ParticleWorld, laws: ContactLawTable, transport: T) -> Self {
        Self::with_oracle(world, laws, transport, EdgePierceOracle::default())
    }
}

impl<T: Transport, O: ContactOracle> SimulationStep<T, O> {
    /// Create an engine around a custom contact oracle.
    pub fn with_oracle(
        world: ParticleWorld,
        laws: ContactLawTable,
        transport: T,
        oracle: O,
    ) -> Self {
        Self {
            world,
            laws,
            engine: CollisionEngine::new(oracle),
            transport,
            injectors: Vec::new(),
            relaxation: 1.0,
            step: 0,
            time: 0.0,
            checkpoint: None,
        }
    }

    /// Under-relax velocity increments by the given factor.
    #[must_use]
    pub fn with_relaxation(mut self, relaxation: f64) -> Self {
        self.relaxation = relaxation;
        self
    }

    /// Register a body source.
    pub fn add_injector(&mut self, injector: Box<dyn Injector>) {
        self.injectors.push(injector);
    }

    /// The rank-local world.
    #[must_use]
    pub const fn world(&self) -> &ParticleWorld {
        &self.world
    }

    /// The rank-local world, mutably (force deposition between steps).
    pub fn world_mut(&mut self) -> &mut ParticleWorld {
        &mut self.world
    }

    /// The communicator.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Completed step count.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Simulated time (s).
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Run one full step.
    ///
    /// # Errors
    ///
    /// Fails on communication errors, a missing contact law, or a diverged
    /// (non-finite) body state.
    pub fn advance(&mut self) -> Result<(), EngineError> {
        self.inject_bodies()?;
        self.migrate()?;

        let moved = self
            .engine
            .resolve(&mut self.world, &self.laws, self.relaxation)?;
        reassign_contact_partners(&mut self.world, &self.laws);
        prune_stale_partners(&mut self.world);

        self.move_all(&moved)?;
        self.cull_escaped();

        self.step += 1;
        self.time += self.world.config().timestep;
        Ok(())
    }

    fn inject_bodies(&mut self) -> Result<(), EngineError> {
        let my_rank = self.world.rank();
        let mut emissions = Vec::new();
        for injector in &mut self.injectors {
            emissions.extend(injector.emit(self.step, self.time));
        }
        for (population, state) in emissions {
            if self.world.partition().owner_at(&state.center) == Some(my_rank) {
                let key = self.world.inject(population, state)?;
                tracing::debug!(body = %key, "injected");
            }
        }
        Ok(())
    }

    /// Evaluate residency transitions and exchange the records.
    fn migrate(&mut self) -> Result<(), EngineError> {
        let size = self.transport.size();
        let my_rank = self.world.rank();
        let retain_orphans = self.world.config().retain_orphans;

        enum Action {
            Become(Residency),
            Remove,
            Keep,
        }

        let mut outgoing: Vec<Vec<MigrationRecord>> = vec![Vec::new(); size];
        let mut actions: Vec<(BodyKey, Action)> = Vec::new();

        for body in self.world.bodies() {
            let key = body.key();
            let partition = self.world.partition();
            let cell = partition.world_to_cell(&body.state.center);
            let owner = partition.owner(cell);
            // Ghost as far as the body can reach: a body whose collision
            // distance spans several cells must be known to every rank it
            // may touch, not just the ones one cell away.
            let reach = self
                .world
                .population(key.population)
                .map_or(0.0, |p| body.scaled_distance(p.config().collision_distance));
            #[allow(clippy::cast_possible_truncation)]
            let radius = (reach / partition.cell_size()).ceil().max(1.0) as i32;
            let near_boundary = partition.is_near_boundary(cell, radius, my_rank);
            let neighbors = partition.neighbor_ranks(cell, radius, my_rank);

            match evaluate_transition(body.residency, my_rank, owner, near_boundary, &neighbors)
            {
                Transition::Stay => {}
                Transition::BecomeFree => actions.push((key, Action::Become(Residency::Free))),
                Transition::BecomeMaster { ghosts } => {
                    let record = BodyRecord::from_state(key, &body.state);
                    for rank in ghosts {
                        if let Some(queue) = outgoing.get_mut(rank.raw() as usize) {
                            queue.push(MigrationRecord {
                                record,
                                ghost: true,
                            });
                        }
                    }
                    actions.push((key, Action::Become(Residency::Master)));
                }
                Transition::Handoff { to } => {
                    let record = BodyRecord::from_state(key, &body.state);
                    if let Some(queue) = outgoing.get_mut(to.raw() as usize) {
                        queue.push(MigrationRecord {
                            record,
                            ghost: false,
                        });
                    }
                    actions.push((key, Action::Remove));
                }
                Transition::Discard => actions.push((key, Action::Remove)),
                Transition::Orphaned => {
                    if !retain_orphans {
                        tracing::debug!(body = %key, "orphaned, deleting");
                        actions.push((key, Action::Remove));
                    } else if my_rank == RankId::new(0) {
                        actions.push((key, Action::Keep));
                    } else {
                        // Orphans are collected on rank 0.
                        let record = BodyRecord::from_state(key, &body.state);
                        if let Some(queue) = outgoing.first_mut() {
                            queue.push(MigrationRecord {
                                record,
                                ghost: false,
                            });
                        }
                        actions.push((key, Action::Remove));
                    }
                }
            }
        }

        for (key, action) in actions {
            match action {
                Action::Become(residency) => {
                    if let Some(body) = self.world.body_mut(key) {
                        body.residency = residency;
                    }
                }
                Action::Remove => {
                    self.world.remove_body(key);
                }
                Action::Keep => {}
            }
        }

        let incoming = exchange_records(&self.transport, outgoing)?;
        for records in incoming {
            for migration in records {
                let residency = if migration.ghost {
                    Residency::Slave
                } else {
                    Residency::Free
                };
                let population = migration.record.key.population;
                self.world
                    .population_mut(population)
                    .ok_or(DemError::MissingParameter {
                        population,
                        name: "population",
                    })?
                    .upsert_from_record(&migration.record, residency)?;
            }
        }
        Ok(())
    }

    /// Integrate everything the collision pass did not already move.
    /// Bonded clusters step as rigid agglomerates, loners individually.
    fn move_all(&mut self, already_moved: &[BodyKey]) -> Result<(), EngineError> {
        let dt = self.world.config().timestep;
        let mut done: HashSet<BodyKey> = already_moved.iter().copied().collect();

        for key in self.world.all_keys() {
            if done.contains(&key) {
                continue;
            }
            let Some(body) = self.world.body(key) else { continue };
            if body.partners.is_empty() {
                done.insert(key);
                if let Some(body) = self.world.body_mut(key) {
                    body.integrate_motion(dt, self.relaxation);
                }
                continue;
            }
            let mut cluster = Agglomerate::collect(&self.world, key);
            for &member in cluster.members() {
                done.insert(member);
            }
            cluster.advance(&mut self.world, dt, self.relaxation);
        }

        for body in self.world.bodies() {
            if !body.state.is_finite() {
                return Err(DemError::diverged(format!(
                    "body {} has a non-finite state after integration",
                    body.key()
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Remove bodies whose center left the retention bounds.
    fn cull_escaped(&mut self) {
        let Some(bounds) = self.world.config().retention_bounds else {
            return;
        };
        let escaped: Vec<BodyKey> = self
            .world
            .bodies()
            .filter(|b| !bounds.contains(&b.state.center))
            .map(dem_body::RigidBody::key)
            .collect();
        for key in escaped {
            tracing::debug!(body = %key, "left the retention bounds, removing");
            self.world.remove_body(key);
        }
    }

    /// Capture a restorable copy of every resident body.
    pub fn checkpoint(&mut self) {
        self.checkpoint = Some(Checkpoint {
            step: self.step,
            time: self.time,
            snapshots: self
                .world
                .bodies()
                .map(|b| (b.key(), b.snapshot()))
                .collect(),
        });
    }

    /// Roll back to the last checkpoint. Bodies created since are removed;
    /// bodies removed since stay removed. Returns `false` without one.
    pub fn restore_checkpoint(&mut self) -> bool {
        let Some(checkpoint) = &self.checkpoint else {
            return false;
        };
        let created: Vec<BodyKey> = self
            .world
            .all_keys()
            .into_iter()
            .filter(|k| !checkpoint.snapshots.contains_key(k))
            .collect();
        for key in created {
            self.world.remove_body(key);
        }
        for (key, snapshot) in &checkpoint.snapshots {
            if let Some(body) = self.world.body_mut(*key) {
                body.restore(snapshot);
            }
        }
        self.step = checkpoint.step;
        self.time = checkpoint.time;
        true
    }

    /// Write this rank's authoritative bodies as a JSON journal.
    ///
    /// # Errors
    ///
    /// Fails on serialization or I/O errors.
    pub fn write_journal<W: Write>(&self, writer: W) -> Result<(), EngineError> {
        let populations = self
            .world
            .populations()
            .map(|p| PopulationJournal {
                population: p.id(),
                bodies: p
                    .iter()
                    .filter(|b| b.residency.is_authoritative())
                    .map(|b| {
                        JournalRecord::from_record(&BodyRecord::from_state(b.key(), &b.state))
                    })
                    .collect(),
            })
            .collect();
        let journal = RankJournal {
            rank: self.world.rank(),
            step: self.step,
            time: self.time,
            populations,
        };
        journal.write_to(writer)?;
        Ok(())
    }

    /// Recreate bodies from a journal written by [`write_journal`].
    ///
    /// Bodies keep their original keys; the journal's step and time are
    /// adopted.
    ///
    /// # Errors
    ///
    /// Fails on malformed journal entries or unknown populations.
    pub fn restore_from_journal<R: Read>(&mut self, reader: R) -> Result<(), EngineError> {
        let journal = RankJournal::read_from(reader)?;
        for entry in &journal.populations {
            let population = self.world.population_mut(entry.population).ok_or(
                DemError::MissingParameter {
                    population: entry.population,
                    name: "population",
                },
            )?;
            let residency = population.initial_residency();
            for body in &entry.bodies {
                let record = body.to_record()?;
                population.upsert_from_record(&record, residency)?;
            }
        }
        self.step = journal.step;
        self.time = journal.time;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dem_body::TriSurface;
    use dem_contact::{ContactLaw, ContactLawTableBuilder};
    use dem_exchange::{LocalCluster, SoloTransport};
    use dem_spatial::SpatialPartition;
    use dem_types::{Aabb, ContactPartner, EngineConfig, PopulationConfig};
    use nalgebra::{Point3, Vector3};

    fn solo_engine(config: EngineConfig) -> (SimulationStep<SoloTransport>, PopulationId) {
        let mut partition = SpatialPartition::try_new(1.0, Point3::origin()).unwrap();
        partition.mark_extent(
            &Aabb::new(Point3::origin(), Point3::new(10.0, 10.0, 10.0)),
            RankId::new(0),
        );
        let mut world = ParticleWorld::new(RankId::new(0), config, partition).unwrap();
        let pop = world
            .add_population(
                PopulationConfig::rigid_particle(1000.0).with_collision_distance(1.0),
                TriSurface::cuboid(0.5, 0.5, 0.5),
            )
            .unwrap();
        let laws = ContactLawTableBuilder::new()
            .with_default_law(&[pop], ContactLaw::dry_elastic())
            .build(&[pop])
            .unwrap();
        (
            SimulationStep::new(world, laws, SoloTransport),
            pop,
        )
    }

    #[test]
    fn free_body_advances_ballistically() {
        let (mut engine, pop) = solo_engine(EngineConfig::aerosol(0.5, 1.0));
        engine
            .world_mut()
            .inject(
                pop,
                KinematicState::moving(Point3::new(2.0, 2.0, 2.0), Vector3::x()),
            )
            .unwrap();

        engine.advance().unwrap();
        engine.advance().unwrap();

        assert_eq!(engine.step(), 2);
        assert_relative_eq!(engine.time(), 1.0, epsilon = 1e-12);
        let key = engine.world().all_keys()[0];
        assert_relative_eq!(
            engine.world().body(key).unwrap().state.center.x,
            3.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn injector_fires_only_on_the_owning_rank() {
        let (mut engine, pop) = solo_engine(EngineConfig::aerosol(0.5, 1.0));
        engine.add_injector(Box::new(move |step: u64, _time: f64| {
            if step == 0 {
                vec![
                    // Owned by rank 0.
                    (pop, KinematicState::at_rest(Point3::new(5.0, 5.0, 5.0))),
                    // In unowned space: nobody instantiates it.
                    (pop, KinematicState::at_rest(Point3::new(50.0, 5.0, 5.0))),
                ]
            } else {
                Vec::new()
            }
        }));

        engine.advance().unwrap();
        assert_eq!(engine.world().body_count(), 1);
        engine.advance().unwrap();
        assert_eq!(engine.world().body_count(), 1);
    }

    #[test]
    fn orphaned_body_is_deleted() {
        let (mut engine, pop) = solo_engine(EngineConfig::aerosol(0.5, 1.0));
        // Inject inside the domain, flying out of it.
        engine
            .world_mut()
            .inject(
                pop,
                KinematicState::moving(Point3::new(9.5, 5.0, 5.0), Vector3::x() * 20.0),
            )
            .unwrap();

        engine.advance().unwrap(); // moves to x = 19.5, outside owned cells
        engine.advance().unwrap(); // migration orphans and deletes it
        assert_eq!(engine.world().body_count(), 0);
    }

    #[test]
    fn escaped_body_leaves_no_dangling_bonds() {
        let config = EngineConfig::aerosol(0.5, 1.0).with_retention_bounds(Aabb::new(
            Point3::origin(),
            Point3::new(10.0, 10.0, 10.0),
        ));
        let (mut engine, pop) = solo_engine(config);
        let stay = engine
            .world_mut()
            .inject(pop, KinematicState::at_rest(Point3::new(2.0, 2.0, 2.0)))
            .unwrap();
        let flee = engine
            .world_mut()
            .inject(
                pop,
                KinematicState::moving(Point3::new(9.0, 2.0, 2.0), Vector3::x() * 10.0),
            )
            .unwrap();
        // Bond them; the cluster would normally move together, so break the
        // bond by distance first: give the bond a tiny area.
        for (from, to) in [(stay, flee), (flee, stay)] {
            engine.world_mut().body_mut(from).unwrap().partners.push(ContactPartner {
                key: to,
                contact_vector: Vector3::zeros(),
                normal: Vector3::x(),
                faces: (0, 0),
                area: 1e-12,
            });
        }

        engine.advance().unwrap();

        assert!(engine.world().body(flee).is_none());
        let survivor = engine.world().body(stay).unwrap();
        assert!(survivor.partners.is_empty());
    }

    #[test]
    fn checkpoint_rolls_back_bodies_and_clock() {
        let (mut engine, pop) = solo_engine(EngineConfig::aerosol(0.5, 1.0));
        engine
            .world_mut()
            .inject(
                pop,
                KinematicState::moving(Point3::new(2.0, 2.0, 2.0), Vector3::x()),
            )
            .unwrap();

        engine.checkpoint();
        engine.advance().unwrap();
        engine
            .world_mut()
            .inject(pop, KinematicState::at_rest(Point3::new(5.0, 5.0, 5.0)))
            .unwrap();

        assert!(engine.restore_checkpoint());
        assert_eq!(engine.step(), 0);
        assert_eq!(engine.world().body_count(), 1);
        let key = engine.world().all_keys()[0];
        assert_relative_eq!(
            engine.world().body(key).unwrap().state.center.x,
            2.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn journal_round_trip_recreates_bodies() {
        let (mut engine, pop) = solo_engine(EngineConfig::aerosol(0.5, 1.0));
        engine
            .world_mut()
            .inject(
                pop,
                KinematicState::moving(Point3::new(3.0, 4.0, 5.0), Vector3::y()),
            )
            .unwrap();
        engine.advance().unwrap();

        let mut buffer = Vec::new();
        engine.write_journal(&mut buffer).unwrap();

        let (mut fresh, _) = solo_engine(EngineConfig::aerosol(0.5, 1.0));
        fresh.restore_from_journal(buffer.as_slice()).unwrap();

        assert_eq!(fresh.step(), 1);
        assert_eq!(fresh.world().body_count(), 1);
        let key = fresh.world().all_keys()[0];
        assert_relative_eq!(
            fresh.world().body(key).unwrap().state.center.y,
            4.5,
            epsilon = 1e-9
        );
    }

    /// Two ranks split the domain at x = 5; each rank builds the same
    /// global partition.
    fn two_rank_world(rank: RankId) -> (ParticleWorld, PopulationId) {
        two_rank_world_with_reach(rank, 1.0)
    }

    fn two_rank_world_with_reach(
        rank: RankId,
        collision_distance: f64,
    ) -> (ParticleWorld, PopulationId) {
        let mut partition = SpatialPartition::try_new(1.0, Point3::origin()).unwrap();
        partition.mark_extent(
            &Aabb::new(Point3::origin(), Point3::new(4.9, 10.0, 10.0)),
            RankId::new(0),
        );
        partition.mark_extent(
            &Aabb::new(Point3::new(5.1, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0)),
            RankId::new(1),
        );
        let mut world =
            ParticleWorld::new(rank, EngineConfig::aerosol(0.5, 1.0), partition).unwrap();
        let pop = world
            .add_population(
                PopulationConfig::rigid_particle(1000.0)
                    .with_collision_distance(collision_distance),
                TriSurface::cuboid(0.5, 0.5, 0.5),
            )
            .unwrap();
        (world, pop)
    }

    fn two_rank_laws(pop: PopulationId) -> ContactLawTable {
        ContactLawTableBuilder::new()
            .with_default_law(&[pop], ContactLaw::dry_elastic())
            .build(&[pop])
            .unwrap()
    }

    #[test]
    fn handoff_moves_ownership_across_ranks() {
        let counts = LocalCluster::run(2, |transport| {
            let rank = transport.rank();
            let (mut world, pop) = two_rank_world(rank);
            if rank == RankId::new(0) {
                // Sits deep inside rank 1's territory.
                world
                    .inject(pop, KinematicState::at_rest(Point3::new(8.0, 8.0, 8.0)))
                    .unwrap();
            }
            let mut engine = SimulationStep::new(world, two_rank_laws(pop), transport);
            engine.advance().unwrap();
            engine.world().body_count()
        });
        assert_eq!(counts, vec![0, 1]);
    }

    #[test]
    fn boundary_master_ghosts_a_slave_to_the_neighbor() {
        let outcomes = LocalCluster::run(2, |transport| {
            let rank = transport.rank();
            let (mut world, pop) = two_rank_world(rank);
            if rank == RankId::new(0) {
                // One cell away from rank 1's territory.
                world
                    .inject(pop, KinematicState::at_rest(Point3::new(4.5, 5.0, 5.0)))
                    .unwrap();
            }
            let mut engine = SimulationStep::new(world, two_rank_laws(pop), transport);
            engine.advance().unwrap();
            engine
                .world()
                .bodies()
                .map(|b| b.residency)
                .collect::<Vec<_>>()
        });
        assert_eq!(outcomes[0], vec![Residency::Master]);
        assert_eq!(outcomes[1], vec![Residency::Slave]);
    }

    #[test]
    fn wide_bodies_ghost_beyond_the_adjacent_cell() {
        let outcomes = LocalCluster::run(2, |transport| {
            let rank = transport.rank();
            // Collision reach of two cells.
            let (mut world, pop) = two_rank_world_with_reach(rank, 2.0);
            if rank == RankId::new(0) {
                // Two cells short of rank 1's territory: interior to a
                // one-cell scan, but within the body's collision reach.
                world
                    .inject(pop, KinematicState::at_rest(Point3::new(3.5, 5.0, 5.0)))
                    .unwrap();
            }
            let mut engine = SimulationStep::new(world, two_rank_laws(pop), transport);
            engine.advance().unwrap();
            engine
                .world()
                .bodies()
                .map(|b| b.residency)
                .collect::<Vec<_>>()
        });
        assert_eq!(outcomes[0], vec![Residency::Master]);
        assert_eq!(outcomes[1], vec![Residency::Slave]);
    }

    #[test]
    fn slave_is_rebuilt_not_duplicated_each_step() {
        let counts = LocalCluster::run(2, |transport| {
            let rank = transport.rank();
            let (mut world, pop) = two_rank_world(rank);
            if rank == RankId::new(0) {
                world
                    .inject(pop, KinematicState::at_rest(Point3::new(4.5, 5.0, 5.0)))
                    .unwrap();
            }
            let mut engine = SimulationStep::new(world, two_rank_laws(pop), transport);
            for _ in 0..3 {
                engine.advance().unwrap();
            }
            engine.world().body_count()
        });
        // The master stays one body on rank 0; rank 1 holds exactly one
        // slave copy no matter how often it was ghosted.
        assert_eq!(counts, vec![1, 1]);
    }
}

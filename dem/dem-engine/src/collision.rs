//! Collision resolution with energy-matched impulsive forces.
//!
//! For every intersecting candidate pair the engine estimates an impulsive
//! contact force from the closing speed and the pair's effective mass at
//! the contact point, rotational inertia about the lever arms included,
//! then searches for the scale factor that leaves the pair (and any
//! agglomerates they belong to) with the fraction of kinetic energy the
//! contact law prescribes. The search is a bisection over the scale factor:
//! a factor of 1 is the fully inelastic fixed point, a factor of 2 restores
//! an elastic head-on impact exactly.
//!
//! After the accepted force is committed, a pair that has just separated
//! under an adhesive law is bonded: both bodies record each other as
//! contact partners and move as one agglomerate from the next step on.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};

use dem_body::{BodySnapshot, RigidBody};
use dem_contact::{ContactLawTable, ContactOracle, EdgePierceOracle};
use dem_types::{
    BodyKey, ContactCandidate, ContactKinematics, ContactPartner, ContactPhase, DemError,
    ForceSource,
};

use crate::agglomerate::Agglomerate;
use crate::prune;
use crate::world::ParticleWorld;

/// Contact patch summary of one side of a colliding pair.
struct SideSummary {
    /// Duplicate-free contacting faces with their areas.
    faces: Vec<(u32, f64)>,
    area: f64,
    centroid: Point3<f64>,
    /// Area-weighted outward normal (unnormalized).
    normal: Vector3<f64>,
    /// Material velocity at the patch centroid.
    velocity: Vector3<f64>,
}

fn side_summary(body: &RigidBody, faces: impl IntoIterator<Item = u32>) -> Option<SideSummary> {
    let mut seen: HashSet<u32> = HashSet::new();
    let mut list = Vec::new();
    let mut area = 0.0;
    let mut weighted_centroid = Vector3::zeros();
    let mut weighted_normal = Vector3::zeros();

    for face in faces {
        if !seen.insert(face) {
            continue;
        }
        let face_area = body.surface().face_area(face);
        if face_area <= 0.0 {
            continue;
        }
        area += face_area;
        weighted_centroid += body.surface().face_centroid(face).coords * face_area;
        // The unnormalized face normal has magnitude 2 × area.
        weighted_normal += body.surface().face_normal_unnormalized(face) * 0.5;
        list.push((face, face_area));
    }
    if area <= 0.0 {
        return None;
    }
    let centroid = Point3::from(weighted_centroid / area);
    let velocity = body.state.velocity_at_offset(&(centroid - body.state.center));
    Some(SideSummary {
        faces: list,
        area,
        centroid,
        normal: weighted_normal,
        velocity,
    })
}

/// Everything needed to apply the pair's contact force at any scale.
struct PairGeometry {
    /// Unit contact normal, pointing from body a toward body b.
    normal: Vector3<f64>,
    /// Unit sliding direction of b relative to a (zero when not sliding).
    tangent: Vector3<f64>,
    /// Unscaled normal force magnitude (N).
    magnitude: f64,
    friction: f64,
    faces_a: Vec<(u32, f64)>,
    faces_b: Vec<(u32, f64)>,
    area_a: f64,
    area_b: f64,
    contact_point: Point3<f64>,
    /// Relative kinematics of the contact frame at detection time.
    kinematics: ContactKinematics,
    /// The oracle's raw intersecting face pairs.
    pairs: Vec<(u32, u32)>,
    first_pair: (u32, u32),
}

/// Normalized candidate-table key.
type CandidateKey = ((BodyKey, u32), (BodyKey, u32));

/// Collision resolver, generic over the surface intersection oracle.
///
/// The engine keeps a rank-local table of [`ContactCandidate`] face pairs:
/// pairs a resolution applied force through are Established, pairs that
/// stopped intersecting are Released for one step, then discarded.
pub struct CollisionEngine<O = EdgePierceOracle> {
    oracle: O,
    candidates: HashMap<CandidateKey, ContactCandidate>,
}

impl Default for CollisionEngine<EdgePierceOracle> {
    fn default() -> Self {
        Self::new(EdgePierceOracle::default())
    }
}

impl<O: ContactOracle> CollisionEngine<O> {
    /// Create a resolver around the given oracle.
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            candidates: HashMap::new(),
        }
    }

    /// Face-pair contacts currently tracked on this rank.
    pub fn candidates(&self) -> impl Iterator<Item = &ContactCandidate> {
        self.candidates.values()
    }

    /// Resolve all intersecting candidate pairs on this rank.
    ///
    /// Bodies that were integrated as part of a collision are returned so
    /// the regular motion pass can skip them; a body takes part in at most
    /// one collision per step.
    ///
    /// # Errors
    ///
    /// Fails if a colliding pair has no registered contact law.
    pub fn resolve(
        &mut self,
        world: &mut ParticleWorld,
        laws: &ContactLawTable,
        relaxation: f64,
    ) -> Result<Vec<BodyKey>, DemError> {
        let dt = world.config().timestep;
        let tolerance = world.config().energy_tolerance;
        let iteration_cap = world.config().energy_iteration_cap;
        let f_max = world.config().force_scale_max;

        let mut moved: Vec<BodyKey> = Vec::new();
        let mut moved_set: HashSet<BodyKey> = HashSet::new();
        let mut touched: HashSet<CandidateKey> = HashSet::new();

        for (ka, kb) in prune::candidate_pairs(world) {
            if moved_set.contains(&ka) || moved_set.contains(&kb) {
                continue;
            }
            let Some(mut geometry) = self.pair_geometry(world, ka, kb) else {
                continue;
            };
            let law = *laws.require(ka.population, kb.population)?;
            geometry.friction = law.friction;

            let cluster_a = Agglomerate::collect(world, ka);
            if cluster_a.contains(kb) {
                // Already bonded into the same agglomerate.
                continue;
            }
            let cluster_b = Agglomerate::collect(world, kb);

            let old_ke = cluster_a.kinetic_energy(world) + cluster_b.kinetic_energy(world);
            if old_ke <= 0.0 {
                continue;
            }
            let target = old_ke * law.energy_conservation;

            // Snapshot every body the trial steps can touch, including
            // structures that only receive forces.
            let mut snapshot_keys: Vec<BodyKey> = cluster_a
                .members()
                .iter()
                .chain(cluster_b.members())
                .copied()
                .collect();
            for key in [ka, kb] {
                if !snapshot_keys.contains(&key) {
                    snapshot_keys.push(key);
                }
            }
            let snapshots: Vec<(BodyKey, BodySnapshot)> = snapshot_keys
                .iter()
                .filter_map(|&k| world.body(k).map(|b| (k, b.snapshot())))
                .collect();

            let trial = |world: &mut ParticleWorld, factor: f64| -> f64 {
                restore_all(world, &snapshots);
                apply_pair_forces(world, ka, kb, &geometry, factor);
                let mut ca = cluster_a.clone();
                let mut cb = cluster_b.clone();
                ca.advance(world, dt, relaxation);
                cb.advance(world, dt, relaxation);
                ca.kinetic_energy(world) + cb.kinetic_energy(world)
            };

            let mut lo = 0.0;
            let mut hi = f_max;
            let mut best_factor = 0.5 * f_max;
            let mut best_error = f64::INFINITY;
            let mut accepted = false;
            for _ in 0..iteration_cap {
                let factor = 0.5 * (lo + hi);
                let new_ke = trial(world, factor);
                tracing::trace!(body_a = %ka, body_b = %kb, factor, new_ke, target, "energy trial");
                let error = (new_ke - target).abs();
                if error < best_error {
                    best_error = error;
                    best_factor = factor;
                }
                if error <= tolerance * old_ke {
                    accepted = true;
                    break;
                }
                if new_ke > target {
                    hi = factor;
                } else {
                    lo = factor;
                }
            }
            if !accepted {
                // The target is unreachable (it lies below the inelastic
                // minimum). Commit a damped version of the closest trial.
                let factor = 0.5 * best_factor;
                tracing::warn!(
                    body_a = %ka,
                    body_b = %kb,
                    best_factor,
                    relative_error = best_error / old_ke,
                    "energy search did not converge, committing damped force"
                );
                trial(world, factor);
            }

            // The pair bonds if it has just separated under an adhesive law.
            let separated = {
                let (Some(a), Some(b)) = (world.body(ka), world.body(kb)) else {
                    continue;
                };
                self.oracle
                    .intersecting_pairs(a.surface(), b.surface())
                    .is_empty()
            };
            if separated && law.is_adhesive() {
                register_bond(world, ka, kb, &geometry);
            }

            if let (Some(a), Some(b)) = (world.body(ka), world.body(kb)) {
                for &(fa, fb) in &geometry.pairs {
                    let area = 0.5 * (a.surface().face_area(fa) + b.surface().face_area(fb));
                    let key = ContactCandidate::normalize((ka, fa), (kb, fb));
                    let entry = self
                        .candidates
                        .entry(key)
                        .or_insert_with(|| ContactCandidate::new((ka, fa), (kb, fb), area));
                    entry.area = area;
                    entry.kinematics = geometry.kinematics;
                    entry.phase = ContactPhase::Established;
                    touched.insert(key);
                }
            }

            for &key in cluster_a.members().iter().chain(cluster_b.members()) {
                if moved_set.insert(key) {
                    moved.push(key);
                }
            }
        }

        self.sweep_candidates(world, &touched);
        Ok(moved)
    }

    /// Refresh untouched candidates and retire the ones that drifted away.
    fn sweep_candidates(&mut self, world: &ParticleWorld, touched: &HashSet<CandidateKey>) {
        let factor = world.config().contact_radius_factor;
        self.candidates.retain(|key, candidate| {
            if touched.contains(key) {
                return true;
            }
            let ((ka, fa), (kb, fb)) = *key;
            let (Some(a), Some(b)) = (world.body(ka), world.body(kb)) else {
                return false;
            };

            let ca = a.surface().face_centroid(fa);
            let cb = b.surface().face_centroid(fb);
            let offset = cb - ca;
            candidate.kinematics.normal_distance = offset.norm();
            if let Some(direction) = offset.try_normalize(f64::EPSILON) {
                let relative = b.state.velocity_at_offset(&(cb - b.state.center))
                    - a.state.velocity_at_offset(&(ca - a.state.center));
                candidate.kinematics.normal_velocity = -relative.dot(&direction);
                candidate.kinematics.tangential_velocity =
                    (relative - direction * relative.dot(&direction)).norm();
            }

            match candidate.phase {
                ContactPhase::Established => {
                    candidate.phase = ContactPhase::Released;
                    true
                }
                ContactPhase::Released => false,
                ContactPhase::Candidate => !candidate.is_stale(factor),
            }
        });
    }

    /// Intersect the pair and summarize the contact, or `None` when the
    /// surfaces do not intersect or the pair is not approaching.
    fn pair_geometry(
        &self,
        world: &ParticleWorld,
        ka: BodyKey,
        kb: BodyKey,
    ) -> Option<PairGeometry> {
        let a = world.body(ka)?;
        let b = world.body(kb)?;
        let face_pairs = self.oracle.intersecting_pairs(a.surface(), b.surface());
        let first_pair = *face_pairs.first()?;

        let side_a = side_summary(a, face_pairs.iter().map(|&(fa, _)| fa))?;
        let side_b = side_summary(b, face_pairs.iter().map(|&(_, fb)| fb))?;

        let between = b.state.center - a.state.center;
        let mut normal = side_a
            .normal
            .try_normalize(f64::EPSILON)
            .or_else(|| between.try_normalize(f64::EPSILON))
            .or_else(|| {
                tracing::warn!(
                    body_a = %ka,
                    body_b = %kb,
                    "degenerate contact normal, borrowing an existing bond normal"
                );
                a.partners
                    .first()
                    .and_then(|p| p.normal.try_normalize(f64::EPSILON))
            })?;
        if normal.dot(&between) < 0.0 {
            normal = -normal;
        }

        let relative = side_b.velocity - side_a.velocity;
        let closing = -relative.dot(&normal);
        if closing <= 0.0 {
            return None;
        }
        let sliding = relative - normal * relative.dot(&normal);
        let tangent = sliding
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros);

        let centroid_offset = side_b.centroid - side_a.centroid;
        let kinematics = ContactKinematics {
            normal_distance: centroid_offset.dot(&normal),
            tangential_distance: (centroid_offset - normal * centroid_offset.dot(&normal))
                .norm(),
            normal_velocity: closing,
            tangential_velocity: sliding.norm(),
        };

        let contact_point = Point3::from((side_a.centroid.coords + side_b.centroid.coords) * 0.5);

        // Effective mass of the equivalent point collision at the contact
        // point: translational inertia plus, for each mobile side, the
        // rotational inertia about its lever arm. A head-on impact through
        // the line of centers reduces this to the plain reduced mass.
        let inverse_inertia = |body: &RigidBody| -> f64 {
            if body.residency.is_structure() {
                return 0.0;
            }
            let lever = contact_point - body.state.center;
            let angular = body.inertia().try_inverse().map_or(0.0, |inv| {
                normal.dot(&(inv * lever.cross(&normal)).cross(&lever))
            });
            1.0 / body.mass() + angular
        };
        let inverse_mass = inverse_inertia(a) + inverse_inertia(b);
        if inverse_mass <= 0.0 {
            return None;
        }
        // Impulse over the impact converted to a per-step force; the impact
        // time cancels against the step length.
        let magnitude = closing / (inverse_mass * world.config().timestep);
        Some(PairGeometry {
            normal,
            tangent,
            magnitude,
            // Overwritten with the pair's law before any force is applied.
            friction: 0.0,
            faces_a: side_a.faces,
            faces_b: side_b.faces,
            area_a: side_a.area,
            area_b: side_b.area,
            contact_point,
            kinematics,
            pairs: face_pairs,
            first_pair,
        })
    }
}

fn restore_all(world: &mut ParticleWorld, snapshots: &[(BodyKey, BodySnapshot)]) {
    for (key, snapshot) in snapshots {
        if let Some(body) = world.body_mut(*key) {
            body.restore(snapshot);
        }
    }
}

/// Distribute the scaled contact force over the contacting faces of both
/// sides, area-proportionally, with Coulomb friction opposing the sliding.
fn apply_pair_forces(
    world: &mut ParticleWorld,
    ka: BodyKey,
    kb: BodyKey,
    geometry: &PairGeometry,
    factor: f64,
) {
    let normal_force = geometry.magnitude * factor;
    let friction_force = geometry.friction * normal_force;

    // On a: pushed away along -n, dragged along the relative sliding of b.
    let on_a = geometry.normal * (-normal_force) + geometry.tangent * friction_force;
    if let Some(a) = world.body_mut(ka) {
        for &(face, area) in &geometry.faces_a {
            a.apply_face_force(ForceSource::Contact, face, on_a * (area / geometry.area_a));
        }
    }
    let on_b = geometry.normal * normal_force - geometry.tangent * friction_force;
    if let Some(b) = world.body_mut(kb) {
        for &(face, area) in &geometry.faces_b {
            b.apply_face_force(ForceSource::Contact, face, on_b * (area / geometry.area_b));
        }
    }
}

/// Record the pair as adhered: symmetric partner entries, contact force
/// buckets zeroed so the bond is not double-counted next step.
fn register_bond(world: &mut ParticleWorld, ka: BodyKey, kb: BodyKey, geometry: &PairGeometry) {
    let area = 0.5 * (geometry.area_a + geometry.area_b);
    if let Some(a) = world.body_mut(ka) {
        a.partners.push(ContactPartner {
            key: kb,
            contact_vector: geometry.contact_point - a.state.center,
            normal: geometry.normal,
            faces: geometry.first_pair,
            area,
        });
        a.forces.clear_source(ForceSource::Contact);
    }
    if let Some(b) = world.body_mut(kb) {
        b.partners.push(ContactPartner {
            key: ka,
            contact_vector: geometry.contact_point - b.state.center,
            normal: -geometry.normal,
            faces: (geometry.first_pair.1, geometry.first_pair.0),
            area,
        });
        b.forces.clear_source(ForceSource::Contact);
    }
}

/// Drop partner bonds whose contact points have drifted apart further than
/// `contact_radius_factor × sqrt(bond area)`. Dangling bonds (partner no
/// longer resident) are dropped too.
pub fn prune_stale_partners(world: &mut ParticleWorld) {
    let factor = world.config().contact_radius_factor;
    let mut severed: Vec<(BodyKey, BodyKey)> = Vec::new();

    for body in world.bodies() {
        for partner in &body.partners {
            let own_point = body.state.center + partner.contact_vector;
            match world.body(partner.key) {
                Some(other) => {
                    let Some(back) = other.partners.iter().find(|p| p.key == body.key()) else {
                        severed.push((body.key(), partner.key));
                        continue;
                    };
                    let other_point = other.state.center + back.contact_vector;
                    let gap = (other_point - own_point).dot(&partner.normal);
                    if gap > factor * partner.area.max(0.0).sqrt() {
                        severed.push((body.key(), partner.key));
                    }
                }
                None => severed.push((body.key(), partner.key)),
            }
        }
    }

    for (a, b) in severed {
        if let Some(body) = world.body_mut(a) {
            body.forget_partner(b);
        }
        if let Some(body) = world.body_mut(b) {
            body.forget_partner(a);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dem_body::TriSurface;
    use dem_contact::{ContactLaw, ContactLawTableBuilder};
    use dem_spatial::SpatialPartition;
    use dem_types::{
        EngineConfig, KinematicState, PopulationConfig, PopulationId, RankId,
    };
    use std::cell::RefCell;

    /// Oracle stub that reports fixed face pairs for the first `hits`
    /// queries, then reports separation.
    struct FixedPairs {
        pairs: Vec<(u32, u32)>,
        hits: RefCell<usize>,
    }

    impl FixedPairs {
        fn always(pairs: Vec<(u32, u32)>) -> Self {
            Self {
                pairs,
                hits: RefCell::new(usize::MAX),
            }
        }

        fn once(pairs: Vec<(u32, u32)>) -> Self {
            Self {
                pairs,
                hits: RefCell::new(1),
            }
        }
    }

    impl ContactOracle for FixedPairs {
        fn intersecting_pairs(&self, _a: &TriSurface, _b: &TriSurface) -> Vec<(u32, u32)> {
            let mut hits = self.hits.borrow_mut();
            if *hits == 0 {
                return Vec::new();
            }
            *hits = hits.saturating_sub(1);
            self.pairs.clone()
        }
    }

    fn world() -> (ParticleWorld, PopulationId) {
        let partition = SpatialPartition::try_new(1.0, nalgebra::Point3::origin()).unwrap();
        let mut w = ParticleWorld::new(
            RankId::new(0),
            EngineConfig::aerosol(1e-3, 1.0),
            partition,
        )
        .unwrap();
        let pop = w
            .add_population(
                PopulationConfig::rigid_particle(1000.0)
                    .with_collision_distance(2.0)
                    .with_friction(0.0),
                TriSurface::cuboid(1.0, 1.0, 1.0),
            )
            .unwrap();
        (w, pop)
    }

    /// Cube faces whose outward normal points along +x / -x.
    fn facing_pairs(world: &ParticleWorld, ka: BodyKey, kb: BodyKey) -> Vec<(u32, u32)> {
        let a = world.body(ka).unwrap().surface();
        let b = world.body(kb).unwrap().surface();
        let fa: Vec<u32> =
            (0..12).filter(|&f| a.face_normal(f).unwrap().x > 0.9).collect();
        let fb: Vec<u32> =
            (0..12).filter(|&f| b.face_normal(f).unwrap().x < -0.9).collect();
        fa.into_iter().zip(fb).collect()
    }

    fn head_on(law: ContactLaw) -> (ParticleWorld, BodyKey, BodyKey, ContactLawTable, Vec<(u32, u32)>) {
        let (mut w, pop) = world();
        let a = w
            .inject(
                pop,
                KinematicState::moving(nalgebra::Point3::origin(), Vector3::x()),
            )
            .unwrap();
        let b = w
            .inject(
                pop,
                KinematicState::moving(nalgebra::Point3::new(1.05, 0.0, 0.0), -Vector3::x()),
            )
            .unwrap();
        let laws = ContactLawTableBuilder::new()
            .with_law(pop, pop, law)
            .build(&[pop])
            .unwrap();
        let pairs = facing_pairs(&w, a, b);
        (w, a, b, laws, pairs)
    }

    #[test]
    fn head_on_elastic_impact_reverses_velocities() {
        let law = ContactLaw::dry_elastic().with_friction(0.0);
        let (mut w, a, b, laws, pairs) = head_on(law);
        let mut engine = CollisionEngine::new(FixedPairs::always(pairs));

        let moved = engine.resolve(&mut w, &laws, 1.0).unwrap();

        assert_relative_eq!(w.body(a).unwrap().state.velocity.x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(w.body(b).unwrap().state.velocity.x, 1.0, epsilon = 1e-9);
        // Half-step displacement of a symmetric elastic impact is zero.
        assert_relative_eq!(w.body(a).unwrap().state.center.x, 0.0, epsilon = 1e-9);
        assert!(moved.contains(&a) && moved.contains(&b));
        // Still intersecting and non-adhesive: no bond.
        assert!(w.body(a).unwrap().partners.is_empty());
    }

    #[test]
    fn head_on_inelastic_impact_stops_both() {
        let law = ContactLaw::dry_elastic()
            .with_friction(0.0)
            .with_energy_conservation(0.0);
        let (mut w, a, b, laws, pairs) = head_on(law);
        let mut engine = CollisionEngine::new(FixedPairs::always(pairs));

        engine.resolve(&mut w, &laws, 1.0).unwrap();

        assert_relative_eq!(w.body(a).unwrap().state.velocity.norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(w.body(b).unwrap().state.velocity.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn partially_dissipative_impact_hits_the_energy_target() {
        let law = ContactLaw::dry_elastic()
            .with_friction(0.0)
            .with_energy_conservation(0.4);
        let (mut w, a, b, laws, pairs) = head_on(law);
        let old_ke =
            w.body(a).unwrap().kinetic_energy() + w.body(b).unwrap().kinetic_energy();
        let mut engine = CollisionEngine::new(FixedPairs::always(pairs));

        engine.resolve(&mut w, &laws, 1.0).unwrap();

        let new_ke =
            w.body(a).unwrap().kinetic_energy() + w.body(b).unwrap().kinetic_energy();
        assert_relative_eq!(new_ke / old_ke, 0.4, epsilon = 2e-3);
        // Momentum stays zero throughout.
        let p = w.body(a).unwrap().state.velocity + w.body(b).unwrap().state.velocity;
        assert_relative_eq!(p.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn separating_adhesive_pair_bonds_symmetrically() {
        let law = ContactLaw::adhesive_powder()
            .with_friction(0.0)
            .with_energy_conservation(0.1);
        let (mut w, a, b, laws, pairs) = head_on(law);
        // Intersecting during resolution, separated at the re-check.
        let mut engine = CollisionEngine::new(FixedPairs::once(pairs));

        engine.resolve(&mut w, &laws, 1.0).unwrap();

        let body_a = w.body(a).unwrap();
        let body_b = w.body(b).unwrap();
        assert_eq!(body_a.partners.len(), 1);
        assert_eq!(body_b.partners.len(), 1);
        assert_eq!(body_a.partners[0].key, b);
        assert_eq!(body_b.partners[0].key, a);
        // Antisymmetric contact vectors and normals.
        assert_relative_eq!(
            (body_a.partners[0].contact_vector + body_b.partners[0].contact_vector).norm(),
            0.0,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            (body_a.partners[0].normal + body_b.partners[0].normal).norm(),
            0.0,
            epsilon = 1e-12
        );
        // The committed contact force was zeroed on both sides.
        assert_relative_eq!(
            body_a.forces.source(ForceSource::Contact).force.norm(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn structure_impact_reflects_the_particle() {
        let (mut w, pop) = world();
        let walls = w
            .add_population(
                PopulationConfig::structure(1000.0).with_collision_distance(2.0),
                TriSurface::cuboid(1.0, 1.0, 1.0),
            )
            .unwrap();
        let a = w
            .inject(
                pop,
                KinematicState::moving(nalgebra::Point3::origin(), Vector3::x()),
            )
            .unwrap();
        let wall = w
            .inject(walls, KinematicState::at_rest(nalgebra::Point3::new(1.05, 0.0, 0.0)))
            .unwrap();
        let laws = ContactLawTableBuilder::new()
            .with_default_law(&[pop, walls], ContactLaw::dry_elastic().with_friction(0.0))
            .build(&[pop, walls])
            .unwrap();
        let pairs = facing_pairs(&w, a, wall);
        let mut engine = CollisionEngine::new(FixedPairs::always(pairs));

        let moved = engine.resolve(&mut w, &laws, 1.0).unwrap();

        assert_relative_eq!(w.body(a).unwrap().state.velocity.x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(w.body(wall).unwrap().state.center.x, 1.05, epsilon = 1e-12);
        assert!(moved.contains(&a));
        assert!(!moved.contains(&wall));
    }

    #[test]
    fn off_center_spinning_impact_meets_the_energy_target() {
        let (mut w, pop) = world();
        // A spinning cube striking a resting one whose center is offset in
        // y: the contact point sits off both lines of centers, so the force
        // estimate must include the rotational inertia about the lever arms
        // for the bisection to bracket the elastic factor.
        let mut state_a = KinematicState::moving(nalgebra::Point3::origin(), Vector3::x());
        state_a.angular_velocity = Vector3::z() * 2.0;
        let a = w.inject(pop, state_a).unwrap();
        let b = w
            .inject(
                pop,
                KinematicState::at_rest(nalgebra::Point3::new(1.05, 0.4, 0.0)),
            )
            .unwrap();
        let laws = ContactLawTableBuilder::new()
            .with_law(pop, pop, ContactLaw::dry_elastic().with_friction(0.0))
            .build(&[pop])
            .unwrap();
        let pairs = facing_pairs(&w, a, b);
        let mut engine = CollisionEngine::new(FixedPairs::always(pairs));

        let old_ke =
            w.body(a).unwrap().kinetic_energy() + w.body(b).unwrap().kinetic_energy();
        let old_px = w.body(a).unwrap().mass() * w.body(a).unwrap().state.velocity.x
            + w.body(b).unwrap().mass() * w.body(b).unwrap().state.velocity.x;

        engine.resolve(&mut w, &laws, 1.0).unwrap();

        let new_ke =
            w.body(a).unwrap().kinetic_energy() + w.body(b).unwrap().kinetic_energy();
        assert_relative_eq!(new_ke / old_ke, 1.0, epsilon = 2e-3);
        // Equal and opposite contact forces: linear momentum is untouched.
        let new_px = w.body(a).unwrap().mass() * w.body(a).unwrap().state.velocity.x
            + w.body(b).unwrap().mass() * w.body(b).unwrap().state.velocity.x;
        assert_relative_eq!(new_px, old_px, epsilon = 1e-9, max_relative = 1e-9);
    }

    #[test]
    fn candidate_table_tracks_the_contact_lifecycle() {
        let law = ContactLaw::dry_elastic().with_friction(0.0);
        let (mut w, _a, _b, laws, pairs) = head_on(law);
        let expected = pairs.len();
        let mut engine = CollisionEngine::new(FixedPairs::once(pairs));

        // Step 1: force applied through the face pairs.
        engine.resolve(&mut w, &laws, 1.0).unwrap();
        assert_eq!(engine.candidates().count(), expected);
        assert!(engine
            .candidates()
            .all(|c| c.phase == ContactPhase::Established));

        // Step 2: no longer intersecting, kept one step as Released.
        engine.resolve(&mut w, &laws, 1.0).unwrap();
        assert!(engine
            .candidates()
            .all(|c| c.phase == ContactPhase::Released));

        // Step 3: discarded.
        engine.resolve(&mut w, &laws, 1.0).unwrap();
        assert_eq!(engine.candidates().count(), 0);
    }

    proptest::proptest! {
        #[test]
        fn elastic_head_on_conserves_energy(
            scale_a in 0.5..2.0_f64,
            scale_b in 0.5..2.0_f64,
            speed_a in 0.1..5.0_f64,
            speed_b in 0.1..5.0_f64,
        ) {
            let (mut w, pop) = world();
            let mut state_a =
                KinematicState::moving(nalgebra::Point3::origin(), Vector3::x() * speed_a);
            state_a.scale = scale_a;
            let mut state_b = KinematicState::moving(
                nalgebra::Point3::new(0.55 * (scale_a + scale_b), 0.0, 0.0),
                -Vector3::x() * speed_b,
            );
            state_b.scale = scale_b;
            let a = w.inject(pop, state_a).unwrap();
            let b = w.inject(pop, state_b).unwrap();
            let laws = ContactLawTableBuilder::new()
                .with_law(pop, pop, ContactLaw::dry_elastic().with_friction(0.0))
                .build(&[pop])
                .unwrap();
            let pairs = facing_pairs(&w, a, b);
            let mut engine = CollisionEngine::new(FixedPairs::always(pairs));

            let old_ke =
                w.body(a).unwrap().kinetic_energy() + w.body(b).unwrap().kinetic_energy();
            engine.resolve(&mut w, &laws, 1.0).unwrap();
            let new_ke =
                w.body(a).unwrap().kinetic_energy() + w.body(b).unwrap().kinetic_energy();

            proptest::prop_assert!((new_ke / old_ke - 1.0).abs() < 2e-3);
            // Relative normal velocity reverses regardless of the mass ratio.
            let closing = w.body(b).unwrap().state.velocity.x
                - w.body(a).unwrap().state.velocity.x;
            proptest::prop_assert!((closing - (speed_a + speed_b)).abs() < 1e-6);
        }
    }

    #[test]
    fn stale_bonds_are_pruned_both_ways() {
        let (mut w, pop) = world();
        let a = w
            .inject(pop, KinematicState::at_rest(nalgebra::Point3::origin()))
            .unwrap();
        let b = w
            .inject(pop, KinematicState::at_rest(nalgebra::Point3::new(1.0, 0.0, 0.0)))
            .unwrap();
        for (from, to, sign) in [(a, b, 1.0), (b, a, -1.0)] {
            w.body_mut(from).unwrap().partners.push(ContactPartner {
                key: to,
                contact_vector: Vector3::x() * (0.5 * sign),
                normal: Vector3::x() * sign,
                faces: (0, 0),
                area: 1e-4,
            });
        }

        // Contact points coincide: bond is fresh.
        prune_stale_partners(&mut w);
        assert_eq!(w.body(a).unwrap().partners.len(), 1);

        // Drag b away past the staleness threshold (2 × sqrt(1e-4) = 0.02).
        w.body_mut(b).unwrap().state.center.x += 0.5;
        prune_stale_partners(&mut w);
        assert!(w.body(a).unwrap().partners.is_empty());
        assert!(w.body(b).unwrap().partners.is_empty());
    }
}

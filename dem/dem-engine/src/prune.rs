//! Proximity pruning of collision candidates.

use nalgebra::Vector3;

use dem_body::RigidBody;
use dem_types::{BodyKey, ProximityShape};

use crate::world::ParticleWorld;

/// Distance between two centers under a proximity shape.
///
/// A restricted shape measures only along one axis (for flat structures
/// like a floor) or only within one plane (for rail-like structures), so
/// long structures do not pull in every body inside their bounding sphere.
fn shaped_distance(shape: ProximityShape, delta: &Vector3<f64>) -> f64 {
    match shape {
        ProximityShape::Sphere => delta.norm(),
        ProximityShape::Axis(axis) => delta[axis as usize].abs(),
        ProximityShape::Plane(axis) => {
            let mut in_plane = *delta;
            in_plane[axis as usize] = 0.0;
            in_plane.norm()
        }
    }
}

fn pair_eligible(world: &ParticleWorld, a: &RigidBody, b: &RigidBody) -> bool {
    // Point particles never collide with anything.
    if a.is_point() || b.is_point() {
        return false;
    }
    // Structures never collide with each other.
    if a.residency.is_structure() && b.residency.is_structure() {
        return false;
    }
    // At least one side must be authoritative here; slave-slave pairs are
    // resolved on their owning ranks.
    if !a.residency.is_authoritative() && !b.residency.is_authoritative() {
        return false;
    }
    // Adhered pairs move together and skip re-detection, except against
    // structures, which keep refining their multi-point footprint.
    let already_partners = a.partners.iter().any(|p| p.key == b.key());
    if already_partners && !a.residency.is_structure() && !b.residency.is_structure() {
        return false;
    }

    let config_a = match world.population(a.key().population) {
        Some(p) => p.config(),
        None => return false,
    };
    let config_b = match world.population(b.key().population) {
        Some(p) => p.config(),
        None => return false,
    };

    // A structure's configured shape restricts the test; mobile pairs are
    // always spherical.
    let shape = if a.residency.is_structure() {
        config_a.proximity_shape
    } else if b.residency.is_structure() {
        config_b.proximity_shape
    } else {
        ProximityShape::Sphere
    };

    let reach = a.scaled_distance(config_a.collision_distance)
        + b.scaled_distance(config_b.collision_distance);
    let delta = b.state.center - a.state.center;
    shaped_distance(shape, &delta) <= reach
}

/// All body pairs close enough to hand to the contact oracle.
///
/// Pairs are emitted once, with the lexicographically smaller key first.
#[must_use]
pub fn candidate_pairs(world: &ParticleWorld) -> Vec<(BodyKey, BodyKey)> {
    let keys = world.all_keys();
    let mut pairs = Vec::new();
    for (i, &ka) in keys.iter().enumerate() {
        let Some(a) = world.body(ka) else { continue };
        for &kb in &keys[i + 1..] {
            let Some(b) = world.body(kb) else { continue };
            if pair_eligible(world, a, b) {
                pairs.push(if ka <= kb { (ka, kb) } else { (kb, ka) });
            }
        }
    }
    pairs
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dem_body::TriSurface;
    use dem_spatial::SpatialPartition;
    use dem_types::{
        ContactPartner, EngineConfig, KinematicState, PopulationConfig, RankId,
    };
    use nalgebra::Point3;

    fn world_with(population: PopulationConfig) -> (ParticleWorld, dem_types::PopulationId) {
        let partition = SpatialPartition::try_new(1.0, Point3::origin()).unwrap();
        let mut w = ParticleWorld::new(
            RankId::new(0),
            EngineConfig::aerosol(1e-4, 1.0),
            partition,
        )
        .unwrap();
        let id = w.add_population(population, TriSurface::icosphere(1)).unwrap();
        (w, id)
    }

    #[test]
    fn distance_gates_candidacy() {
        let (mut w, pop) = world_with(
            PopulationConfig::rigid_particle(1000.0).with_collision_distance(1.5),
        );
        let a = w.inject(pop, KinematicState::at_rest(Point3::origin())).unwrap();
        let near = w
            .inject(pop, KinematicState::at_rest(Point3::new(2.0, 0.0, 0.0)))
            .unwrap();
        let _far = w
            .inject(pop, KinematicState::at_rest(Point3::new(10.0, 0.0, 0.0)))
            .unwrap();

        let pairs = candidate_pairs(&w);
        assert_eq!(pairs, vec![(a, near)]);
    }

    #[test]
    fn partnered_pairs_are_skipped() {
        let (mut w, pop) = world_with(
            PopulationConfig::rigid_particle(1000.0).with_collision_distance(5.0),
        );
        let a = w.inject(pop, KinematicState::at_rest(Point3::origin())).unwrap();
        let b = w
            .inject(pop, KinematicState::at_rest(Point3::new(2.0, 0.0, 0.0)))
            .unwrap();

        let bond = ContactPartner {
            key: b,
            contact_vector: nalgebra::Vector3::x(),
            normal: nalgebra::Vector3::x(),
            faces: (0, 0),
            area: 1e-12,
        };
        w.body_mut(a).unwrap().partners.push(bond);
        let back = ContactPartner { key: a, ..bond };
        w.body_mut(b).unwrap().partners.push(back);

        assert!(candidate_pairs(&w).is_empty());
    }

    #[test]
    fn axis_restricted_structure_ignores_lateral_offset() {
        let (mut w, particles) = world_with(
            PopulationConfig::rigid_particle(1000.0).with_collision_distance(1.0),
        );
        let floor_pop = w
            .add_population(
                PopulationConfig::structure(2000.0)
                    .with_collision_distance(1.0)
                    .with_proximity_shape(ProximityShape::Axis(2)),
                TriSurface::cuboid(100.0, 100.0, 0.1),
            )
            .unwrap();

        let _floor = w
            .inject(floor_pop, KinematicState::at_rest(Point3::origin()))
            .unwrap();
        // Far away laterally but close in z: still a candidate.
        let hovering = w
            .inject(
                particles,
                KinematicState::at_rest(Point3::new(40.0, 40.0, 1.5)),
            )
            .unwrap();

        let pairs = candidate_pairs(&w);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].0 == hovering || pairs[0].1 == hovering);
    }

    #[test]
    fn shaped_distance_variants() {
        let d = Vector3::new(3.0, 4.0, 12.0);
        assert!((shaped_distance(ProximityShape::Sphere, &d) - 13.0).abs() < 1e-12);
        assert!((shaped_distance(ProximityShape::Axis(2), &d) - 12.0).abs() < 1e-12);
        assert!((shaped_distance(ProximityShape::Plane(2), &d) - 5.0).abs() < 1e-12);
    }
}

//! Agglomerates: bonded clusters that move as one rigid body.
//!
//! An agglomerate is the connected component of the adhesion partner graph
//! around a seed body, excluding structures. Structures do not join the
//! cluster; each bond to a structure instead contributes a contact-point
//! constraint that removes degrees of freedom from the cluster's motion:
//!
//! - one contact point removes rotation about the contact normal,
//! - two contact points restrict rotation to the axis joining them,
//! - three or more lock the cluster rigidly in place.

use hashbrown::HashSet;
use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

use dem_contact::ContactLawTable;
use dem_types::BodyKey;

use crate::world::ParticleWorld;

/// A bonded cluster with combined mass properties.
///
/// The mass, center of gravity, inertia tensor and aggregate velocities are
/// frozen at collection time; forces are re-read from the member ledgers at
/// [`advance`](Self::advance) time so contributions accumulated after
/// collection still count.
#[derive(Debug, Clone)]
pub struct Agglomerate {
    members: Vec<BodyKey>,
    /// Structure contact points with their unit normals.
    structure_points: Vec<(Point3<f64>, Vector3<f64>)>,
    mass: f64,
    cg: Point3<f64>,
    inertia: Matrix3<f64>,
    velocity: Vector3<f64>,
    angular_velocity: Vector3<f64>,
}

impl Agglomerate {
    /// Collect the cluster containing `seed` by walking the partner graph.
    ///
    /// Structures terminate the walk and are recorded as constraints. A
    /// seed that is itself a structure yields an empty, immobile cluster.
    #[must_use]
    pub fn collect(world: &ParticleWorld, seed: BodyKey) -> Self {
        let mut members = Vec::new();
        let mut structure_points = Vec::new();
        let mut visited: HashSet<BodyKey> = HashSet::new();
        let mut queue = vec![seed];
        visited.insert(seed);

        while let Some(key) = queue.pop() {
            let Some(body) = world.body(key) else { continue };
            if body.residency.is_structure() {
                continue;
            }
            members.push(key);
            for partner in &body.partners {
                let Some(other) = world.body(partner.key) else {
                    continue;
                };
                if other.residency.is_structure() {
                    let point = body.state.center + partner.contact_vector;
                    let normal = partner
                        .normal
                        .try_normalize(f64::EPSILON)
                        .unwrap_or_else(Vector3::z);
                    structure_points.push((point, normal));
                } else if visited.insert(partner.key) {
                    queue.push(partner.key);
                }
            }
        }

        Self::from_members(world, members, structure_points)
    }

    fn from_members(
        world: &ParticleWorld,
        members: Vec<BodyKey>,
        structure_points: Vec<(Point3<f64>, Vector3<f64>)>,
    ) -> Self {
        let mut mass = 0.0;
        let mut weighted_center = Vector3::zeros();
        let mut momentum = Vector3::zeros();
        for &key in &members {
            if let Some(body) = world.body(key) {
                mass += body.mass();
                weighted_center += body.state.center.coords * body.mass();
                momentum += body.state.linear_momentum(body.mass());
            }
        }
        if mass <= 0.0 {
            return Self {
                members,
                structure_points,
                mass: 0.0,
                cg: Point3::origin(),
                inertia: Matrix3::zeros(),
                velocity: Vector3::zeros(),
                angular_velocity: Vector3::zeros(),
            };
        }

        let cg = Point3::from(weighted_center / mass);
        let velocity = momentum / mass;

        // Parallel-axis shift of every member tensor to the cluster cg, and
        // total angular momentum about the cg.
        let mut inertia = Matrix3::zeros();
        let mut angular_momentum = Vector3::zeros();
        for &key in &members {
            if let Some(body) = world.body(key) {
                let d = body.state.center - cg;
                inertia += body.inertia()
                    + body.mass() * (d.norm_squared() * Matrix3::identity() - d * d.transpose());
                angular_momentum += body.state.angular_momentum(body.inertia())
                    + body.mass() * d.cross(&(body.state.velocity - velocity));
            }
        }
        let angular_velocity = inertia
            .try_inverse()
            .map_or_else(Vector3::zeros, |inv| inv * angular_momentum);

        Self {
            members,
            structure_points,
            mass,
            cg,
            inertia,
            velocity,
            angular_velocity,
        }
    }

    /// Member keys, structures excluded.
    #[must_use]
    pub fn members(&self) -> &[BodyKey] {
        &self.members
    }

    /// Combined mass (kg).
    #[must_use]
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// Combined center of gravity.
    #[must_use]
    pub const fn center_of_gravity(&self) -> Point3<f64> {
        self.cg
    }

    /// Combined world-aligned inertia tensor about the cluster cg.
    #[must_use]
    pub const fn inertia(&self) -> &Matrix3<f64> {
        &self.inertia
    }

    /// Momentum-consistent cluster velocity.
    #[must_use]
    pub const fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    /// Momentum-consistent cluster angular velocity.
    #[must_use]
    pub const fn angular_velocity(&self) -> Vector3<f64> {
        self.angular_velocity
    }

    /// Whether `key` belongs to this cluster.
    #[must_use]
    pub fn contains(&self, key: BodyKey) -> bool {
        self.members.contains(&key)
    }

    /// Total kinetic energy of the members in their current states.
    #[must_use]
    pub fn kinetic_energy(&self, world: &ParticleWorld) -> f64 {
        self.members
            .iter()
            .filter_map(|&k| world.body(k))
            .map(dem_body::RigidBody::kinetic_energy)
            .sum()
    }

    /// Apply the structure contact constraints to a trial velocity pair.
    fn constrain(
        &self,
        velocity: Vector3<f64>,
        angular: Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        match self.structure_points.len() {
            0 => (velocity, angular),
            1 => {
                let n = self.structure_points[0].1;
                (velocity, angular - n * angular.dot(&n))
            }
            2 => {
                let axis = self.structure_points[1].0 - self.structure_points[0].0;
                match axis.try_normalize(f64::EPSILON) {
                    Some(axis) => (velocity, axis * angular.dot(&axis)),
                    // Coincident contact points degrade to the one-point case.
                    None => {
                        let n = self.structure_points[0].1;
                        (velocity, angular - n * angular.dot(&n))
                    }
                }
            }
            _ => (Vector3::zeros(), Vector3::zeros()),
        }
    }

    /// One semi-implicit Euler step for the whole cluster.
    ///
    /// Forces and torques are summed from the member ledgers about the
    /// cluster cg, the cluster velocities are updated and constrained, and
    /// every member is carried along rigidly: rotated about the cg, then
    /// given the velocity of its material point. Member ledgers are cleared.
    pub fn advance(&mut self, world: &mut ParticleWorld, dt: f64, relaxation: f64) {
        if self.mass <= 0.0 {
            return;
        }

        let mut force = Vector3::zeros();
        let mut torque = Vector3::zeros();
        for &key in &self.members {
            if let Some(body) = world.body(key) {
                let f = body.forces.total_force();
                force += f;
                torque += body.forces.total_torque() + (body.state.center - self.cg).cross(&f);
            }
        }

        let accel = force / self.mass;
        let ang_accel = self
            .inertia
            .try_inverse()
            .map_or_else(Vector3::zeros, |inv| inv * torque);

        let new_v = self.velocity + accel * (relaxation * dt);
        let new_w = self.angular_velocity + ang_accel * (relaxation * dt);
        let (new_v, new_w) = self.constrain(new_v, new_w);

        let mean_v = (self.velocity + new_v) * 0.5;
        let mean_w = (self.angular_velocity + new_w) * 0.5;
        let (mean_v, mean_w) = self.constrain(mean_v, mean_w);

        let rotation = UnitQuaternion::from_scaled_axis(mean_w * dt);
        let new_cg = self.cg + mean_v * dt;

        for &key in &self.members {
            let Some(body) = world.body_mut(key) else { continue };
            let offset = body.state.center - self.cg;
            let new_center = new_cg + rotation * offset;
            let translation = new_center - body.state.center;
            body.apply_rigid_step(&translation, &rotation);

            let arm = new_center - new_cg;
            body.state.velocity = new_v + new_w.cross(&arm);
            body.state.angular_velocity = new_w;
            body.state.mean_velocity = mean_v + mean_w.cross(&arm);
            body.state.mean_angular_velocity = mean_w;
            body.forces.clear();
        }

        self.cg = new_cg;
        self.velocity = new_v;
        self.angular_velocity = new_w;
    }
}

/// Sever over-stressed adhesion bonds.
///
/// For every authoritative bonded body, progressively larger kernels (the
/// bodies within 0, 1, .. `breakup_iteration_depth` partner hops) are tested
/// against their border (the partners one hop outside the kernel). A border
/// bond breaks when the net force on the kernel pulls away from the border
/// body harder than the bond can hold:
///
/// `(F_kernel + strength · d̂) · d̂ ≤ 0`
///
/// where `d̂` points from the kernel body toward its border partner. Bonds
/// are removed from both sides in the same pass.
pub fn reassign_contact_partners(world: &mut ParticleWorld, laws: &ContactLawTable) {
    let depth_limit = world.config().breakup_iteration_depth;
    let seeds: Vec<BodyKey> = world
        .bodies()
        .filter(|b| b.residency.is_authoritative() && !b.partners.is_empty())
        .map(dem_body::RigidBody::key)
        .collect();

    let mut severed: Vec<(BodyKey, BodyKey)> = Vec::new();
    for seed in seeds {
        collect_severed_bonds(world, laws, seed, depth_limit, &mut severed);
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

fn collect_severed_bonds(
    world: &ParticleWorld,
    laws: &ContactLawTable,
    seed: BodyKey,
    depth_limit: usize,
    severed: &mut Vec<(BodyKey, BodyKey)>,
) {
    let mut kernel: HashSet<BodyKey> = HashSet::new();
    kernel.insert(seed);

    for _depth in 0..=depth_limit {
        let mut kernel_force = Vector3::zeros();
        for &key in &kernel {
            if let Some(body) = world.body(key) {
                kernel_force += body.forces.total_force();
            }
        }

        let mut next_frontier = Vec::new();
        for &key in &kernel {
            let Some(body) = world.body(key) else { continue };
            for partner in &body.partners {
                if kernel.contains(&partner.key) {
                    continue;
                }
                let Some(other) = world.body(partner.key) else {
                    continue;
                };

                let direction = (other.state.center - body.state.center)
                    .try_normalize(f64::EPSILON)
                    .unwrap_or_else(|| {
                        tracing::warn!(
                            body = %key,
                            partner = %partner.key,
                            "coincident bond endpoints, falling back to bond normal"
                        );
                        partner.normal
                    });

                let strength = laws
                    .law(key.population, partner.key.population)
                    .map_or(0.0, |law| law.bond_strength(partner.area));

                if (kernel_force + direction * strength).dot(&direction) <= 0.0 {
                    severed.push((key, partner.key));
                } else if !other.residency.is_structure() {
                    next_frontier.push(partner.key);
                }
            }
        }

        if next_frontier.is_empty() {
            break;
        }
        for key in next_frontier {
            kernel.insert(key);
        }
    }
}

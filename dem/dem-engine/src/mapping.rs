//! Body-to-flow-field mapping.
//!
//! The continuum solver is an external collaborator; this module only
//! populates the two per-cell fields it consumes: the void fraction (how
//! much of a cell is still fluid) and the solid-phase velocity. Surfaced
//! bodies claim cells by an odd/even ray-crossing test of the cell center
//! against the triangulated surface; sub-cell point particles contribute
//! their displaced volume to the single cell they occupy.

use nalgebra::{Point3, Vector3};

use dem_types::Aabb;

use crate::world::ParticleWorld;

/// The flow solver's mesh, as seen by the mapping layer.
pub trait FlowMesh {
    /// Number of cells.
    fn cell_count(&self) -> usize;

    /// Cell containing `point`, or `None` outside the mesh.
    fn find_cell(&self, point: &Point3<f64>) -> Option<usize>;

    /// Center of a cell.
    fn cell_center(&self, cell: usize) -> Point3<f64>;

    /// Volume of a cell (m³).
    fn cell_volume(&self, cell: usize) -> f64;

    /// Cells whose center lies inside `region`.
    ///
    /// The default scans all cells; structured meshes should override.
    fn cells_in_region(&self, region: &Aabb) -> Vec<usize> {
        (0..self.cell_count())
            .filter(|&c| region.contains(&self.cell_center(c)))
            .collect()
    }
}

/// Per-cell fields handed to the flow solver.
#[derive(Debug, Clone)]
pub struct CouplingFields {
    /// Fractional fluid occupancy per cell, 1.0 = pure fluid.
    pub void_fraction: Vec<f64>,
    /// Volume-averaged solid-phase velocity per cell.
    pub particle_velocity: Vec<Vector3<f64>>,
    /// Accumulated solid volume per cell, the weight of the average.
    solid_volume: Vec<f64>,
}

impl CouplingFields {
    /// All-fluid fields for a mesh of `cells` cells.
    #[must_use]
    pub fn all_fluid(cells: usize) -> Self {
        Self {
            void_fraction: vec![1.0; cells],
            particle_velocity: vec![Vector3::zeros(); cells],
            solid_volume: vec![0.0; cells],
        }
    }

    /// Add a solid-volume contribution with the material velocity at the
    /// sampled point.
    fn deposit(&mut self, cell: usize, volume: f64, cell_volume: f64, velocity: Vector3<f64>) {
        let fraction = (volume / cell_volume).min(1.0);
        self.void_fraction[cell] = (self.void_fraction[cell] - fraction).max(0.0);

        let total = self.solid_volume[cell] + volume;
        if total > 0.0 {
            self.particle_velocity[cell] =
                (self.particle_velocity[cell] * self.solid_volume[cell] + velocity * volume)
                    / total;
        }
        self.solid_volume[cell] = total;
    }
}

/// Populate the coupling fields from every resident body.
///
/// A surfaced body marks the cells whose centers lie inside it, searching
/// only the region of its bounding box expanded by the population's scaled
/// mapping distance. A point particle deposits its displaced volume
/// (`mass / density`) into the single cell containing its center.
#[must_use]
pub fn map_bodies<M: FlowMesh>(world: &ParticleWorld, mesh: &M) -> CouplingFields {
    let mut fields = CouplingFields::all_fluid(mesh.cell_count());

    for population in world.populations() {
        let config = population.config();
        for body in population.iter() {
            if body.is_point() {
                if let Some(cell) = mesh.find_cell(&body.state.center) {
                    let volume = body.mass() / config.density;
                    fields.deposit(cell, volume, mesh.cell_volume(cell), body.state.velocity);
                }
                continue;
            }

            let margin = body.scaled_distance(config.mapping_distance);
            let region = body.aabb().expanded(margin);
            for cell in mesh.cells_in_region(&region) {
                let center = mesh.cell_center(cell);
                if body.surface().contains_point(&center) {
                    let cell_volume = mesh.cell_volume(cell);
                    let velocity =
                        body.state.velocity_at_offset(&(center - body.state.center));
                    fields.deposit(cell, cell_volume, cell_volume, velocity);
                }
            }
        }
    }
    fields
}

/// Axis-aligned uniform hexahedral mesh, mostly for tests and examples.
#[derive(Debug, Clone)]
pub struct UniformGridMesh {
    origin: Point3<f64>,
    spacing: f64,
    counts: [usize; 3],
}

impl UniformGridMesh {
    /// Create a uniform mesh of `counts` cells per axis starting at `origin`.
    #[must_use]
    pub const fn new(origin: Point3<f64>, spacing: f64, counts: [usize; 3]) -> Self {
        Self {
            origin,
            spacing,
            counts,
        }
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.counts[1] + j) * self.counts[0] + i
    }
}

impl FlowMesh for UniformGridMesh {
    fn cell_count(&self) -> usize {
        self.counts[0] * self.counts[1] * self.counts[2]
    }

    fn find_cell(&self, point: &Point3<f64>) -> Option<usize> {
        let rel = (point - self.origin) / self.spacing;
        let mut ijk = [0_usize; 3];
        for axis in 0..3 {
            if rel[axis] < 0.0 {
                return None;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let i = rel[axis].floor() as usize;
            if i >= self.counts[axis] {
                return None;
            }
            ijk[axis] = i;
        }
        Some(self.index(ijk[0], ijk[1], ijk[2]))
    }

    fn cell_center(&self, cell: usize) -> Point3<f64> {
        let i = cell % self.counts[0];
        let j = (cell / self.counts[0]) % self.counts[1];
        let k = cell / (self.counts[0] * self.counts[1]);
        #[allow(clippy::cast_precision_loss)]
        let offset = Vector3::new(
            (i as f64 + 0.5) * self.spacing,
            (j as f64 + 0.5) * self.spacing,
            (k as f64 + 0.5) * self.spacing,
        );
        self.origin + offset
    }

    fn cell_volume(&self, _cell: usize) -> f64 {
        self.spacing.powi(3)
    }
}

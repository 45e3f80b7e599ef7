//! Volume integrals over triangulated surfaces.
//!
//! Mass, centroid and inertia are computed as flux integrals: the enclosed
//! volume is decomposed into signed tetrahedra spanned by the origin and
//! each surface face, and the canonical tetrahedron moments are summed.
//! Nothing is voxelized; accuracy is limited only by the triangulation.

use nalgebra::{Matrix3, Point3, Vector3};

use dem_types::DemError;

use crate::surface::TriSurface;

/// Unit-density mass properties of a closed surface.
///
/// The inertia tensor is expressed about the centroid, in the same frame as
/// the surface. Multiply `volume` and `inertia` by a material density to get
/// physical mass properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassDistribution {
    /// Enclosed volume (m³), always positive.
    pub volume: f64,
    /// Centroid of the enclosed volume.
    pub centroid: Point3<f64>,
    /// Unit-density inertia tensor about the centroid (kg·m² per kg/m³).
    pub inertia: Matrix3<f64>,
}

impl MassDistribution {
    /// Integrate the mass properties of a closed surface.
    ///
    /// A surface with inverted winding (negative signed volume) is treated
    /// as its mirror image: all moments are sign-flipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the enclosed volume is degenerate (zero or not
    /// finite).
    pub fn of_surface(surface: &TriSurface) -> Result<Self, DemError> {
        let mut volume = 0.0;
        let mut first = Vector3::zeros();
        // Second moments: ∫x², ∫y², ∫z², ∫xy, ∫yz, ∫zx.
        let mut sq: Vector3<f64> = Vector3::zeros();
        let mut cross: Vector3<f64> = Vector3::zeros();

        for face in 0..surface.face_count() as u32 {
            let [pa, pb, pc] = surface.face_vertices(face);
            let (a, b, c) = (pa.coords, pb.coords, pc.coords);
            let det = a.dot(&b.cross(&c));

            volume += det / 6.0;
            first += det / 24.0 * (a + b + c);

            for axis in 0..3 {
                let (x0, x1, x2) = (a[axis], b[axis], c[axis]);
                sq[axis] += det / 60.0 * (x0 * x0 + x1 * x1 + x2 * x2 + x0 * x1 + x0 * x2 + x1 * x2);
            }
            // cross[0] = ∫xy, cross[1] = ∫yz, cross[2] = ∫zx
            for (slot, i, j) in [(0, 0, 1), (1, 1, 2), (2, 2, 0)] {
                cross[slot] += det / 120.0
                    * (2.0 * (a[i] * a[j] + b[i] * b[j] + c[i] * c[j])
                        + a[i] * b[j]
                        + a[j] * b[i]
                        + a[i] * c[j]
                        + a[j] * c[i]
                        + b[i] * c[j]
                        + b[j] * c[i]);
            }
        }

        if volume < 0.0 {
            volume = -volume;
            first = -first;
            sq = -sq;
            cross = -cross;
        }
        if !(volume.is_finite() && volume > f64::EPSILON) {
            return Err(DemError::invalid_config(format!(
                "degenerate surface: enclosed volume {volume}"
            )));
        }

        let centroid = Point3::from(first / volume);

        // Inertia about the origin, then parallel-axis shift to the centroid.
        let (ixx, iyy, izz) = (sq.y + sq.z, sq.x + sq.z, sq.x + sq.y);
        let (ixy, iyz, izx) = (-cross.x, -cross.y, -cross.z);
        let c = centroid.coords;
        let inertia = Matrix3::new(
            ixx - volume * (c.y * c.y + c.z * c.z),
            ixy + volume * c.x * c.y,
            izx + volume * c.z * c.x,
            ixy + volume * c.x * c.y,
            iyy - volume * (c.z * c.z + c.x * c.x),
            iyz + volume * c.y * c.z,
            izx + volume * c.z * c.x,
            iyz + volume * c.y * c.z,
            izz - volume * (c.x * c.x + c.y * c.y),
        );

        Ok(Self {
            volume,
            centroid,
            inertia,
        })
    }
}

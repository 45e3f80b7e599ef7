//! Surface intersection oracles.

use nalgebra::{Point3, Vector3};

use dem_body::TriSurface;
use dem_types::Aabb;

/// Finds the intersecting face pairs of two surfaces.
///
/// The collision engine is generic over this trait: the shipped oracle does
/// exact edge-piercing tests, but a coarser or accelerated implementation
/// can be substituted without touching the resolver.
pub trait ContactOracle {
    /// All face pairs `(face of a, face of b)` whose triangles intersect.
    fn intersecting_pairs(&self, a: &TriSurface, b: &TriSurface) -> Vec<(u32, u32)>;
}

/// Exact oracle: two triangles intersect when an edge of one pierces the
/// other.
///
/// Face bounding boxes are pre-filtered against the other surface's box, so
/// the quadratic edge tests only run on faces in the overlap region.
#[derive(Debug, Clone)]
pub struct EdgePierceOracle {
    epsilon: f64,
}

impl Default for EdgePierceOracle {
    fn default() -> Self {
        Self { epsilon: 1e-12 }
    }
}

impl EdgePierceOracle {
    /// Create an oracle with the given geometric tolerance.
    #[must_use]
    pub const fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }
}

impl ContactOracle for EdgePierceOracle {
    fn intersecting_pairs(&self, a: &TriSurface, b: &TriSurface) -> Vec<(u32, u32)> {
        let (Some(box_a), Some(box_b)) = (a.aabb(), b.aabb()) else {
            return Vec::new();
        };
        if !box_a.overlaps(&box_b) {
            return Vec::new();
        }

        let candidates_a = faces_in_region(a, &box_b);
        let candidates_b = faces_in_region(b, &box_a);

        let mut pairs = Vec::new();
        for &(fa, bb_a) in &candidates_a {
            let ta = a.face_vertices(fa);
            for &(fb, bb_b) in &candidates_b {
                if !bb_a.overlaps(&bb_b) {
                    continue;
                }
                let tb = b.face_vertices(fb);
                if triangles_intersect(&ta, &tb, self.epsilon) {
                    pairs.push((fa, fb));
                }
            }
        }
        pairs
    }
}

/// Faces whose bounding box overlaps `region`, with their boxes.
fn faces_in_region(surface: &TriSurface, region: &Aabb) -> Vec<(u32, Aabb)> {
    (0..surface.face_count() as u32)
        .filter_map(|face| {
            let bb = Aabb::from_points(&surface.face_vertices(face))?;
            bb.overlaps(region).then_some((face, bb))
        })
        .collect()
}

/// Whether two triangles intersect: any edge of one pierces the other.
fn triangles_intersect(a: &[Point3<f64>; 3], b: &[Point3<f64>; 3], epsilon: f64) -> bool {
    let edges_a = [(a[0], a[1]), (a[1], a[2]), (a[2], a[0])];
    for (e0, e1) in edges_a {
        if edge_pierces_triangle(&e0, &e1, b, epsilon) {
            return true;
        }
    }
    let edges_b = [(b[0], b[1]), (b[1], b[2]), (b[2], b[0])];
    for (e0, e1) in edges_b {
        if edge_pierces_triangle(&e0, &e1, a, epsilon) {
            return true;
        }
    }
    false
}

/// Möller–Trumbore segment/triangle test.
fn edge_pierces_triangle(
    e0: &Point3<f64>,
    e1: &Point3<f64>,
    tri: &[Point3<f64>; 3],
    epsilon: f64,
) -> bool {
    let direction: Vector3<f64> = e1 - e0;
    if direction.norm_squared() < epsilon * epsilon {
        return false;
    }

    let edge1 = tri[1] - tri[0];
    let edge2 = tri[2] - tri[0];
    let h = direction.cross(&edge2);
    let det = edge1.dot(&h);
    if det.abs() < epsilon {
        return false;
    }

    let inv_det = 1.0 / det;
    let s = e0 - tri[0];
    let u = inv_det * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }

    let q = s.cross(&edge1);
    let v = inv_det * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }

    let t = inv_det * edge2.dot(&q);
    (-epsilon..=1.0 + epsilon).contains(&t)
}

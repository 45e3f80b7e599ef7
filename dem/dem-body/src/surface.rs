//! Triangulated closed surfaces.

use nalgebra::{Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use dem_types::{Aabb, DemError, KinematicState};

/// A closed triangulated surface in world coordinates.
///
/// Faces wind counter-clockwise seen from outside, so the face normal of
/// `[a, b, c]` is `(b - a) × (c - a)` and points out of the enclosed volume.
/// All integral quantities (volume, centroid, inertia) rely on that
/// convention; a surface with inverted winding reports negative volume.
///
/// # Example
///
/// ```
/// use dem_body::TriSurface;
///
/// let cube = TriSurface::cuboid(1.0, 1.0, 1.0);
/// assert!((cube.signed_volume() - 1.0).abs() < 1e-12);
/// assert_eq!(cube.face_count(), 12);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriSurface {
    points: Vec<Point3<f64>>,
    faces: Vec<[u32; 3]>,
}

impl TriSurface {
    /// Create a surface from vertices and face index triples.
    ///
    /// # Errors
    ///
    /// Returns an error if any face references a vertex out of range.
    pub fn new(points: Vec<Point3<f64>>, faces: Vec<[u32; 3]>) -> Result<Self, DemError> {
        let n = points.len();
        for (i, face) in faces.iter().enumerate() {
            if face.iter().any(|&v| v as usize >= n) {
                return Err(DemError::invalid_config(format!(
                    "face {i} references vertex out of range (vertex count {n})"
                )));
            }
        }
        Ok(Self { points, faces })
    }

    /// A surface with no vertices and no faces.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            points: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Vertex positions.
    #[must_use]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Face index triples.
    #[must_use]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Number of faces.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// The three vertices of a face.
    #[must_use]
    pub fn face_vertices(&self, face: u32) -> [Point3<f64>; 3] {
        let [a, b, c] = self.faces[face as usize];
        [
            self.points[a as usize],
            self.points[b as usize],
            self.points[c as usize],
        ]
    }

    /// Unnormalized outward face normal; magnitude is twice the face area.
    #[must_use]
    pub fn face_normal_unnormalized(&self, face: u32) -> Vector3<f64> {
        let [a, b, c] = self.face_vertices(face);
        (b - a).cross(&(c - a))
    }

    /// Unit outward face normal, or `None` for a degenerate face.
    #[must_use]
    pub fn face_normal(&self, face: u32) -> Option<Vector3<f64>> {
        let n = self.face_normal_unnormalized(face);
        let len = n.norm();
        if len < 1e-300 {
            None
        } else {
            Some(n / len)
        }
    }

    /// Area of a face.
    #[must_use]
    pub fn face_area(&self, face: u32) -> f64 {
        0.5 * self.face_normal_unnormalized(face).norm()
    }

    /// Centroid of a face.
    #[must_use]
    pub fn face_centroid(&self, face: u32) -> Point3<f64> {
        let [a, b, c] = self.face_vertices(face);
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Total surface area.
    #[must_use]
    pub fn area(&self) -> f64 {
        (0..self.faces.len() as u32).map(|f| self.face_area(f)).sum()
    }

    /// Signed enclosed volume via the divergence theorem.
    ///
    /// Positive for outward winding, negative for inward.
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        self.faces
            .iter()
            .map(|&[a, b, c]| {
                let a = self.points[a as usize].coords;
                let b = self.points[b as usize].coords;
                let c = self.points[c as usize].coords;
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }

    /// Axis-aligned bounding box, or `None` for an empty surface.
    #[must_use]
    pub fn aabb(&self) -> Option<Aabb> {
        Aabb::from_points(&self.points)
    }

    /// Translate every vertex.
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        for p in &mut self.points {
            *p += offset;
        }
    }

    /// Rotate every vertex about a pivot point.
    pub fn rotate_about(&mut self, rotation: &UnitQuaternion<f64>, pivot: &Point3<f64>) {
        for p in &mut self.points {
            *p = pivot + rotation * (*p - pivot);
        }
    }

    /// Uniformly scale every vertex about a pivot point.
    pub fn scale_about(&mut self, factor: f64, pivot: &Point3<f64>) {
        for p in &mut self.points {
            *p = pivot + (*p - pivot) * factor;
        }
    }

    /// Instantiate a prototype surface at a body's scale, orientation and
    /// position. The prototype is expected to be centered on its own center
    /// of gravity.
    #[must_use]
    pub fn from_prototype(prototype: &Self, state: &KinematicState) -> Self {
        let points = prototype
            .points
            .iter()
            .map(|p| state.center + state.orientation * (p.coords * state.scale))
            .collect();
        Self {
            points,
            faces: prototype.faces.clone(),
        }
    }

    /// Whether a point lies inside the enclosed volume.
    ///
    /// Ray-crossing test along +x. Points exactly on the surface are
    /// unspecified.
    #[must_use]
    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        let dir = Vector3::x();
        let mut crossings = 0_u32;
        for face in 0..self.faces.len() as u32 {
            let [a, b, c] = self.face_vertices(face);
            if ray_hits_triangle(point, &dir, &a, &b, &c) {
                crossings += 1;
            }
        }
        crossings % 2 == 1
    }

    /// Axis-aligned cuboid centered on the origin.
    #[must_use]
    pub fn cuboid(dx: f64, dy: f64, dz: f64) -> Self {
        let (hx, hy, hz) = (dx * 0.5, dy * 0.5, dz * 0.5);
        let points = vec![
            Point3::new(-hx, -hy, -hz),
            Point3::new(hx, -hy, -hz),
            Point3::new(hx, hy, -hz),
            Point3::new(-hx, hy, -hz),
            Point3::new(-hx, -hy, hz),
            Point3::new(hx, -hy, hz),
            Point3::new(hx, hy, hz),
            Point3::new(-hx, hy, hz),
        ];
        // Two CCW triangles per cuboid face, normals outward.
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2], // -z
            [4, 5, 6],
            [4, 6, 7], // +z
            [0, 1, 5],
            [0, 5, 4], // -y
            [2, 3, 7],
            [2, 7, 6], // +y
            [1, 2, 6],
            [1, 6, 5], // +x
            [3, 0, 4],
            [3, 4, 7], // -x
        ];
        Self { points, faces }
    }

    /// Unit-radius icosphere centered on the origin.
    ///
    /// `subdivisions = 0` is the bare icosahedron (20 faces); each level
    /// quadruples the face count.
    #[must_use]
    pub fn icosphere(subdivisions: u32) -> Self {
        let phi = (1.0 + 5.0_f64.sqrt()) * 0.5;
        let mut points: Vec<Point3<f64>> = [
            (-1.0, phi, 0.0),
            (1.0, phi, 0.0),
            (-1.0, -phi, 0.0),
            (1.0, -phi, 0.0),
            (0.0, -1.0, phi),
            (0.0, 1.0, phi),
            (0.0, -1.0, -phi),
            (0.0, 1.0, -phi),
            (phi, 0.0, -1.0),
            (phi, 0.0, 1.0),
            (-phi, 0.0, -1.0),
            (-phi, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Point3::from(Vector3::new(x, y, z).normalize()))
        .collect();

        let mut faces: Vec<[u32; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints: std::collections::HashMap<(u32, u32), u32> =
                std::collections::HashMap::new();
            let mut next = Vec::with_capacity(faces.len() * 4);
            for [a, b, c] in faces {
                let ab = midpoint(&mut points, &mut midpoints, a, b);
                let bc = midpoint(&mut points, &mut midpoints, b, c);
                let ca = midpoint(&mut points, &mut midpoints, c, a);
                next.push([a, ab, ca]);
                next.push([b, bc, ab]);
                next.push([c, ca, bc]);
                next.push([ab, bc, ca]);
            }
            faces = next;
        }

        Self { points, faces }
    }
}

fn midpoint(
    points: &mut Vec<Point3<f64>>,
    cache: &mut std::collections::HashMap<(u32, u32), u32>,
    a: u32,
    b: u32,
) -> u32 {
    let key = if a < b { (a, b) } else { (b, a) };
    if let Some(&idx) = cache.get(&key) {
        return idx;
    }
    let mid = nalgebra::center(&points[a as usize], &points[b as usize]);
    let idx = points.len() as u32;
    points.push(Point3::from(mid.coords.normalize()));
    cache.insert(key, idx);
    idx
}

/// Möller–Trumbore ray/triangle test for a ray starting at `origin`.
///
/// Hits at negative `t` are rejected; hits exactly on an edge count once
/// per adjacent face, which the parity test tolerates for points clearly
/// inside or outside.
fn ray_hits_triangle(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> bool {
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < 1e-14 {
        return false;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let q = s.cross(&e1);
    let v = dir.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    e2.dot(&q) * inv_det > 0.0
}

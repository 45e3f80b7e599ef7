//! Discrete cell coordinates.

use std::fmt;
use std::ops::{Add, Sub};

/// A discrete 3D cell coordinate in the spatial partition.
///
/// Cell coordinates are signed so the partition can grow in any direction
/// from its origin.
///
/// # Example
///
/// ```
/// use dem_spatial::CellIndex;
///
/// let a = CellIndex::new(1, 2, 3);
/// let b = CellIndex::new(1, 0, 0);
/// assert_eq!(a + b, CellIndex::new(2, 2, 3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellIndex {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl CellIndex {
    /// Creates a new cell index.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The origin cell (0, 0, 0).
    #[must_use]
    pub const fn origin() -> Self {
        Self::new(0, 0, 0)
    }

    /// Chebyshev (maximum-coordinate) distance to another cell.
    #[must_use]
    pub const fn chebyshev_distance(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let dz = self.z.abs_diff(other.z);
        let m = if dx > dy { dx } else { dy };
        if m > dz {
            m
        } else {
            dz
        }
    }

    /// Iterates over the cube of cells within `radius` of this cell,
    /// including the cell itself. `radius = 1` yields the 27-cell
    /// neighborhood.
    pub fn cube_around(self, radius: i32) -> impl Iterator<Item = Self> {
        let r = radius.abs();
        (-r..=r).flat_map(move |dz| {
            (-r..=r).flat_map(move |dy| {
                (-r..=r).map(move |dx| Self::new(self.x + dx, self.y + dy, self.z + dz))
            })
        })
    }

    /// Iterates over the 26 neighbors of this cell (the cell itself excluded).
    pub fn neighbors(self) -> impl Iterator<Item = Self> {
        self.cube_around(1).filter(move |&c| c != self)
    }
}

impl Add for CellIndex {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for CellIndex {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

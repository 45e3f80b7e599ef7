//! Rank-ownership partition of space.

use std::collections::HashMap;

use nalgebra::Point3;

use dem_types::{Aabb, RankId};

use crate::cell::CellIndex;
use crate::error::SpatialError;

/// A sparse voxel map from regions of space to the compute rank that owns
/// them.
///
/// Each rank marks the cells covered by its share of the flow mesh, then all
/// rank-local maps are combined into one global map that every rank holds a
/// copy of. Combination is a max-reduction per cell: when two ranks both
/// claim a cell (overlapping mesh halos), the higher rank wins on every
/// rank, so ownership stays exclusive and consistent without negotiation.
///
/// The origin is pulled two cells below the global minimum so that bodies
/// slightly outside the meshed region still map to valid (unowned) cells.
///
/// # Example
///
/// ```
/// use dem_spatial::{CellIndex, SpatialPartition};
/// use dem_types::RankId;
/// use nalgebra::Point3;
///
/// let mut partition = SpatialPartition::try_new(1.0, Point3::origin()).unwrap();
/// partition.mark(CellIndex::new(2, 2, 2), RankId::new(0));
/// partition.mark(CellIndex::new(3, 2, 2), RankId::new(1));
///
/// assert_eq!(partition.owner(CellIndex::new(2, 2, 2)), Some(RankId::new(0)));
/// assert!(partition.is_near_boundary(CellIndex::new(2, 2, 2), 1, RankId::new(0)));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpatialPartition {
    /// Edge length of one cell in world units.
    cell_size: f64,
    /// Inverse cell size for faster conversion.
    inv_cell_size: f64,
    /// World position of cell (0, 0, 0)'s minimum corner.
    origin: Point3<f64>,
    /// Sparse ownership map.
    owners: HashMap<CellIndex, RankId>,
}

impl SpatialPartition {
    /// Margin, in cells, between the global minimum and the grid origin.
    const ORIGIN_MARGIN: f64 = 2.0;

    /// Creates a partition over a domain whose minimum corner is `global_min`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidCellSize`] if `cell_size` is not
    /// positive and finite.
    pub fn try_new(cell_size: f64, global_min: Point3<f64>) -> Result<Self, SpatialError> {
        if cell_size <= 0.0 || !cell_size.is_finite() {
            return Err(SpatialError::InvalidCellSize(cell_size));
        }
        let margin = Self::ORIGIN_MARGIN * cell_size;
        let origin = Point3::new(
            global_min.x - margin,
            global_min.y - margin,
            global_min.z - margin,
        );
        Ok(Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            origin,
            owners: HashMap::new(),
        })
    }

    /// Returns the cell size.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Returns the grid origin in world space.
    #[must_use]
    pub const fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    /// Number of owned cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether no cell is owned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Converts a world-space point to its cell.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn world_to_cell(&self, point: &Point3<f64>) -> CellIndex {
        let relative = point - self.origin;
        CellIndex::new(
            (relative.x * self.inv_cell_size).floor() as i32,
            (relative.y * self.inv_cell_size).floor() as i32,
            (relative.z * self.inv_cell_size).floor() as i32,
        )
    }

    /// World-space center of a cell.
    #[must_use]
    pub fn cell_center(&self, cell: CellIndex) -> Point3<f64> {
        let half = self.cell_size * 0.5;
        Point3::new(
            f64::from(cell.x).mul_add(self.cell_size, self.origin.x) + half,
            f64::from(cell.y).mul_add(self.cell_size, self.origin.y) + half,
            f64::from(cell.z).mul_add(self.cell_size, self.origin.z) + half,
        )
    }

    /// Claims a cell for a rank, overwriting any previous claim.
    pub fn mark(&mut self, cell: CellIndex, rank: RankId) {
        self.owners.insert(cell, rank);
    }

    /// Claims every cell overlapping a world-space extent for a rank.
    pub fn mark_extent(&mut self, extent: &Aabb, rank: RankId) {
        let min = self.world_to_cell(&extent.min);
        let max = self.world_to_cell(&extent.max);
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    self.mark(CellIndex::new(x, y, z), rank);
                }
            }
        }
    }

    /// Max-combines another partition's claims into this one.
    ///
    /// For a contested cell the higher rank wins. Applying this pairwise
    /// over all ranks' local maps, in any order, yields the same global map
    /// everywhere.
    pub fn merge_max(&mut self, entries: impl IntoIterator<Item = (CellIndex, RankId)>) {
        for (cell, rank) in entries {
            self.owners
                .entry(cell)
                .and_modify(|current| {
                    if rank > *current {
                        *current = rank;
                    }
                })
                .or_insert(rank);
        }
    }

    /// Owner of a cell, if any rank claimed it.
    #[must_use]
    pub fn owner(&self, cell: CellIndex) -> Option<RankId> {
        self.owners.get(&cell).copied()
    }

    /// Owner of the cell containing a world-space point.
    #[must_use]
    pub fn owner_at(&self, point: &Point3<f64>) -> Option<RankId> {
        self.owner(self.world_to_cell(point))
    }

    /// Distinct foreign ranks owning cells within `radius` cells of `cell`
    /// (Chebyshev metric); `radius = 1` is the 26-neighborhood.
    ///
    /// The result is sorted, so iteration order is deterministic across
    /// ranks.
    #[must_use]
    pub fn neighbor_ranks(&self, cell: CellIndex, radius: i32, exclude: RankId) -> Vec<RankId> {
        let mut ranks: Vec<RankId> = cell
            .cube_around(radius)
            .filter(|&c| c != cell)
            .filter_map(|c| self.owner(c))
            .filter(|&r| r != exclude)
            .collect();
        ranks.sort_unstable();
        ranks.dedup();
        ranks
    }

    /// Whether a cell owned by `rank` touches territory of another rank
    /// (or unowned space) within `radius` cells.
    #[must_use]
    pub fn is_near_boundary(&self, cell: CellIndex, radius: i32, rank: RankId) -> bool {
        cell.cube_around(radius)
            .any(|c| c != cell && self.owner(c) != Some(rank))
    }

    /// Iterates over all (cell, owner) claims.
    pub fn entries(&self) -> impl Iterator<Item = (CellIndex, RankId)> + '_ {
        self.owners.iter().map(|(&c, &r)| (c, r))
    }

    /// Iterates over all cells owned by one rank.
    pub fn cells_owned_by(&self, rank: RankId) -> impl Iterator<Item = CellIndex> + '_ {
        self.owners
            .iter()
            .filter(move |(_, &r)| r == rank)
            .map(|(&c, _)| c)
    }

    /// Distinct ranks present in the map, sorted.
    #[must_use]
    pub fn ranks(&self) -> Vec<RankId> {
        let mut ranks: Vec<RankId> = self.owners.values().copied().collect();
        ranks.sort_unstable();
        ranks.dedup();
        ranks
    }

    /// Removes every claim.
    pub fn clear(&mut self) {
        self.owners.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn partition() -> SpatialPartition {
        SpatialPartition::try_new(1.0, Point3::origin()).unwrap()
    }

    #[test]
    fn rejects_bad_cell_size() {
        assert!(matches!(
            SpatialPartition::try_new(0.0, Point3::origin()),
            Err(SpatialError::InvalidCellSize(_))
        ));
        assert!(matches!(
            SpatialPartition::try_new(f64::NAN, Point3::origin()),
            Err(SpatialError::InvalidCellSize(_))
        ));
    }

    #[test]
    fn origin_sits_below_global_min() {
        let p = SpatialPartition::try_new(0.5, Point3::new(1.0, 1.0, 1.0)).unwrap();
        // Origin pulled back by two cells.
        assert!((p.origin().x - 0.0).abs() < 1e-12);
        // The global minimum itself lands in cell (2, 2, 2).
        assert_eq!(
            p.world_to_cell(&Point3::new(1.0, 1.0, 1.0)),
            CellIndex::new(2, 2, 2)
        );
        // A point slightly outside the domain still maps to a valid cell.
        assert_eq!(
            p.world_to_cell(&Point3::new(0.2, 1.0, 1.0)).x,
            0
        );
    }

    #[test]
    fn mark_and_lookup() {
        let mut p = partition();
        p.mark_extent(
            &Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(1.5, 1.5, 1.5)),
            RankId::new(3),
        );
        assert_eq!(p.owner_at(&Point3::new(0.6, 0.6, 0.6)), Some(RankId::new(3)));
        assert_eq!(p.owner_at(&Point3::new(9.0, 9.0, 9.0)), None);
    }

    #[test]
    fn merge_max_is_order_independent() {
        let mut forward = partition();
        let mut backward = partition();
        let contested = CellIndex::new(1, 1, 1);

        forward.mark(contested, RankId::new(0));
        forward.merge_max([(contested, RankId::new(2))]);

        backward.mark(contested, RankId::new(2));
        backward.merge_max([(contested, RankId::new(0))]);

        assert_eq!(forward.owner(contested), Some(RankId::new(2)));
        assert_eq!(backward.owner(contested), Some(RankId::new(2)));
    }

    #[test]
    fn neighbor_ranks_sorted_and_deduped() {
        let mut p = partition();
        let cell = CellIndex::new(5, 5, 5);
        p.mark(cell, RankId::new(0));
        p.mark(CellIndex::new(6, 5, 5), RankId::new(2));
        p.mark(CellIndex::new(6, 6, 5), RankId::new(2));
        p.mark(CellIndex::new(4, 5, 5), RankId::new(1));
        p.mark(CellIndex::new(5, 6, 5), RankId::new(0));

        assert_eq!(
            p.neighbor_ranks(cell, 1, RankId::new(0)),
            vec![RankId::new(1), RankId::new(2)]
        );
    }

    #[test]
    fn boundary_detection() {
        let mut p = partition();
        // A 3x3x3 block owned by rank 0: only the center cell is interior.
        for c in CellIndex::new(1, 1, 1).cube_around(1) {
            p.mark(c, RankId::new(0));
        }
        assert!(p.is_near_boundary(CellIndex::new(0, 0, 0), 1, RankId::new(0)));
        assert!(!p.is_near_boundary(CellIndex::new(1, 1, 1), 1, RankId::new(0)));
    }

    #[test]
    fn neighbor_radius_widens_the_search() {
        let mut p = partition();
        let center = CellIndex::new(5, 5, 5);
        // Rank 0 fills the radius-2 cube; rank 1 re-claims one cell two
        // cells away, invisible to a radius-1 scan.
        for c in center.cube_around(2) {
            p.mark(c, RankId::new(0));
        }
        p.mark(CellIndex::new(7, 5, 5), RankId::new(1));

        assert!(p.neighbor_ranks(center, 1, RankId::new(0)).is_empty());
        assert!(!p.is_near_boundary(center, 1, RankId::new(0)));
        assert_eq!(
            p.neighbor_ranks(center, 2, RankId::new(0)),
            vec![RankId::new(1)]
        );
        assert!(p.is_near_boundary(center, 2, RankId::new(0)));
    }

    #[test]
    fn cells_owned_by_filters() {
        let mut p = partition();
        p.mark(CellIndex::new(0, 0, 0), RankId::new(0));
        p.mark(CellIndex::new(1, 0, 0), RankId::new(1));
        p.mark(CellIndex::new(2, 0, 0), RankId::new(1));

        assert_eq!(p.cells_owned_by(RankId::new(1)).count(), 2);
        assert_eq!(p.ranks(), vec![RankId::new(0), RankId::new(1)]);
    }
}

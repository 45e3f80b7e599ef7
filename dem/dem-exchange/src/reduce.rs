//! Global reductions over the communicator.

use dem_spatial::{CellIndex, SpatialPartition};
use dem_types::{Aabb, RankId};

use crate::error::ExchangeError;
use crate::transport::Transport;

/// Merge every rank's local extent into the global domain bounds.
///
/// Ranks with no local extent contribute nothing; the result is `None`
/// only when no rank has one.
pub fn reduce_bounds<Tr: Transport + ?Sized>(
    transport: &Tr,
    local: Option<Aabb>,
) -> Result<Option<Aabb>, ExchangeError> {
    let payload = serde_json::to_vec(&local)?;
    let gathered = transport.all_gather(payload)?;

    let mut merged: Option<Aabb> = None;
    for bytes in gathered {
        let contribution: Option<Aabb> = serde_json::from_slice(&bytes)?;
        if let Some(aabb) = contribution {
            merged = Some(match merged {
                Some(acc) => acc.merged(&aabb),
                None => aabb,
            });
        }
    }
    Ok(merged)
}

/// Combine every rank's ownership claims into one global partition map.
///
/// Each rank contributes its locally marked cells; the claims are
/// max-combined, so every rank ends up with the identical map regardless of
/// gather order.
pub fn reduce_partition<Tr: Transport + ?Sized>(
    transport: &Tr,
    partition: &mut SpatialPartition,
) -> Result<(), ExchangeError> {
    let my_rank = transport.rank();
    let local: Vec<(CellIndex, RankId)> = partition
        .entries()
        .filter(|&(_, rank)| rank == my_rank)
        .collect();
    let payload = serde_json::to_vec(&local)?;

    for bytes in transport.all_gather(payload)? {
        let claims: Vec<(CellIndex, RankId)> = serde_json::from_slice(&bytes)?;
        partition.merge_max(claims);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::{LocalCluster, SoloTransport};
    use nalgebra::Point3;

    #[test]
    fn solo_bounds_reduction_is_identity() {
        let local = Some(Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)));
        let merged = reduce_bounds(&SoloTransport, local).unwrap();
        assert_eq!(merged, local);
        assert_eq!(reduce_bounds::<SoloTransport>(&SoloTransport, None).unwrap(), None);
    }

    #[test]
    fn bounds_reduction_covers_all_ranks() {
        let results = LocalCluster::run(3, |t| {
            let r = f64::from(t.rank().raw());
            // Rank 2 contributes nothing.
            let local = (t.rank().raw() < 2)
                .then(|| Aabb::new(Point3::new(r, 0.0, 0.0), Point3::new(r + 1.0, 1.0, 1.0)));
            reduce_bounds(&t, local).unwrap().unwrap()
        });
        for merged in results {
            assert!((merged.min.x - 0.0).abs() < 1e-12);
            assert!((merged.max.x - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn partition_reduction_gives_identical_maps() {
        let results = LocalCluster::run(2, |t| {
            let mut partition = SpatialPartition::try_new(1.0, Point3::origin()).unwrap();
            let me = t.rank();
            // Each rank claims its own column; both claim the contested cell.
            partition.mark(CellIndex::new(me.raw() as i32, 0, 0), me);
            partition.mark(CellIndex::new(9, 9, 9), me);
            reduce_partition(&t, &mut partition).unwrap();
            (
                partition.owner(CellIndex::new(0, 0, 0)),
                partition.owner(CellIndex::new(1, 0, 0)),
                partition.owner(CellIndex::new(9, 9, 9)),
            )
        });
        // Both ranks agree: contested cell goes to the higher rank.
        for (c0, c1, contested) in results {
            assert_eq!(c0, Some(RankId::new(0)));
            assert_eq!(c1, Some(RankId::new(1)));
            assert_eq!(contested, Some(RankId::new(1)));
        }
    }
}

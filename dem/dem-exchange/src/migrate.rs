//! The migration state machine and the two-phase record exchange.
//!
//! Transitions are evaluated once per step, after motion integration,
//! purely from the partition's view of the body's cell:
//!
//! - an authoritative body in this rank's interior is (or becomes) Free;
//! - an authoritative body in this rank's boundary layer becomes a Master
//!   and is ghosted to every neighboring rank;
//! - an authoritative body inside another rank's territory is handed off;
//! - a body in unowned space is orphaned;
//! - slaves are discarded every step and rebuilt from the incoming ghost
//!   records, which makes duplicate receipt naturally idempotent.

use serde::de::DeserializeOwned;
use serde::Serialize;

use dem_types::{RankId, Residency};

use crate::error::ExchangeError;
use crate::transport::Transport;

/// Outcome of one body's per-step migration evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Keep the current residency; nothing to send.
    Stay,
    /// Become (or stay) a Free interior body.
    BecomeFree,
    /// Become (or stay) a Master; send ghost records to these ranks.
    BecomeMaster {
        /// Neighbor ranks that must hold a slave copy.
        ghosts: Vec<RankId>,
    },
    /// Ownership moved: send the body to `to` and drop it here.
    Handoff {
        /// The new owning rank.
        to: RankId,
    },
    /// Drop the local copy (slaves, every step).
    Discard,
    /// The body's cell is owned by no rank.
    Orphaned,
}

/// Evaluate one body's transition.
///
/// `owner` is the rank owning the body's cell, `near_boundary` whether that
/// cell touches foreign or unowned territory, `neighbors` the distinct
/// foreign ranks around it.
#[must_use]
pub fn evaluate_transition(
    residency: Residency,
    my_rank: RankId,
    owner: Option<RankId>,
    near_boundary: bool,
    neighbors: &[RankId],
) -> Transition {
    if residency.is_structure() {
        return Transition::Stay;
    }
    if !residency.is_authoritative() {
        return Transition::Discard;
    }
    match owner {
        Some(rank) if rank == my_rank => {
            if near_boundary && !neighbors.is_empty() {
                Transition::BecomeMaster {
                    ghosts: neighbors.to_vec(),
                }
            } else {
                Transition::BecomeFree
            }
        }
        Some(foreign) => Transition::Handoff { to: foreign },
        None => Transition::Orphaned,
    }
}

/// Two-phase all-to-all record exchange.
///
/// Phase one announces per-peer record counts as 4-byte little-endian
/// integers; phase two carries the payloads. The decoded payloads are
/// checked against the announced counts, so a torn or misrouted payload is
/// an error instead of silently wrong physics.
pub fn exchange_records<T, Tr>(
    transport: &Tr,
    outgoing: Vec<Vec<T>>,
) -> Result<Vec<Vec<T>>, ExchangeError>
where
    T: Serialize + DeserializeOwned,
    Tr: Transport + ?Sized,
{
    let size = transport.size();
    if outgoing.len() != size {
        return Err(ExchangeError::RankOutOfRange {
            rank: outgoing.len().saturating_sub(1),
            size,
        });
    }

    #[allow(clippy::cast_possible_truncation)]
    let counts: Vec<Vec<u8>> = outgoing
        .iter()
        .map(|records| (records.len() as u32).to_le_bytes().to_vec())
        .collect();
    let announced: Vec<usize> = transport
        .exchange(counts)?
        .into_iter()
        .map(|bytes| {
            let mut raw = [0_u8; 4];
            let n = bytes.len().min(4);
            raw[..n].copy_from_slice(&bytes[..n]);
            u32::from_le_bytes(raw) as usize
        })
        .collect();

    let sending: usize = outgoing.iter().map(Vec::len).sum();
    let receiving: usize = announced.iter().sum();
    tracing::debug!(rank = transport.rank().raw(), sending, receiving, "record exchange");

    let payloads: Vec<Vec<u8>> = outgoing
        .iter()
        .map(|records| serde_json::to_vec(records))
        .collect::<Result<_, _>>()?;
    let incoming_raw = transport.exchange(payloads)?;

    let mut incoming = Vec::with_capacity(size);
    for (peer, bytes) in incoming_raw.into_iter().enumerate() {
        let records: Vec<T> = serde_json::from_slice(&bytes)?;
        if records.len() != announced[peer] {
            return Err(ExchangeError::CountMismatch {
                rank: peer,
                announced: announced[peer],
                received: records.len(),
            });
        }
        incoming.push(records);
    }
    Ok(incoming)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::BodyRecord;
    use crate::transport::{LocalCluster, SoloTransport};
    use dem_types::{BodyKey, KinematicState, PopulationId};
    use nalgebra::Point3;

    fn rank(r: u32) -> RankId {
        RankId::new(r)
    }

    #[test]
    fn interior_body_is_free() {
        let t = evaluate_transition(Residency::Master, rank(0), Some(rank(0)), false, &[]);
        assert_eq!(t, Transition::BecomeFree);
    }

    #[test]
    fn boundary_body_is_master_with_ghosts() {
        let t = evaluate_transition(
            Residency::Free,
            rank(0),
            Some(rank(0)),
            true,
            &[rank(1), rank(2)],
        );
        assert_eq!(
            t,
            Transition::BecomeMaster {
                ghosts: vec![rank(1), rank(2)]
            }
        );
    }

    #[test]
    fn boundary_to_unowned_space_stays_free() {
        // Near-boundary but with no foreign neighbor: nothing to ghost to.
        let t = evaluate_transition(Residency::Free, rank(0), Some(rank(0)), true, &[]);
        assert_eq!(t, Transition::BecomeFree);
    }

    #[test]
    fn crossing_into_foreign_territory_hands_off() {
        let t = evaluate_transition(Residency::Master, rank(0), Some(rank(3)), true, &[rank(3)]);
        assert_eq!(t, Transition::Handoff { to: rank(3) });
    }

    #[test]
    fn slaves_discard_and_structures_stay() {
        assert_eq!(
            evaluate_transition(Residency::Slave, rank(0), Some(rank(0)), true, &[]),
            Transition::Discard
        );
        assert_eq!(
            evaluate_transition(Residency::Structure, rank(0), Some(rank(5)), true, &[]),
            Transition::Stay
        );
    }

    #[test]
    fn leaving_the_domain_orphans() {
        assert_eq!(
            evaluate_transition(Residency::Free, rank(0), None, true, &[]),
            Transition::Orphaned
        );
    }

    fn record(local: u64) -> BodyRecord {
        BodyRecord::from_state(
            BodyKey::new(rank(0), PopulationId::new(0), local),
            &KinematicState::at_rest(Point3::origin()),
        )
    }

    #[test]
    fn solo_exchange_loops_back() {
        let incoming = exchange_records(&SoloTransport, vec![vec![record(1), record(2)]]).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].len(), 2);
        assert_eq!(incoming[0][1].key.local, 2);
    }

    #[test]
    fn two_phase_exchange_routes_and_counts() {
        let results = LocalCluster::run(3, |t| {
            let me = t.rank().raw();
            // Send `peer + 1` records to each peer, stamped with my rank.
            let outgoing: Vec<Vec<BodyRecord>> = (0..3)
                .map(|peer| {
                    (0..=peer)
                        .map(|i| {
                            BodyRecord::from_state(
                                BodyKey::new(rank(me), PopulationId::new(0), i as u64),
                                &KinematicState::at_rest(Point3::origin()),
                            )
                        })
                        .collect()
                })
                .collect();
            let incoming = exchange_records(&t, outgoing).unwrap();
            // Every peer sent me `my_rank + 1` records stamped with its rank.
            incoming
                .iter()
                .enumerate()
                .all(|(peer, records)| {
                    records.len() == me as usize + 1
                        && records.iter().all(|r| r.key.rank == rank(peer as u32))
                })
        });
        assert!(results.into_iter().all(|ok| ok));
    }
}

//! Transport abstraction over the communicator.
//!
//! The engine only ever needs three collective operations: an all-to-all
//! byte exchange, an all-gather, and a barrier. Everything cross-rank is
//! built from those, so swapping the communicator (single process, threads,
//! MPI bindings) never touches the engine.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};

use dem_types::RankId;

use crate::error::ExchangeError;

/// A communicator connecting all ranks of one run.
pub trait Transport {
    /// This rank's identity.
    fn rank(&self) -> RankId;

    /// Number of ranks in the communicator.
    fn size(&self) -> usize;

    /// All-to-all exchange: `outgoing[i]` goes to rank `i`; the result's
    /// element `i` is what rank `i` sent here. `outgoing.len()` must equal
    /// `size()`; every rank must call this collectively.
    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, ExchangeError>;

    /// Gather one payload from every rank, in rank order, on every rank.
    fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>, ExchangeError> {
        let outgoing = vec![payload; self.size()];
        self.exchange(outgoing)
    }

    /// Block until every rank has arrived.
    fn barrier(&self) -> Result<(), ExchangeError>;
}

/// The single-rank communicator: every collective is a local no-op.
#[derive(Debug, Clone, Default)]
pub struct SoloTransport;

impl Transport for SoloTransport {
    fn rank(&self) -> RankId {
        RankId::new(0)
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange(&self, mut outgoing: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, ExchangeError> {
        if outgoing.len() != 1 {
            return Err(ExchangeError::RankOutOfRange {
                rank: outgoing.len().saturating_sub(1),
                size: 1,
            });
        }
        Ok(vec![outgoing.remove(0)])
    }

    fn barrier(&self) -> Result<(), ExchangeError> {
        Ok(())
    }
}

/// An in-process communicator: one thread per rank, channels between them.
///
/// Intended for tests and single-machine runs. Channels are FIFO per
/// sender but merge into one queue at the receiver, so a rank that races
/// ahead can deliver its next collective's message before a slow peer's
/// current one. Every message therefore carries the index of the
/// collective that produced it; receipts from a later collective are held
/// back until this rank catches up.
///
/// # Example
///
/// ```
/// use dem_exchange::{LocalCluster, Transport};
///
/// let results = LocalCluster::run(3, |transport| {
///     let payload = vec![transport.rank().raw() as u8];
///     let gathered = transport.all_gather(payload).unwrap();
///     gathered.len()
/// });
/// assert_eq!(results, vec![3, 3, 3]);
/// ```
pub struct LocalCluster;

impl LocalCluster {
    /// Spawn `size` ranks, run `f` on each with its transport, and return
    /// the per-rank results in rank order.
    ///
    /// # Panics
    ///
    /// Panics if a rank thread panics.
    pub fn run<F, T>(size: usize, f: F) -> Vec<T>
    where
        F: Fn(LocalTransport) -> T + Send + Sync,
        T: Send,
    {
        assert!(size > 0, "cluster needs at least one rank");

        let mut senders: Vec<Sender<Packet>> = Vec::with_capacity(size);
        let mut receivers: Vec<Receiver<Packet>> = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = channel();
            senders.push(tx);
            receivers.push(rx);
        }
        let barrier = Arc::new(Barrier::new(size));

        let transports: Vec<LocalTransport> = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| LocalTransport {
                rank,
                size,
                senders: senders.clone(),
                inbox: Mutex::new(Inbox {
                    receiver: rx,
                    stashed: Vec::new(),
                    epoch: 0,
                }),
                barrier: Arc::clone(&barrier),
            })
            .collect();
        drop(senders);

        std::thread::scope(|scope| {
            let handles: Vec<_> = transports
                .into_iter()
                .map(|transport| {
                    let f = &f;
                    scope.spawn(move || f(transport))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}

/// One message on a cluster edge: source rank, collective epoch, payload.
type Packet = (usize, u64, Vec<u8>);

/// Receive side of one rank: the merged channel plus any messages that
/// arrived ahead of the collective this rank is currently in.
struct Inbox {
    receiver: Receiver<Packet>,
    stashed: Vec<Packet>,
    /// Number of collectives completed on this endpoint.
    epoch: u64,
}

/// One rank's endpoint in a [`LocalCluster`].
pub struct LocalTransport {
    rank: usize,
    size: usize,
    senders: Vec<Sender<Packet>>,
    inbox: Mutex<Inbox>,
    barrier: Arc<Barrier>,
}

impl Transport for LocalTransport {
    #[allow(clippy::cast_possible_truncation)]
    fn rank(&self) -> RankId {
        RankId::new(self.rank as u32)
    }

    fn size(&self) -> usize {
        self.size
    }

    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, ExchangeError> {
        if outgoing.len() != self.size {
            return Err(ExchangeError::RankOutOfRange {
                rank: outgoing.len().saturating_sub(1),
                size: self.size,
            });
        }

        let mut inbox = self
            .inbox
            .lock()
            .map_err(|_| ExchangeError::Disconnected { rank: self.rank })?;
        let epoch = inbox.epoch;
        inbox.epoch += 1;

        for (peer, payload) in outgoing.into_iter().enumerate() {
            self.senders[peer]
                .send((self.rank, epoch, payload))
                .map_err(|_| ExchangeError::Disconnected { rank: peer })?;
        }

        // Every peer sends exactly one message per collective, so exactly
        // `size` messages carry this epoch.
        let mut incoming: Vec<Option<Vec<u8>>> = vec![None; self.size];
        let mut pending = self.size;

        let stashed = std::mem::take(&mut inbox.stashed);
        for (source, sent_epoch, payload) in stashed {
            if sent_epoch == epoch {
                incoming[source] = Some(payload);
                pending -= 1;
            } else {
                inbox.stashed.push((source, sent_epoch, payload));
            }
        }
        while pending > 0 {
            let (source, sent_epoch, payload) = inbox
                .receiver
                .recv()
                .map_err(|_| ExchangeError::Disconnected { rank: self.rank })?;
            if sent_epoch == epoch {
                incoming[source] = Some(payload);
                pending -= 1;
            } else {
                // The sender is already in a later collective.
                inbox.stashed.push((source, sent_epoch, payload));
            }
        }

        incoming
            .into_iter()
            .enumerate()
            .map(|(source, slot)| slot.ok_or(ExchangeError::Disconnected { rank: source }))
            .collect()
    }

    fn barrier(&self) -> Result<(), ExchangeError> {
        self.barrier.wait();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn solo_exchange_is_identity() {
        let t = SoloTransport;
        let result = t.exchange(vec![vec![1, 2, 3]]).unwrap();
        assert_eq!(result, vec![vec![1, 2, 3]]);
        assert_eq!(t.size(), 1);
    }

    #[test]
    fn cluster_exchange_routes_by_rank() {
        let results = LocalCluster::run(4, |t| {
            let me = t.rank().raw() as u8;
            // Send [me, peer] to each peer.
            let outgoing = (0..4).map(|peer| vec![me, peer as u8]).collect();
            let incoming = t.exchange(outgoing).unwrap();
            // Message from rank i must carry [i, me].
            for (i, msg) in incoming.iter().enumerate() {
                assert_eq!(msg, &vec![i as u8, me]);
            }
            me
        });
        assert_eq!(results, vec![0, 1, 2, 3]);
    }

    #[test]
    fn consecutive_collectives_do_not_interleave() {
        let results = LocalCluster::run(3, |t| {
            let first = t.all_gather(vec![1]).unwrap();
            let second = t.all_gather(vec![2]).unwrap();
            (first[0][0], second[2][0])
        });
        assert!(results.iter().all(|&(a, b)| a == 1 && b == 2));
    }

    #[test]
    fn fast_ranks_cannot_outrun_slow_peers() {
        // Many back-to-back collectives with nothing between them: a rank
        // that finishes round k can send its round k+1 payload before a
        // slow peer's round k payload lands. Every receipt must still be
        // matched to the right round and the right sender.
        let results = LocalCluster::run(8, |t| {
            let me = t.rank().raw() as u8;
            for round in 0..200_u8 {
                let incoming = t.all_gather(vec![round, me]).unwrap();
                for (peer, message) in incoming.iter().enumerate() {
                    if message != &vec![round, peer as u8] {
                        return false;
                    }
                }
            }
            true
        });
        assert!(results.into_iter().all(|ok| ok));
    }
}

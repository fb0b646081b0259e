// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Per-port collection of buffer records.

use tracing::{debug, warn};

use super::{BufferId, BufferRecord, Owner};
use crate::{Error, Port, Result};

/// Number of records per owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerCounts {
    pub pending: usize,
    pub with_app: usize,
    pub with_peer: usize,
    pub with_surface: usize,
}

impl OwnerCounts {
    pub fn total(&self) -> usize {
        self.pending + self.with_app + self.with_peer + self.with_surface
    }

    pub fn get(&self, owner: Owner) -> usize {
        match owner {
            Owner::Pending => self.pending,
            Owner::WithApp => self.with_app,
            Owner::WithPeer => self.with_peer,
            Owner::WithSurface => self.with_surface,
        }
    }

    fn slot(&mut self, owner: Owner) -> &mut usize {
        match owner {
            Owner::Pending => &mut self.pending,
            Owner::WithApp => &mut self.with_app,
            Owner::WithPeer => &mut self.with_peer,
            Owner::WithSurface => &mut self.with_surface,
        }
    }
}

/// Ordered, id-unique sequence of the records of one port.
///
/// All owner changes go through [`BufferPool::transfer`], which enforces the
/// ownership graph. Records are only added or removed while driver-owned.
#[derive(Debug)]
pub struct BufferPool {
    port: Port,
    records: Vec<BufferRecord>,
    counts: OwnerCounts,
}

impl BufferPool {
    pub fn new(port: Port) -> Self {
        Self {
            port,
            records: Vec::new(),
            counts: OwnerCounts::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn counts(&self) -> OwnerCounts {
        self.counts
    }

    pub fn get(&self, id: BufferId) -> Option<&BufferRecord> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: BufferId) -> Option<&mut BufferRecord> {
        self.records.iter_mut().find(|record| record.id() == id)
    }

    /// Ids of every record currently held by `owner`, in pool order.
    pub fn ids_owned_by(&self, owner: Owner) -> Vec<BufferId> {
        self.records
            .iter()
            .filter(|record| record.owner() == owner)
            .map(BufferRecord::id)
            .collect()
    }

    /// Finds the record wrapping the surface buffer with sequence `seq`.
    pub fn find_by_surface_seq(&self, seq: u32) -> Option<BufferId> {
        self.records
            .iter()
            .find(|record| {
                record
                    .payload()
                    .surface_buffer()
                    .is_some_and(|buffer| buffer.seq == seq)
            })
            .map(BufferRecord::id)
    }

    /// Adds a freshly allocated, driver-owned record.
    pub(crate) fn insert(&mut self, record: BufferRecord) -> Result<()> {
        if self.get(record.id()).is_some() {
            return Err(Error::InvalidArgument(format!(
                "duplicate buffer id {}",
                record.id()
            )));
        }
        if record.owner() != Owner::Pending {
            return Err(Error::Fatal(format!(
                "buffer {} inserted while owned by {:?}",
                record.id(),
                record.owner()
            )));
        }
        self.counts.pending += 1;
        self.records.push(record);
        Ok(())
    }

    /// Moves ownership of `id` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the id is unknown
    /// - [`Error::Ownership`] (an invalid-state error) if the record is not
    ///   owned by `from` or the edge is not part of the ownership graph;
    ///   nothing is changed
    pub fn transfer(&mut self, id: BufferId, from: Owner, to: Owner) -> Result<()> {
        let port = self.port;
        let record = self.get_mut(id).ok_or_else(|| {
            Error::InvalidArgument(format!("no {port:?} buffer with id {id}"))
        })?;
        if record.owner != from || !Owner::can_transition(from, to) {
            debug!(
                buffer_id = id.0,
                ?port,
                current = ?record.owner,
                ?from,
                ?to,
                "Rejected ownership transition"
            );
            return Err(Error::Ownership {
                id,
                owner: record.owner,
                to,
            });
        }
        record.owner = to;
        *self.counts.slot(from) -= 1;
        *self.counts.slot(to) += 1;
        Ok(())
    }

    /// Removes a driver-owned record and returns it for teardown.
    pub(crate) fn remove(&mut self, id: BufferId) -> Result<BufferRecord> {
        let position = self
            .records
            .iter()
            .position(|record| record.id() == id)
            .ok_or_else(|| Error::InvalidArgument(format!("no buffer with id {id}")))?;
        let owner = self.records[position].owner();
        if owner != Owner::Pending {
            return Err(Error::Ownership {
                id,
                owner,
                to: Owner::Pending,
            });
        }
        self.counts.pending -= 1;
        Ok(self.records.remove(position))
    }

    /// Pulls every record back to the driver regardless of its owner.
    ///
    /// Used by forced shutdown only; each move is still a legal edge.
    pub(crate) fn reclaim_all(&mut self) -> usize {
        let mut reclaimed = 0;
        for owner in [Owner::WithApp, Owner::WithPeer, Owner::WithSurface] {
            for id in self.ids_owned_by(owner) {
                if self.transfer(id, owner, Owner::Pending).is_ok() {
                    reclaimed += 1;
                }
            }
        }
        if reclaimed > 0 {
            warn!(port = ?self.port, reclaimed, "Forcibly reclaimed buffers");
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use hcodec_sys::BufferHeader;
    use proptest::prelude::*;
    use tracing_test::traced_test;

    use super::*;
    use crate::buffer::{Payload, SharedMemory};

    fn pool_with(count: u32) -> BufferPool {
        let mut pool = BufferPool::new(Port::Input);
        for id in 0..count {
            let record = BufferRecord::new(
                BufferId(id),
                Port::Input,
                Payload::Shared(SharedMemory::allocate(8)),
                BufferHeader::new(id, hcodec_sys::PORT_INDEX_INPUT),
            );
            pool.insert(record).unwrap();
        }
        pool
    }

    fn owner_strategy() -> impl Strategy<Value = Owner> {
        prop_oneof![
            Just(Owner::Pending),
            Just(Owner::WithApp),
            Just(Owner::WithPeer),
            Just(Owner::WithSurface),
        ]
    }

    #[test]
    fn rejected_transfer_changes_nothing() {
        let mut pool = pool_with(2);
        pool.transfer(BufferId(0), Owner::Pending, Owner::WithPeer).unwrap();
        let before = pool.counts();

        assert!(matches!(
            pool.transfer(BufferId(0), Owner::WithPeer, Owner::WithApp),
            Err(Error::Ownership { .. })
        ));
        assert!(matches!(
            pool.transfer(BufferId(0), Owner::Pending, Owner::WithApp),
            Err(Error::Ownership { .. })
        ));
        assert!(matches!(
            pool.transfer(BufferId(9), Owner::Pending, Owner::WithApp),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(pool.counts(), before);
        assert_eq!(pool.get(BufferId(0)).unwrap().owner(), Owner::WithPeer);
    }

    #[test]
    #[traced_test]
    fn rejected_transfer_is_logged_with_the_current_owner() {
        let mut pool = pool_with(1);
        pool.transfer(BufferId(0), Owner::Pending, Owner::WithSurface).unwrap();
        assert!(pool.transfer(BufferId(0), Owner::WithApp, Owner::Pending).is_err());
        assert!(logs_contain("Rejected ownership transition"));
        assert!(logs_contain("current=WithSurface"));
    }

    #[test]
    fn only_driver_owned_records_can_be_removed() {
        let mut pool = pool_with(2);
        pool.transfer(BufferId(1), Owner::Pending, Owner::WithApp).unwrap();
        assert!(pool.remove(BufferId(1)).is_err());
        assert!(pool.remove(BufferId(0)).is_ok());
        assert_eq!(pool.len(), 1);
        assert!(pool.insert(BufferRecord::new(
            BufferId(1),
            Port::Input,
            Payload::Shared(SharedMemory::allocate(1)),
            BufferHeader::new(1, 0),
        ))
        .is_err());
    }

    #[test]
    fn reclaim_all_returns_everything_to_the_driver() {
        let mut pool = pool_with(3);
        pool.transfer(BufferId(0), Owner::Pending, Owner::WithApp).unwrap();
        pool.transfer(BufferId(1), Owner::Pending, Owner::WithPeer).unwrap();
        pool.transfer(BufferId(2), Owner::Pending, Owner::WithSurface).unwrap();
        assert_eq!(pool.reclaim_all(), 3);
        assert_eq!(pool.counts().pending, 3);
    }

    proptest! {
        /// Whatever sequence of transfers is attempted, each record's observed
        /// owner sequence is a walk on the ownership graph and the counters
        /// always agree with the records.
        #[test]
        fn observed_walks_stay_on_the_graph(
            steps in prop::collection::vec((0u32..4, owner_strategy(), owner_strategy()), 0..200)
        ) {
            let mut pool = pool_with(4);
            let mut walks: Vec<Vec<Owner>> = vec![vec![Owner::Pending]; 4];
            for (id, from, to) in steps {
                if pool.transfer(BufferId(id), from, to).is_ok() {
                    walks[id as usize].push(to);
                }
                let owner = pool.get(BufferId(id)).unwrap().owner();
                prop_assert_eq!(owner, *walks[id as usize].last().unwrap());
            }
            for walk in &walks {
                for pair in walk.windows(2) {
                    prop_assert!(Owner::can_transition(pair[0], pair[1]));
                }
            }
            let counts = pool.counts();
            prop_assert_eq!(counts.total(), 4);
            for owner in [Owner::Pending, Owner::WithApp, Owner::WithPeer, Owner::WithSurface] {
                prop_assert_eq!(counts.get(owner), pool.ids_owned_by(owner).len());
            }
        }
    }
}

//! Double-buffered aggregation cache.
//!
//! The cache owns two generations of `MetricId -> M` maps. Writers always
//! merge into the *active* generation; a batch boundary flips the active
//! pointer so the previous generation becomes *frozen* and can be drained
//! downstream while new records keep landing in the other buffer.
//!
//! Every mutation is bracketed by a [`HoldGuard`], which bumps the holder
//! count of the generation it targets. [`AggregationCache::drain`] waits for
//! that count to reach zero before taking the frozen contents, so a swap can
//! never hand out a half-written record. Writers never block each other;
//! only the drain waits.

use crate::model::{Metric, MetricId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Default number of distinct identities per generation.
pub const DEFAULT_MAX_IDENTITIES: usize = 1000;

/// Result of folding one record into the active generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First record for this identity in the generation.
    Inserted,
    /// Folded into an existing record.
    Merged,
    /// New identity refused because the generation is at its threshold.
    Rejected,
}

struct Generation<M> {
    entries: DashMap<MetricId, M>,
    /// Distinct identities inserted since the last drain.
    len: AtomicUsize,
    /// Writers currently mutating this generation.
    holders: AtomicUsize,
}

impl<M> Generation<M> {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            len: AtomicUsize::new(0),
            holders: AtomicUsize::new(0),
        }
    }
}

/// Two-generation concurrent map with hold/release guarded swaps.
pub struct AggregationCache<M: Metric> {
    generations: [Generation<M>; 2],
    /// Index of the generation writers merge into.
    active: AtomicUsize,
    /// Set by a successful swap, cleared once the frozen generation is drained.
    frozen_pending: AtomicBool,
    max_identities: usize,
    /// Upper bound on a single wait inside `drain`.
    poll_interval: Duration,
    release_lock: Mutex<()>,
    released: Condvar,
}

impl<M: Metric> AggregationCache<M> {
    /// Create a cache that sheds new identities past `max_identities`.
    pub fn new(max_identities: usize) -> Self {
        Self::with_poll_interval(max_identities, Duration::from_millis(10))
    }

    pub fn with_poll_interval(max_identities: usize, poll_interval: Duration) -> Self {
        Self {
            generations: [Generation::new(), Generation::new()],
            active: AtomicUsize::new(0),
            frozen_pending: AtomicBool::new(false),
            max_identities,
            poll_interval,
            release_lock: Mutex::new(()),
            released: Condvar::new(),
        }
    }

    /// Pin the active generation for the lifetime of the returned guard.
    ///
    /// If a swap races with the pin, the pin is retried so the guard always
    /// refers to a generation that was active *after* its holder count was
    /// raised.
    pub fn hold(&self) -> HoldGuard<'_, M> {
        loop {
            let index = self.active.load(Ordering::SeqCst);
            self.generations[index]
                .holders
                .fetch_add(1, Ordering::SeqCst);
            if self.active.load(Ordering::SeqCst) == index {
                return HoldGuard { cache: self, index };
            }
            self.release(index);
        }
    }

    fn release(&self, index: usize) {
        let previous = self.generations[index]
            .holders
            .fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            let _lock = self.release_lock.lock();
            self.released.notify_all();
        }
    }

    /// Insert into the active generation if the identity is absent.
    pub fn put(&self, record: M) -> bool {
        self.hold().put(record)
    }

    /// Look up an identity in the active generation.
    pub fn get(&self, id: &MetricId) -> Option<M> {
        let index = self.active.load(Ordering::SeqCst);
        self.generations[index]
            .entries
            .get(id)
            .map(|entry| entry.value().clone())
    }

    /// Merge `incoming` into the active generation under a hold.
    pub fn merge_or_insert(&self, incoming: M) -> MergeOutcome {
        self.hold().merge_or_insert(incoming)
    }

    /// Flip the active generation.
    ///
    /// Fails without blocking if the previous frozen generation has not been
    /// drained yet or still has holders.
    pub fn try_swap(&self) -> bool {
        if self.frozen_pending.load(Ordering::SeqCst) {
            return false;
        }

        let active = self.active.load(Ordering::SeqCst);
        let frozen = 1 - active;
        let target = &self.generations[frozen];
        if target.holders.load(Ordering::SeqCst) != 0 || !target.entries.is_empty() {
            return false;
        }

        if self
            .frozen_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.active.store(frozen, Ordering::SeqCst);
        true
    }

    /// Take the frozen generation's contents once every holder has released it.
    ///
    /// Blocks the calling thread. Returns an empty map if nothing was swapped out.
    pub fn drain(&self) -> HashMap<MetricId, M> {
        let frozen = 1 - self.active.load(Ordering::SeqCst);
        let generation = &self.generations[frozen];

        if generation.holders.load(Ordering::SeqCst) != 0 {
            let mut lock = self.release_lock.lock();
            while generation.holders.load(Ordering::SeqCst) != 0 {
                self.released.wait_for(&mut lock, self.poll_interval);
            }
        }

        let keys: Vec<MetricId> = generation
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let mut drained = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some((id, record)) = generation.entries.remove(&key) {
                drained.insert(id, record);
            }
        }
        generation.len.store(0, Ordering::SeqCst);
        self.frozen_pending.store(false, Ordering::SeqCst);

        drained
    }

    /// Distinct identities in the active generation.
    pub fn len(&self) -> usize {
        let index = self.active.load(Ordering::SeqCst);
        self.generations[index].len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the active generation has hit its identity threshold.
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_identities
    }

    /// True while a swapped-out generation is waiting to be drained.
    pub fn has_frozen(&self) -> bool {
        self.frozen_pending.load(Ordering::SeqCst)
    }

    pub fn max_identities(&self) -> usize {
        self.max_identities
    }

    /// Holders currently pinning the frozen generation.
    pub fn frozen_holders(&self) -> usize {
        let frozen = 1 - self.active.load(Ordering::SeqCst);
        self.generations[frozen].holders.load(Ordering::SeqCst)
    }
}

/// Scoped pin on one generation. Released on drop, including during unwinding.
pub struct HoldGuard<'a, M: Metric> {
    cache: &'a AggregationCache<M>,
    index: usize,
}

impl<M: Metric> HoldGuard<'_, M> {
    fn generation(&self) -> &Generation<M> {
        &self.cache.generations[self.index]
    }

    /// Fold `incoming` into the pinned generation.
    ///
    /// Existing identities always merge. New identities are rejected once the
    /// generation holds `max_identities` distinct entries.
    pub fn merge_or_insert(&self, incoming: M) -> MergeOutcome {
        let generation = self.generation();

        if let Some(mut existing) = generation.entries.get_mut(incoming.id()) {
            existing.merge_from(&incoming);
            return MergeOutcome::Merged;
        }

        if generation.len.load(Ordering::SeqCst) >= self.cache.max_identities {
            return MergeOutcome::Rejected;
        }

        match generation.entries.entry(incoming.id().clone()) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().merge_from(&incoming);
                MergeOutcome::Merged
            },
            Entry::Vacant(slot) => {
                slot.insert(incoming);
                generation.len.fetch_add(1, Ordering::SeqCst);
                MergeOutcome::Inserted
            },
        }
    }

    /// Insert `record` only if its identity is absent.
    pub fn put(&self, record: M) -> bool {
        let generation = self.generation();
        if generation.len.load(Ordering::SeqCst) >= self.cache.max_identities {
            return false;
        }
        match generation.entries.entry(record.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                generation.len.fetch_add(1, Ordering::SeqCst);
                true
            },
        }
    }
}

impl<M: Metric> Drop for HoldGuard<'_, M> {
    fn drop(&mut self) {
        self.cache.release(self.index);
    }
}

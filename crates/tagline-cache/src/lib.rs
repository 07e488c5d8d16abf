#![forbid(unsafe_code)]
//! Write-back LRU block cache keyed by physical location.
//!
//! The recency queue is a doubly linked list threaded through an arena of
//! slots; links are slot indices, so promotion and eviction are O(1) index
//! rewrites with no pointer juggling. Front = least recently used, back =
//! most recently used. A `HashMap` gives O(1) membership: a key is in the
//! map iff its entry is linked into the queue exactly once.
//!
//! Eviction flushes the victim through the storage bus as a WRITE before the
//! newcomer is admitted; a failed flush aborts the triggering `put`, keeps
//! the victim resident and leaves the newcomer out. Teardown drops every
//! entry without flushing and reports aggregate counters.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tagline_bus::{StorageBus, check_echo};
use tagline_error::{Result, TaglineError};
use tagline_types::PhysLocation;
use tagline_wire::Packet;
use tracing::{debug, info, trace};

/// Aggregate cache counters, reported at close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub inserts: u64,
    pub gets: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache; 0.0 before any lookup.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            #[expect(clippy::cast_precision_loss)]
            let ratio = self.hits as f64 / lookups as f64;
            ratio
        }
    }
}

#[derive(Debug)]
struct Entry {
    key: PhysLocation,
    data: Vec<u8>,
    /// Toward the front (LRU side).
    prev: Option<usize>,
    /// Toward the back (MRU side).
    next: Option<usize>,
}

/// Fixed-capacity write-back cache over a storage bus.
#[derive(Debug)]
pub struct BlockCache<B: StorageBus> {
    bus: Arc<B>,
    capacity: usize,
    block_size: usize,
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    index: HashMap<PhysLocation, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    stats: CacheStats,
}

impl<B: StorageBus> BlockCache<B> {
    /// Capacity is fixed for the cache's lifetime and must be non-zero.
    pub fn new(bus: Arc<B>, block_size: usize, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(TaglineError::Geometry(
                "cache capacity must be > 0".to_owned(),
            ));
        }
        Ok(Self {
            bus,
            capacity,
            block_size,
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
            stats: CacheStats::default(),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn contains(&self, loc: PhysLocation) -> bool {
        self.index.contains_key(&loc)
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Look up a cached block. A hit promotes the entry to most recently
    /// used; a miss has no side effect beyond the counters.
    pub fn get(&mut self, loc: PhysLocation) -> Option<&[u8]> {
        self.stats.gets += 1;
        let Some(&idx) = self.index.get(&loc) else {
            self.stats.misses += 1;
            return None;
        };
        self.stats.hits += 1;
        self.promote(idx);
        self.slots[idx].as_ref().map(|entry| entry.data.as_slice())
    }

    /// Insert or overwrite the cached copy of `loc` and mark it most
    /// recently used. A new key at capacity evicts the least recently used
    /// entry first; if that flush fails the put fails and nothing changes.
    pub fn put(&mut self, loc: PhysLocation, data: &[u8]) -> Result<()> {
        if data.len() != self.block_size {
            return Err(TaglineError::Consistency(format!(
                "payload length {} does not match block size {}",
                data.len(),
                self.block_size
            )));
        }

        if let Some(&idx) = self.index.get(&loc) {
            let Some(entry) = self.slots[idx].as_mut() else {
                return Err(TaglineError::Consistency(
                    "cache index points at a vacant slot".to_owned(),
                ));
            };
            entry.data.copy_from_slice(data);
            self.promote(idx);
            self.stats.inserts += 1;
            return Ok(());
        }

        if self.index.len() == self.capacity {
            self.evict_lru()?;
        }

        let idx = self.alloc_slot(Entry {
            key: loc,
            data: data.to_vec(),
            prev: None,
            next: None,
        });
        self.index.insert(loc, idx);
        self.push_back(idx);
        self.stats.inserts += 1;
        trace!(disk = loc.disk.0, block = loc.block.0, "cached block");
        Ok(())
    }

    /// Read one block, consulting the cache before the bus and populating
    /// the cache on a miss.
    pub fn read_through(&mut self, loc: PhysLocation) -> Result<Vec<u8>> {
        if let Some(data) = self.get(loc) {
            return Ok(data.to_vec());
        }
        let mut buf = vec![0_u8; self.block_size];
        let packet = Packet::read(loc.disk, loc.block);
        let response = self.bus.request(packet, &mut buf)?;
        check_echo(&packet, &response)?;
        self.put(loc, &buf)?;
        Ok(buf)
    }

    /// Tear down the cache and report its aggregate statistics. No entry is
    /// flushed; durable contents are whatever past evictions wrote.
    #[must_use]
    pub fn close(self) -> CacheStats {
        let stats = self.stats;
        info!(
            inserts = stats.inserts,
            gets = stats.gets,
            hits = stats.hits,
            misses = stats.misses,
            hit_ratio = stats.hit_ratio(),
            "block cache closed"
        );
        stats
    }

    /// Move a linked entry to the back of the recency queue.
    ///
    /// Cases: already at the back (no-op), at the front, or in the middle;
    /// all are index rewrites. Brand-new entries enter through `push_back`.
    fn promote(&mut self, idx: usize) {
        if self.tail == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_back(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.slots[idx] {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(entry) = self.slots[p].as_mut() {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(entry) = self.slots[n].as_mut() {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(entry) = self.slots[idx].as_mut() {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn push_back(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(entry) = self.slots[idx].as_mut() {
            entry.prev = old_tail;
            entry.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(entry) = self.slots[t].as_mut() {
                    entry.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Flush the front entry through the bus and release its slot.
    fn evict_lru(&mut self) -> Result<()> {
        let Some(victim) = self.head else {
            return Err(TaglineError::Consistency(
                "cache at capacity with an empty recency queue".to_owned(),
            ));
        };

        let bus = Arc::clone(&self.bus);
        let Some(entry) = self.slots[victim].as_mut() else {
            return Err(TaglineError::Consistency(
                "recency queue head points at a vacant slot".to_owned(),
            ));
        };
        let key = entry.key;
        let packet = Packet::write(key.disk, key.block);
        let response = bus.request(packet, &mut entry.data)?;
        check_echo(&packet, &response)?;
        debug!(
            disk = key.disk.0,
            block = key.block.0,
            "evicted block flushed to bus"
        );

        self.unlink(victim);
        self.index.remove(&key);
        self.slots[victim] = None;
        self.free.push(victim);
        Ok(())
    }

    fn alloc_slot(&mut self, entry: Entry) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(entry);
            idx
        } else {
            self.slots.push(Some(entry));
            self.slots.len() - 1
        }
    }

    #[cfg(test)]
    fn assert_invariants(&self) {
        assert!(self.index.len() <= self.capacity, "over capacity");

        // Walk front to back; every linked entry must be indexed at its slot.
        let mut seen = 0_usize;
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let entry = self.slots[idx].as_ref().expect("linked slot vacant");
            assert_eq!(entry.prev, prev, "prev link broken at slot {idx}");
            assert_eq!(
                self.index.get(&entry.key),
                Some(&idx),
                "index disagrees with queue at slot {idx}"
            );
            seen += 1;
            assert!(seen <= self.slots.len(), "cycle in recency queue");
            prev = Some(idx);
            cursor = entry.next;
        }
        assert_eq!(self.tail, prev, "tail link broken");
        assert_eq!(seen, self.index.len(), "queue length != index size");
    }
}

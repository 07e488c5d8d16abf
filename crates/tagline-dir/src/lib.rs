#![forbid(unsafe_code)]
//! Logical volume directory.
//!
//! A tagline is a gap-free sequence of logical blocks; each logical block
//! maps to a primary and a backup physical copy on different disks. The
//! directory owns the tagline records and the placement scheduler; all data
//! movement goes through the block cache, never directly to the bus.

use tagline_alloc::Scheduler;
use tagline_bus::StorageBus;
use tagline_cache::BlockCache;
use tagline_error::{Result, TaglineError};
use tagline_types::{BlockOffset, DiskGeometry, PhysLocation, TaglineId};
use tracing::debug;

/// One addressable unit of a tagline, mapped to two physical copies.
///
/// Invariant: `primary.disk != backup.disk`. A record is created only after
/// both copies have been written, so a mapping is never partially visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalBlock {
    pub offset: BlockOffset,
    pub primary: PhysLocation,
    pub backup: PhysLocation,
}

/// A logical volume: gap-free blocks numbered from zero.
#[derive(Debug)]
pub struct TagLine {
    id: TaglineId,
    blocks: Vec<LogicalBlock>,
}

impl TagLine {
    fn new(id: TaglineId) -> Self {
        Self {
            id,
            blocks: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TaglineId {
        self.id
    }

    #[must_use]
    pub fn blocks(&self) -> &[LogicalBlock] {
        &self.blocks
    }

    /// One past the highest block number ever written.
    #[must_use]
    pub fn max_allocated(&self) -> u32 {
        u32::try_from(self.blocks.len()).unwrap_or(u32::MAX)
    }
}

/// Per-driver directory of taglines plus the placement scheduler.
#[derive(Debug)]
pub struct Directory {
    taglines: Vec<TagLine>,
    scheduler: Scheduler,
    max_blocks_per_tagline: u32,
}

impl Directory {
    /// Create `maxlines` empty taglines, numbered sequentially from zero.
    #[must_use]
    pub fn new(geometry: DiskGeometry, maxlines: u16, max_blocks_per_tagline: u32) -> Self {
        let taglines = (0..maxlines).map(|id| TagLine::new(TaglineId(id))).collect();
        Self {
            taglines,
            scheduler: Scheduler::new(geometry),
            max_blocks_per_tagline,
        }
    }

    #[must_use]
    pub fn tagline_count(&self) -> u16 {
        u16::try_from(self.taglines.len()).unwrap_or(u16::MAX)
    }

    /// Taglines in id order, for recovery scans and statistics.
    pub fn taglines(&self) -> impl Iterator<Item = &TagLine> {
        self.taglines.iter()
    }

    fn tagline(&self, tag: TaglineId) -> Result<&TagLine> {
        self.taglines
            .get(usize::from(tag.0))
            .ok_or_else(|| TaglineError::address(format!(
                "tagline {} beyond the {} in use",
                tag.0,
                self.taglines.len()
            )))
    }

    /// One past the highest block number written to `tag`.
    pub fn max_allocated(&self, tag: TaglineId) -> Result<u32> {
        Ok(self.tagline(tag)?.max_allocated())
    }

    /// Map a logical address to its physical copies.
    pub fn resolve(&self, tag: TaglineId, offset: BlockOffset) -> Result<LogicalBlock> {
        let line = self.tagline(tag)?;
        line.blocks
            .get(usize::try_from(offset.0).unwrap_or(usize::MAX))
            .copied()
            .ok_or_else(|| TaglineError::address(format!(
                "block {} of tagline {} not allocated (max {})",
                offset.0,
                tag.0,
                line.max_allocated()
            )))
    }

    /// Grow `tag` by one block, writing `data` to a freshly placed primary
    /// and a backup on a different disk. Either failure leaves the tagline
    /// unchanged; scheduler cursors consumed by a failed attempt are not
    /// returned.
    pub fn append<B: StorageBus>(
        &mut self,
        cache: &mut BlockCache<B>,
        tag: TaglineId,
        data: &[u8],
    ) -> Result<BlockOffset> {
        let offset = BlockOffset(self.tagline(tag)?.max_allocated());
        if offset.0 >= self.max_blocks_per_tagline {
            return Err(TaglineError::address(format!(
                "tagline {} is at its {}-block limit",
                tag.0, self.max_blocks_per_tagline
            )));
        }

        let primary = self.scheduler.allocate(None)?;
        cache.put(primary, data)?;
        let backup = self.scheduler.allocate(Some(primary.disk))?;
        cache.put(backup, data)?;

        let Some(line) = self.taglines.get_mut(usize::from(tag.0)) else {
            return Err(TaglineError::Consistency(format!(
                "tagline {} vanished during append",
                tag.0
            )));
        };
        line.blocks.push(LogicalBlock {
            offset,
            primary,
            backup,
        });
        debug!(
            tag = tag.0,
            offset = offset.0,
            primary_disk = primary.disk.0,
            backup_disk = backup.disk.0,
            "appended block"
        );
        Ok(offset)
    }

    /// Rewrite an existing block's primary and backup copies. Both writes
    /// are attempted; either failure fails the call, and an already-applied
    /// write is not rolled back (rewriting a location is idempotent, so a
    /// retry with the same data is safe).
    pub fn overwrite<B: StorageBus>(
        &self,
        cache: &mut BlockCache<B>,
        tag: TaglineId,
        offset: BlockOffset,
        data: &[u8],
    ) -> Result<()> {
        let block = self.resolve(tag, offset)?;
        let primary = cache.put(block.primary, data);
        let backup = cache.put(block.backup, data);
        primary?;
        backup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tagline_bus::MemBus;
    use tagline_types::DiskId;
    use tagline_wire::Packet;

    const BLOCK_SIZE: usize = 32;

    fn geometry(disks: u8, blocks_per_disk: u32) -> DiskGeometry {
        DiskGeometry {
            disks,
            blocks_per_disk,
            block_size: BLOCK_SIZE,
        }
    }

    fn harness(
        geometry: DiskGeometry,
        maxlines: u16,
        cache_capacity: usize,
    ) -> (BlockCache<MemBus>, Directory) {
        let bus = Arc::new(MemBus::new(geometry));
        bus.request(Packet::init(geometry.disks, geometry.blocks_per_disk), &mut [])
            .expect("init");
        for disk in geometry.disk_ids() {
            bus.request(Packet::format(disk), &mut []).expect("format");
        }
        let cache = BlockCache::new(bus, BLOCK_SIZE, cache_capacity).expect("cache");
        let directory = Directory::new(geometry, maxlines, 256);
        (cache, directory)
    }

    fn block(fill: u8) -> Vec<u8> {
        vec![fill; BLOCK_SIZE]
    }

    #[test]
    fn append_grows_and_resolves() {
        let (mut cache, mut directory) = harness(geometry(2, 8), 2, 4);
        let tag = TaglineId(0);

        assert_eq!(directory.max_allocated(tag).expect("max"), 0);
        let offset = directory.append(&mut cache, tag, &block(1)).expect("append");
        assert_eq!(offset, BlockOffset(0));
        assert_eq!(directory.max_allocated(tag).expect("max"), 1);

        let mapped = directory.resolve(tag, BlockOffset(0)).expect("resolve");
        assert_ne!(mapped.primary.disk, mapped.backup.disk);
    }

    #[test]
    fn resolve_rejects_unallocated_addresses() {
        let (_cache, directory) = harness(geometry(2, 8), 2, 4);
        assert!(matches!(
            directory.resolve(TaglineId(0), BlockOffset(0)),
            Err(TaglineError::Address { .. })
        ));
        assert!(matches!(
            directory.resolve(TaglineId(9), BlockOffset(0)),
            Err(TaglineError::Address { .. })
        ));
    }

    #[test]
    fn append_monotonicity() {
        let (mut cache, mut directory) = harness(geometry(2, 16), 1, 8);
        let tag = TaglineId(0);
        for i in 0..5_u8 {
            directory.append(&mut cache, tag, &block(i)).expect("append");
        }
        assert_eq!(directory.max_allocated(tag).expect("max"), 5);
        for i in 0..5_u32 {
            directory.resolve(tag, BlockOffset(i)).expect("resolvable");
        }
    }

    #[test]
    fn failed_backup_allocation_leaves_no_record() {
        // One disk: the primary lands, the backup has nowhere to go.
        let (mut cache, mut directory) = harness(geometry(1, 8), 1, 4);
        let tag = TaglineId(0);
        let result = directory.append(&mut cache, tag, &block(1));
        assert!(matches!(result, Err(TaglineError::NoSpace)));
        assert_eq!(directory.max_allocated(tag).expect("max"), 0);
    }

    #[test]
    fn per_tagline_block_limit_is_enforced() {
        let geometry = geometry(2, 64);
        let bus = Arc::new(MemBus::new(geometry));
        bus.request(Packet::init(2, 64), &mut []).expect("init");
        for disk in [DiskId(0), DiskId(1)] {
            bus.request(Packet::format(disk), &mut []).expect("format");
        }
        let mut cache = BlockCache::new(bus, BLOCK_SIZE, 4).expect("cache");
        let mut directory = Directory::new(geometry, 1, 2);

        let tag = TaglineId(0);
        directory.append(&mut cache, tag, &block(1)).expect("first");
        directory.append(&mut cache, tag, &block(2)).expect("second");
        assert!(matches!(
            directory.append(&mut cache, tag, &block(3)),
            Err(TaglineError::Address { .. })
        ));
    }

    #[test]
    fn overwrite_touches_both_copies() {
        let (mut cache, mut directory) = harness(geometry(2, 8), 1, 8);
        let tag = TaglineId(0);
        directory.append(&mut cache, tag, &block(1)).expect("append");
        let mapped = directory.resolve(tag, BlockOffset(0)).expect("resolve");

        directory
            .overwrite(&mut cache, tag, BlockOffset(0), &block(2))
            .expect("overwrite");
        assert_eq!(cache.get(mapped.primary), Some(block(2).as_slice()));
        assert_eq!(cache.get(mapped.backup), Some(block(2).as_slice()));
    }

    #[test]
    fn overwrite_of_unallocated_block_fails() {
        let (mut cache, directory) = harness(geometry(2, 8), 1, 4);
        assert!(matches!(
            directory.overwrite(&mut cache, TaglineId(0), BlockOffset(3), &block(1)),
            Err(TaglineError::Address { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Mirror invariant and monotonicity over arbitrary append bursts
        /// spread across taglines.
        #[test]
        fn mirrors_never_share_a_disk(
            appends in proptest::collection::vec((0_u16..3, any::<u8>()), 1..40),
            disks in 2_u8..5,
        ) {
            let (mut cache, mut directory) = harness(geometry(disks, 64), 3, 8);
            let mut expected_len = [0_u32; 3];

            for (tag, fill) in appends {
                match directory.append(&mut cache, TaglineId(tag), &block(fill)) {
                    Ok(offset) => {
                        prop_assert_eq!(offset.0, expected_len[usize::from(tag)]);
                        expected_len[usize::from(tag)] += 1;
                    }
                    Err(TaglineError::NoSpace) => {}
                    Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                }
            }

            for line in directory.taglines() {
                prop_assert_eq!(
                    line.max_allocated(),
                    expected_len[usize::from(line.id().0)]
                );
                for mapped in line.blocks() {
                    prop_assert_ne!(mapped.primary.disk, mapped.backup.disk);
                }
            }
        }
    }
}

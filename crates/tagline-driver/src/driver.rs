//! Driver facade: initialization, block reads/writes, teardown, disk events.

use std::sync::Arc;
use tagline_bus::{StorageBus, check_echo};
use tagline_cache::{BlockCache, CacheStats};
use tagline_dir::Directory;
use tagline_error::{Result, TaglineError};
use tagline_types::{BlockOffset, TaglineId};
use tagline_wire::Packet;
use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::recovery::{self, RecoveryReport};

/// One complete storage stack: bus channel, block cache and directory.
///
/// All operations take `&mut self`; a caller that shares a driver across
/// threads must serialize access behind a single lock, since none of the
/// multi-step sequences (evict-then-insert, append's two-phase allocation,
/// the recovery scan) tolerate interleaving.
#[derive(Debug)]
pub struct TaglineDriver<B: StorageBus> {
    bus: Arc<B>,
    cache: BlockCache<B>,
    directory: Directory,
    config: DriverConfig,
}

impl<B: StorageBus> TaglineDriver<B> {
    /// Bring up the storage stack: open the bus channel, format every disk,
    /// then create `maxlines` empty taglines and the block cache.
    pub fn init(bus: Arc<B>, config: DriverConfig, maxlines: u16) -> Result<Self> {
        config
            .geometry
            .validate()
            .map_err(|err| TaglineError::Geometry(err.to_string()))?;
        let geometry = config.geometry;

        let init = Packet::init(geometry.disks, geometry.blocks_per_disk);
        let response = bus.request(init, &mut [])?;
        check_echo(&init, &response)?;

        for disk in geometry.disk_ids() {
            let format = Packet::format(disk);
            let response = bus.request(format, &mut [])?;
            check_echo(&format, &response)?;
        }

        let cache = BlockCache::new(
            Arc::clone(&bus),
            geometry.block_size,
            config.cache_capacity,
        )?;
        let directory = Directory::new(geometry, maxlines, config.max_blocks_per_tagline);
        info!(
            maxlines,
            disks = geometry.disks,
            blocks_per_disk = geometry.blocks_per_disk,
            "tagline driver initialized"
        );
        Ok(Self {
            bus,
            cache,
            directory,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Counter snapshot from the block cache.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Read `count` blocks starting at `start` into `out`, one block at a
    /// time in increasing offset order. The first failing block aborts the
    /// call; `out` must be exactly `count` blocks long.
    pub fn read(
        &mut self,
        tag: TaglineId,
        start: BlockOffset,
        count: u8,
        out: &mut [u8],
    ) -> Result<()> {
        let block_size = self.config.geometry.block_size;
        check_span(out.len(), count, block_size)?;

        for step in 0..count {
            let offset = block_offset(start, step)?;
            let mapped = self.directory.resolve(tag, offset)?;
            let data = self.cache.read_through(mapped.primary)?;
            let chunk = &mut out[usize::from(step) * block_size..][..block_size];
            chunk.copy_from_slice(&data);
        }
        debug!(tag = tag.0, start = start.0, count, "read complete");
        Ok(())
    }

    /// Write `count` blocks starting at `start`, one block at a time in
    /// increasing offset order. A block at the tagline's current end grows
    /// it by one; an earlier block is rewritten in place; anything past the
    /// end is an address error. The first failing block aborts the call.
    pub fn write(
        &mut self,
        tag: TaglineId,
        start: BlockOffset,
        count: u8,
        data: &[u8],
    ) -> Result<()> {
        let block_size = self.config.geometry.block_size;
        check_span(data.len(), count, block_size)?;

        for step in 0..count {
            let offset = block_offset(start, step)?;
            let chunk = &data[usize::from(step) * block_size..][..block_size];
            let max_allocated = self.directory.max_allocated(tag)?;
            if offset.0 == max_allocated {
                self.directory.append(&mut self.cache, tag, chunk)?;
            } else if offset.0 < max_allocated {
                self.directory
                    .overwrite(&mut self.cache, tag, offset, chunk)?;
            } else {
                return Err(TaglineError::address(format!(
                    "write at block {} of tagline {} would leave a gap (max {})",
                    offset.0, tag.0, max_allocated
                )));
            }
        }
        debug!(tag = tag.0, start = start.0, count, "write complete");
        Ok(())
    }

    /// Check every disk's health and reconstruct any that report failure.
    pub fn disk_event(&mut self) -> Result<RecoveryReport> {
        recovery::run(
            &self.bus,
            &mut self.cache,
            &self.directory,
            self.config.geometry,
        )
    }

    /// Tear down the stack: report cache statistics, then close the bus
    /// channel. Cached data is not flushed.
    pub fn close(self) -> Result<CacheStats> {
        let Self { bus, cache, .. } = self;
        let stats = cache.close();

        let close = Packet::close();
        let response = bus.request(close, &mut [])?;
        check_echo(&close, &response)?;
        info!("tagline storage device closed");
        Ok(stats)
    }
}

fn check_span(len: usize, count: u8, block_size: usize) -> Result<()> {
    let expected = usize::from(count) * block_size;
    if len != expected {
        return Err(TaglineError::address(format!(
            "buffer is {len} bytes but {count} blocks need {expected}"
        )));
    }
    Ok(())
}

fn block_offset(start: BlockOffset, step: u8) -> Result<BlockOffset> {
    start
        .0
        .checked_add(u32::from(step))
        .map(BlockOffset)
        .ok_or_else(|| TaglineError::address("block offset overflows u32"))
}

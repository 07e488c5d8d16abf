#![forbid(unsafe_code)]
//! Physical block placement for mirrored writes.
//!
//! Assignment cycles the disks round-robin, each with a monotonically
//! advancing block cursor: disk 0, 1, .., D-1, then again with the next
//! block index, until every (disk, block) slot has been handed out. An
//! exclusion parameter skips one disk for a single call, which is how a
//! backup copy is kept off its primary's disk.
//!
//! Slots are never reused. Overwriting or logically dropping a block does
//! not return its slots; capacity is a hard ceiling for the array's
//! lifetime.

use tagline_error::{Result, TaglineError};
use tagline_types::{DiskGeometry, DiskId, PhysBlock, PhysLocation};
use tracing::trace;

/// Round-robin placement over the disk array.
#[derive(Debug)]
pub struct Scheduler {
    geometry: DiskGeometry,
    /// Next free block index per disk.
    next_block: Vec<u32>,
    /// Disk the next assignment starts its scan at.
    next_disk: u8,
}

impl Scheduler {
    #[must_use]
    pub fn new(geometry: DiskGeometry) -> Self {
        Self {
            geometry,
            next_block: vec![0; usize::from(geometry.disks)],
            next_disk: 0,
        }
    }

    /// Assign the next free physical location, optionally excluding one
    /// disk. Fails with `NoSpace` when no eligible disk has a free block.
    pub fn allocate(&mut self, exclude: Option<DiskId>) -> Result<PhysLocation> {
        let disks = self.geometry.disks;
        let mut disk = self.next_disk;
        for _ in 0..disks {
            let candidate = DiskId(disk);
            disk = (disk + 1) % disks;
            if Some(candidate) == exclude {
                continue;
            }
            let cursor = self.next_block[usize::from(candidate.0)];
            if cursor >= self.geometry.blocks_per_disk {
                continue;
            }
            self.next_block[usize::from(candidate.0)] = cursor + 1;
            self.next_disk = (candidate.0 + 1) % disks;
            trace!(disk = candidate.0, block = cursor, "assigned physical slot");
            return Ok(PhysLocation::new(candidate, PhysBlock(cursor)));
        }
        Err(TaglineError::NoSpace)
    }

    /// Slots not yet handed out across the whole array.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.next_block
            .iter()
            .map(|&cursor| u64::from(self.geometry.blocks_per_disk - cursor))
            .sum()
    }
}

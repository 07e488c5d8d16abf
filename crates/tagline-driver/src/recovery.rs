//! Disk-failure recovery.
//!
//! A failed disk is reformatted in place, then every logical block that kept
//! a copy there is rebuilt from its mirror. Reads and rewrites go through
//! the block cache like any other access; physical block numbers never
//! change. The first failure during a disk's reconstruction aborts that
//! disk's recovery; blocks already rebuilt stay rebuilt.

use serde::Serialize;
use std::sync::Arc;
use tagline_bus::{StorageBus, check_echo};
use tagline_cache::BlockCache;
use tagline_dir::Directory;
use tagline_error::{Result, TaglineError};
use tagline_types::{DiskGeometry, DiskId};
use tagline_wire::{DISK_FAULTED_SENTINEL, Packet};
use tracing::{info, warn};

/// Outcome of one disk-event sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Disks whose health was queried.
    pub disks_checked: u8,
    /// Disks that reported failure and were reconstructed.
    pub disks_recovered: Vec<u8>,
    /// Lost primary copies rewritten from their backups.
    pub primaries_rebuilt: u64,
    /// Lost backup copies rewritten from their primaries.
    pub backups_rebuilt: u64,
}

impl RecoveryReport {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Sweep every disk's health and reconstruct the failed ones.
pub(crate) fn run<B: StorageBus>(
    bus: &Arc<B>,
    cache: &mut BlockCache<B>,
    directory: &Directory,
    geometry: DiskGeometry,
) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    for disk in geometry.disk_ids() {
        report.disks_checked += 1;

        let status = Packet::status(disk);
        let response = bus.request(status, &mut [])?;
        if !response.ok() {
            return Err(TaglineError::bus(format!(
                "status query failed for disk {}",
                disk.0
            )));
        }
        if response.block != DISK_FAULTED_SENTINEL {
            continue;
        }
        warn!(disk = disk.0, "disk reported failed, reconstructing");

        let format = Packet::format(disk);
        let response = bus.request(format, &mut [])?;
        check_echo(&format, &response).map_err(|err| {
            TaglineError::Recovery(format!("reformat of failed disk {} failed: {err}", disk.0))
        })?;

        let (primaries, backups) = rebuild_disk(cache, directory, disk)?;
        report.primaries_rebuilt += primaries;
        report.backups_rebuilt += backups;
        report.disks_recovered.push(disk.0);
        info!(
            disk = disk.0,
            primaries, backups, "disk reconstruction complete"
        );
    }
    Ok(report)
}

/// Walk every tagline in offset order and rewrite the copies `disk` lost.
///
/// A block involves the disk as primary or as backup, never both (the two
/// copies live on different disks); uninvolved blocks are skipped.
fn rebuild_disk<B: StorageBus>(
    cache: &mut BlockCache<B>,
    directory: &Directory,
    disk: DiskId,
) -> Result<(u64, u64)> {
    let mut primaries = 0_u64;
    let mut backups = 0_u64;

    for line in directory.taglines() {
        for block in line.blocks() {
            if block.primary.disk == disk {
                let content = cache.read_through(block.backup)?;
                cache.put(block.primary, &content)?;
                primaries += 1;
            } else if block.backup.disk == disk {
                let content = cache.read_through(block.primary)?;
                cache.put(block.backup, &content)?;
                backups += 1;
            }
        }
    }
    Ok((primaries, backups))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_to_json() {
        let report = RecoveryReport {
            disks_checked: 3,
            disks_recovered: vec![1],
            primaries_rebuilt: 4,
            backups_rebuilt: 2,
        };
        let json = report.to_json().expect("json");
        assert!(json.contains("\"disks_recovered\":[1]"));
        assert!(json.contains("\"primaries_rebuilt\":4"));
    }
}

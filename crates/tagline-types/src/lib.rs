#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Physical disk identifier on the storage bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiskId(pub u8);

/// Physical block index within one disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysBlock(pub u32);

/// Logical volume identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaglineId(pub u16);

/// Block offset within a tagline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockOffset(pub u32);

/// One fixed-size block on a specific disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysLocation {
    pub disk: DiskId,
    pub block: PhysBlock,
}

impl PhysLocation {
    #[must_use]
    pub fn new(disk: DiskId, block: PhysBlock) -> Self {
        Self { disk, block }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("{field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// Disk-array geometry: every disk is an array of fixed-size blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskGeometry {
    pub disks: u8,
    pub blocks_per_disk: u32,
    pub block_size: usize,
}

impl DiskGeometry {
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.disks == 0 {
            return Err(GeometryError::InvalidField {
                field: "disks",
                reason: "must be > 0",
            });
        }
        if self.blocks_per_disk == 0 {
            return Err(GeometryError::InvalidField {
                field: "blocks_per_disk",
                reason: "must be > 0",
            });
        }
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return Err(GeometryError::InvalidField {
                field: "block_size",
                reason: "must be a power of two",
            });
        }
        Ok(())
    }

    /// Total addressable blocks across the array.
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        u64::from(self.disks) * u64::from(self.blocks_per_disk)
    }

    #[must_use]
    pub fn contains(&self, loc: PhysLocation) -> bool {
        loc.disk.0 < self.disks && loc.block.0 < self.blocks_per_disk
    }

    /// Disk identifiers in formatting / status-sweep order.
    pub fn disk_ids(&self) -> impl Iterator<Item = DiskId> + use<> {
        (0..self.disks).map(DiskId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_validation() {
        let good = DiskGeometry {
            disks: 2,
            blocks_per_disk: 16,
            block_size: 1024,
        };
        assert!(good.validate().is_ok());
        assert_eq!(good.total_blocks(), 32);

        let zero_disks = DiskGeometry { disks: 0, ..good };
        assert!(zero_disks.validate().is_err());

        let odd_block = DiskGeometry {
            block_size: 1000,
            ..good
        };
        assert!(odd_block.validate().is_err());
    }

    #[test]
    fn contains_checks_both_axes() {
        let geometry = DiskGeometry {
            disks: 2,
            blocks_per_disk: 4,
            block_size: 512,
        };
        assert!(geometry.contains(PhysLocation::new(DiskId(1), PhysBlock(3))));
        assert!(!geometry.contains(PhysLocation::new(DiskId(2), PhysBlock(0))));
        assert!(!geometry.contains(PhysLocation::new(DiskId(0), PhysBlock(4))));
    }

    #[test]
    fn disk_ids_are_sequential() {
        let geometry = DiskGeometry {
            disks: 3,
            blocks_per_disk: 1,
            block_size: 512,
        };
        let ids: Vec<DiskId> = geometry.disk_ids().collect();
        assert_eq!(ids, vec![DiskId(0), DiskId(1), DiskId(2)]);
    }
}

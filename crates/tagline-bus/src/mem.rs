//! In-memory storage bus.
//!
//! Behaves like a remote disk array on the other end of the bus: a fixed
//! geometry of zero-filled disks, per-disk health, and hooks to inject the
//! failures the recovery and eviction paths have to survive. Failed
//! operations come back as a response word with the status bit set, the same
//! way a real bus reports them.

use parking_lot::Mutex;
use tagline_error::{Result, TaglineError};
use tagline_types::{DiskGeometry, DiskId};
use tagline_wire::{DISK_FAULTED_SENTINEL, Packet, RequestKind};
use tracing::debug;

#[derive(Debug)]
struct MemDisk {
    blocks: Vec<u8>,
    formatted: bool,
    failed: bool,
}

#[derive(Debug)]
struct MemBusState {
    disks: Vec<MemDisk>,
    initialized: bool,
    /// Remaining READ/WRITE requests to fail with a status bit.
    transfer_faults: usize,
}

/// In-memory disk array implementing [`StorageBus`](crate::StorageBus).
#[derive(Debug)]
pub struct MemBus {
    geometry: DiskGeometry,
    state: Mutex<MemBusState>,
}

impl MemBus {
    #[must_use]
    pub fn new(geometry: DiskGeometry) -> Self {
        let disks = (0..geometry.disks)
            .map(|_| MemDisk {
                blocks: Vec::new(),
                formatted: false,
                failed: false,
            })
            .collect();
        Self {
            geometry,
            state: Mutex::new(MemBusState {
                disks,
                initialized: false,
                transfer_faults: 0,
            }),
        }
    }

    /// Mark a disk failed: its contents are lost and STATUS reports the
    /// failure sentinel until the disk is reformatted.
    pub fn fail_disk(&self, disk: DiskId) {
        let mut state = self.state.lock();
        if let Some(d) = state.disks.get_mut(usize::from(disk.0)) {
            d.failed = true;
            d.formatted = false;
            d.blocks.clear();
            debug!(disk = disk.0, "disk marked failed");
        }
    }

    /// Fail the next `count` READ/WRITE requests with a non-zero status.
    pub fn fail_next_transfers(&self, count: usize) {
        self.state.lock().transfer_faults = count;
    }

    fn disk_byte_len(&self) -> usize {
        usize::try_from(self.geometry.blocks_per_disk)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.geometry.block_size)
    }

    fn payload_range(&self, packet: &Packet) -> Option<std::ops::Range<usize>> {
        if packet.disk.0 >= self.geometry.disks || packet.block >= self.geometry.blocks_per_disk {
            return None;
        }
        let start = usize::try_from(packet.block)
            .ok()?
            .checked_mul(self.geometry.block_size)?;
        Some(start..start + self.geometry.block_size)
    }
}

impl crate::StorageBus for MemBus {
    fn request(&self, packet: Packet, buf: &mut [u8]) -> Result<Packet> {
        if packet.kind.is_transfer() && buf.len() != self.geometry.block_size {
            return Err(TaglineError::Consistency(format!(
                "transfer buffer length {} does not match block size {}",
                buf.len(),
                self.geometry.block_size
            )));
        }

        let mut state = self.state.lock();
        match packet.kind {
            RequestKind::Init => {
                if packet.disk.0 != self.geometry.disks
                    || packet.block != self.geometry.blocks_per_disk
                {
                    return Ok(packet.failed());
                }
                state.initialized = true;
                Ok(packet)
            }
            RequestKind::Format => {
                let byte_len = self.disk_byte_len();
                let Some(disk) = state.disks.get_mut(usize::from(packet.disk.0)) else {
                    return Ok(packet.failed());
                };
                disk.blocks.clear();
                disk.blocks.resize(byte_len, 0);
                disk.formatted = true;
                disk.failed = false;
                Ok(packet)
            }
            RequestKind::Read | RequestKind::Write => {
                if !state.initialized {
                    return Ok(packet.failed());
                }
                if state.transfer_faults > 0 {
                    state.transfer_faults -= 1;
                    debug!(kind = ?packet.kind, "injected transfer fault");
                    return Ok(packet.failed());
                }
                let Some(range) = self.payload_range(&packet) else {
                    return Ok(packet.failed());
                };
                let Some(disk) = state.disks.get_mut(usize::from(packet.disk.0)) else {
                    return Ok(packet.failed());
                };
                if disk.failed || !disk.formatted {
                    return Ok(packet.failed());
                }
                if packet.kind == RequestKind::Read {
                    buf.copy_from_slice(&disk.blocks[range]);
                } else {
                    disk.blocks[range].copy_from_slice(buf);
                }
                Ok(packet)
            }
            RequestKind::Status => {
                let Some(disk) = state.disks.get(usize::from(packet.disk.0)) else {
                    return Ok(packet.failed());
                };
                let mut response = packet;
                response.block = if disk.failed { DISK_FAULTED_SENTINEL } else { 0 };
                Ok(response)
            }
            RequestKind::Close => {
                state.initialized = false;
                Ok(packet)
            }
        }
    }
}

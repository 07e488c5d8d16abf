#![forbid(unsafe_code)]
//! Bit-packed opcode codec for the storage bus.
//!
//! A request or response travels as a single 64-bit word. Field widths, high
//! bit to low:
//!
//! | bits  | field        |
//! |-------|--------------|
//! | 63-56 | request kind |
//! | 55-48 | block count  |
//! | 47-40 | disk id      |
//! | 39-33 | reserved     |
//! | 32    | status       |
//! | 31-0  | block id     |
//!
//! Encoding and decoding are pure functions on [`Packet`]; nothing above the
//! bus boundary handles raw words. A STATUS response reuses the block-id
//! field for disk health, where [`DISK_FAULTED_SENTINEL`] signals failure.

use tagline_types::{DiskId, PhysBlock};
use thiserror::Error;

/// Health value in a STATUS response's block-id field for a failed disk.
pub const DISK_FAULTED_SENTINEL: u32 = 2;

const STATUS_SHIFT: u32 = 32;
const RESERVED_SHIFT: u32 = 33;
const DISK_SHIFT: u32 = 40;
const BLOCKS_SHIFT: u32 = 48;
const KIND_SHIFT: u32 = 56;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("invalid request kind: {0:#04x}")]
    InvalidKind(u8),
}

/// Storage bus request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestKind {
    Init = 0,
    Format = 1,
    Read = 2,
    Write = 3,
    Status = 4,
    Close = 5,
}

impl RequestKind {
    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Init),
            1 => Ok(Self::Format),
            2 => Ok(Self::Read),
            3 => Ok(Self::Write),
            4 => Ok(Self::Status),
            5 => Ok(Self::Close),
            other => Err(WireError::InvalidKind(other)),
        }
    }

    /// Whether this kind carries one block of payload alongside the word.
    #[must_use]
    pub fn is_transfer(self) -> bool {
        matches!(self, Self::Read | Self::Write)
    }
}

/// Decoded form of one opcode word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub kind: RequestKind,
    pub blocks: u8,
    pub disk: DiskId,
    /// Carried verbatim; only the low 7 bits survive encoding.
    pub reserved: u8,
    /// Single bit: zero means success.
    pub status: u8,
    pub block: u32,
}

impl Packet {
    /// Channel setup. The disk field carries the array's disk count and the
    /// block-id field its blocks-per-disk so the far side can size itself.
    #[must_use]
    pub fn init(disks: u8, blocks_per_disk: u32) -> Self {
        Self {
            kind: RequestKind::Init,
            blocks: 0,
            disk: DiskId(disks),
            reserved: 0,
            status: 0,
            block: blocks_per_disk,
        }
    }

    #[must_use]
    pub fn format(disk: DiskId) -> Self {
        Self {
            kind: RequestKind::Format,
            blocks: 0,
            disk,
            reserved: 0,
            status: 0,
            block: 0,
        }
    }

    #[must_use]
    pub fn read(disk: DiskId, block: PhysBlock) -> Self {
        Self {
            kind: RequestKind::Read,
            blocks: 1,
            disk,
            reserved: 0,
            status: 0,
            block: block.0,
        }
    }

    #[must_use]
    pub fn write(disk: DiskId, block: PhysBlock) -> Self {
        Self {
            kind: RequestKind::Write,
            blocks: 1,
            disk,
            reserved: 0,
            status: 0,
            block: block.0,
        }
    }

    #[must_use]
    pub fn status(disk: DiskId) -> Self {
        Self {
            kind: RequestKind::Status,
            blocks: 0,
            disk,
            reserved: 0,
            status: 0,
            block: 0,
        }
    }

    #[must_use]
    pub fn close() -> Self {
        Self {
            kind: RequestKind::Close,
            blocks: 0,
            disk: DiskId(0),
            reserved: 0,
            status: 0,
            block: 0,
        }
    }

    /// Pack into the 64-bit wire representation.
    #[must_use]
    pub fn encode(&self) -> u64 {
        (u64::from(self.kind as u8) << KIND_SHIFT)
            | (u64::from(self.blocks) << BLOCKS_SHIFT)
            | (u64::from(self.disk.0) << DISK_SHIFT)
            | (u64::from(self.reserved & 0x7F) << RESERVED_SHIFT)
            | (u64::from(self.status & 0x01) << STATUS_SHIFT)
            | u64::from(self.block)
    }

    /// Unpack a wire word; fails on an unknown request kind.
    pub fn decode(word: u64) -> Result<Self, WireError> {
        #[expect(clippy::cast_possible_truncation)]
        let kind = RequestKind::from_u8((word >> KIND_SHIFT) as u8)?;
        #[expect(clippy::cast_possible_truncation)]
        let packet = Self {
            kind,
            blocks: ((word >> BLOCKS_SHIFT) & 0xFF) as u8,
            disk: DiskId(((word >> DISK_SHIFT) & 0xFF) as u8),
            reserved: ((word >> RESERVED_SHIFT) & 0x7F) as u8,
            status: ((word >> STATUS_SHIFT) & 0x01) as u8,
            block: (word & 0xFFFF_FFFF) as u32,
        };
        Ok(packet)
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        self.status == 0
    }

    /// Copy of this packet with the status bit set, as a bus implementation
    /// reports a failed operation.
    #[must_use]
    pub fn failed(mut self) -> Self {
        self.status = 1;
        self
    }
}

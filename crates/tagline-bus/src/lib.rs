#![forbid(unsafe_code)]
//! Storage bus client interface and transports.
//!
//! A bus endpoint performs one physical operation per call against one
//! (disk, block) pair: blocking round-trip, one outstanding request at a
//! time. [`TcpBusClient`] speaks the framed TCP protocol; [`MemBus`] is an
//! in-memory array used by the integration suites and the demo.

mod mem;
mod tcp;

pub use mem::MemBus;
pub use tcp::TcpBusClient;

use tagline_error::{Result, TaglineError};
use tagline_wire::Packet;

/// Blocking storage bus endpoint.
pub trait StorageBus: Send + Sync {
    /// Issue one request. READ fills `buf` with the addressed block's bytes;
    /// WRITE sends `buf`'s bytes to the addressed block; the other kinds
    /// ignore it. The returned packet is the decoded response word.
    fn request(&self, packet: Packet, buf: &mut [u8]) -> Result<Packet>;
}

/// Verify a response that must echo its request verbatim with a zero status.
///
/// Applies to kinds whose response carries no data in the word (INIT, FORMAT,
/// READ, WRITE, CLOSE). STATUS responses reuse the block-id field for disk
/// health and are checked by the caller instead.
pub fn check_echo(request: &Packet, response: &Packet) -> Result<()> {
    if response.status != 0 {
        return Err(TaglineError::bus(format!(
            "{:?} on disk {} block {} failed with status {}",
            request.kind, request.disk.0, request.block, response.status
        )));
    }
    if response.kind != request.kind
        || response.blocks != request.blocks
        || response.disk != request.disk
        || response.block != request.block
    {
        return Err(TaglineError::bus(format!(
            "response does not echo request: sent {request:?}, got {response:?}"
        )));
    }
    Ok(())
}

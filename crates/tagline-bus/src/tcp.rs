//! TCP transport for the storage bus protocol.
//!
//! Each direction carries the 64-bit opcode word in network byte order, a
//! 64-bit payload length in network byte order, then `length` payload bytes.
//! INIT establishes the connection exactly once; CLOSE shuts it down. Short
//! transfers and transport errors are terminal for the enclosing operation.

use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use tagline_error::{Result, TaglineError};
use tagline_wire::{Packet, RequestKind};
use tracing::{debug, info};

/// Storage bus endpoint over a TCP connection.
#[derive(Debug)]
pub struct TcpBusClient {
    addr: SocketAddr,
    block_size: usize,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpBusClient {
    #[must_use]
    pub fn new(addr: SocketAddr, block_size: usize) -> Self {
        Self {
            addr,
            block_size,
            stream: Mutex::new(None),
        }
    }

    fn exchange(
        stream: &mut TcpStream,
        packet: Packet,
        send: Option<&[u8]>,
        recv: Option<&mut [u8]>,
    ) -> Result<Packet> {
        stream.write_all(&packet.encode().to_be_bytes())?;
        let send_len = send.map_or(0, <[u8]>::len);
        stream.write_all(&(send_len as u64).to_be_bytes())?;
        if let Some(payload) = send {
            stream.write_all(payload)?;
        }

        let mut word = [0_u8; 8];
        stream.read_exact(&mut word)?;
        let response = Packet::decode(u64::from_be_bytes(word))
            .map_err(|err| TaglineError::Codec(err.to_string()))?;

        stream.read_exact(&mut word)?;
        let recv_len = u64::from_be_bytes(word);
        if recv_len > 0 {
            let Some(buf) = recv else {
                return Err(TaglineError::bus(format!(
                    "unexpected {recv_len}-byte payload in {:?} response",
                    packet.kind
                )));
            };
            if recv_len != buf.len() as u64 {
                return Err(TaglineError::bus(format!(
                    "short transfer: expected {} bytes, server sent {recv_len}",
                    buf.len()
                )));
            }
            stream.read_exact(buf)?;
        }
        Ok(response)
    }
}

impl crate::StorageBus for TcpBusClient {
    fn request(&self, packet: Packet, buf: &mut [u8]) -> Result<Packet> {
        if packet.kind.is_transfer() && buf.len() != self.block_size {
            return Err(TaglineError::Consistency(format!(
                "transfer buffer length {} does not match block size {}",
                buf.len(),
                self.block_size
            )));
        }

        let mut guard = self.stream.lock();
        if packet.kind == RequestKind::Init && guard.is_none() {
            let stream = TcpStream::connect(self.addr)?;
            stream.set_nodelay(true)?;
            info!(addr = %self.addr, "connected to storage bus");
            *guard = Some(stream);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(TaglineError::bus("bus channel not established"));
        };

        let response = match packet.kind {
            RequestKind::Write => Self::exchange(stream, packet, Some(buf), None)?,
            RequestKind::Read => Self::exchange(stream, packet, None, Some(buf))?,
            _ => Self::exchange(stream, packet, None, None)?,
        };

        if packet.kind == RequestKind::Close {
            debug!("closing storage bus connection");
            *guard = None;
        }
        Ok(response)
    }
}

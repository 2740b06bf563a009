//! Transport seam between the engine and the bulk endpoints
//!
//! The engine only sees complete CCID messages. A transport delivers one
//! reassembled message per `receive` and writes each response atomically.

use std::collections::VecDeque;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::ccid::{declared_length, CCID_HEADER_LEN};
use crate::engine::CcidEngine;

/// Full-speed bulk endpoint packet size
pub const DEFAULT_PACKET_SIZE: usize = 64;

/// Largest message accepted by default: header plus a short APDU with room
/// to spare
pub const DEFAULT_MAX_MESSAGE_LEN: usize = CCID_HEADER_LEN + 271;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte pipe to the host
pub trait Transport {
    /// Next complete inbound message; `Err(Closed)` ends the session
    fn receive(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Deliver one complete outbound message
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// Run the request/response loop until the transport closes
///
/// Returns the number of messages answered. Malformed messages are answered
/// by the engine; only an I/O failure of the transport itself ends the loop
/// early.
pub fn serve<T: Transport + ?Sized>(
    engine: &mut CcidEngine,
    transport: &mut T,
) -> Result<usize, TransportError> {
    let mut handled = 0;
    loop {
        let request = match transport.receive() {
            Ok(request) => request,
            Err(TransportError::Closed) => {
                info!("Transport closed after {} message(s)", handled);
                return Ok(handled);
            }
            Err(e) => {
                error!("Receive failed: {}", e);
                return Err(e);
            }
        };

        let response = engine.handle_inbound(&request);
        if let Err(e) = transport.send(&response) {
            error!("Send failed: {}", e);
            return Err(e);
        }
        handled += 1;
    }
}

/// Rebuilds CCID messages from bulk-out packets
///
/// A message spans several packets when its declared length does not fit
/// the first one. A short packet always ends the transfer, so a truncated
/// message is handed on as is and the engine reports the length mismatch.
///
/// A message declaring more than the size limit is drained packet by packet
/// and handed on as its bare header, which the engine answers with a bad
/// `dwLength` failure for the same slot and seq.
#[derive(Debug)]
pub struct MessageAssembler {
    packet_size: usize,
    max_message_len: usize,
    buffer: Vec<u8>,
    missing: usize,
    discarding: bool,
}

impl MessageAssembler {
    pub fn new(packet_size: usize) -> Self {
        Self::with_limit(packet_size, DEFAULT_MAX_MESSAGE_LEN)
    }

    pub fn with_limit(packet_size: usize, max_message_len: usize) -> Self {
        Self {
            packet_size,
            max_message_len,
            buffer: Vec::new(),
            missing: 0,
            discarding: false,
        }
    }

    /// Whether a message is partially received
    pub fn is_receiving(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.missing = 0;
        self.discarding = false;
    }

    /// Feed one packet; returns a message once it is complete
    pub fn push(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        let short_packet = packet.len() < self.packet_size;

        if !self.is_receiving() {
            if packet.is_empty() {
                return None;
            }
            let total = match declared_length(packet) {
                Some(len) => CCID_HEADER_LEN.saturating_add(len as usize),
                // not even a length field: let the engine reject it
                None => return Some(packet.to_vec()),
            };
            if total > self.max_message_len {
                warn!(
                    "Message of {} bytes exceeds the {} byte limit, discarding its payload",
                    total, self.max_message_len
                );
                self.discarding = true;
                self.buffer
                    .extend_from_slice(&packet[..packet.len().min(CCID_HEADER_LEN)]);
            } else {
                self.buffer.extend_from_slice(packet);
            }
            self.missing = total.saturating_sub(packet.len());
        } else {
            if !self.discarding {
                self.buffer.extend_from_slice(packet);
            }
            self.missing = self.missing.saturating_sub(packet.len());
        }

        if self.missing > 0 && !short_packet {
            debug!("Waiting for {} more byte(s)", self.missing);
            return None;
        }

        self.missing = 0;
        self.discarding = false;
        Some(std::mem::take(&mut self.buffer))
    }
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_SIZE)
    }
}

/// Scripted in-memory transport
///
/// Hands out the queued requests in order, then reports `Closed`. Every
/// response is kept for inspection.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

impl MemoryTransport {
    pub fn new<I>(requests: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            inbound: requests.into_iter().collect(),
            sent: Vec::new(),
        }
    }

    pub fn push(&mut self, request: Vec<u8>) {
        self.inbound.push_back(request);
    }

    /// Responses in the order they were sent
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn into_sent(self) -> Vec<Vec<u8>> {
        self.sent
    }
}

impl Transport for MemoryTransport {
    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inbound.pop_front().ok_or(TransportError::Closed)
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.sent.push(data.to_vec());
        Ok(())
    }
}

/// Reassembles the packets of an inner transport into whole messages
#[derive(Debug)]
pub struct PacketTransport<T> {
    inner: T,
    assembler: MessageAssembler,
}

impl<T: Transport> PacketTransport<T> {
    pub fn new(inner: T, packet_size: usize) -> Self {
        Self {
            inner,
            assembler: MessageAssembler::new(packet_size),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for PacketTransport<T> {
    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            let packet = self.inner.receive()?;
            if let Some(message) = self.assembler.push(&packet) {
                return Ok(message);
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.inner.send(data)
    }
}

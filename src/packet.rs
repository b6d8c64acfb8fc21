//! Fixed-capacity DCC packet buffers.
//!
//! A [`Packet`] holds up to [`MAX_PACKET_SIZE`] payload bytes plus the XOR
//! error-detection byte, together with the number of times the packet is to
//! be repeated after its first transmission. Packets are `Copy` so that the
//! interrupt handler can take one out of the scheduling slot with a single
//! fixed-size copy.

use crate::consts::{IDLE_PACKET, MAX_PACKET_SIZE, PACKET_BUFFER_LEN, RESET_PACKET};
use crate::error::DccError;

/// A DCC packet ready for transmission, checksum included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Packet {
    bytes: [u8; PACKET_BUFFER_LEN],
    len: u8,
    repeats: u8,
}

impl Packet {
    /// The idle packet (`FF 00 FF`), sent once with no repeats.
    pub const IDLE: Packet = Packet::from_raw(IDLE_PACKET, 0);

    /// The decoder reset packet (`00 00 00`), sent once with no repeats.
    pub const RESET: Packet = Packet::from_raw(RESET_PACKET, 0);

    /// An empty packet, used to initialise buffers.
    pub const EMPTY: Packet = Packet {
        bytes: [0; PACKET_BUFFER_LEN],
        len: 0,
        repeats: 0,
    };

    /// Builds a packet from bytes that already carry their checksum.
    const fn from_raw(raw: [u8; 3], repeats: u8) -> Self {
        let mut bytes = [0; PACKET_BUFFER_LEN];
        bytes[0] = raw[0];
        bytes[1] = raw[1];
        bytes[2] = raw[2];
        Self {
            bytes,
            len: 3,
            repeats,
        }
    }

    /// Builds a packet from a payload, appending the XOR checksum.
    ///
    /// # Arguments
    /// - `payload`: address and instruction bytes, at most [`MAX_PACKET_SIZE`]
    /// - `repeats`: number of extra transmissions after the first one
    ///
    /// # Errors
    /// [`DccError::PacketTooLong`] if the payload does not fit.
    pub fn with_checksum(payload: &[u8], repeats: u8) -> Result<Self, DccError> {
        if payload.len() > MAX_PACKET_SIZE {
            return Err(DccError::PacketTooLong { len: payload.len() });
        }
        let mut bytes = [0; PACKET_BUFFER_LEN];
        bytes[..payload.len()].copy_from_slice(payload);
        bytes[payload.len()] = checksum(payload);
        Ok(Self {
            bytes,
            len: payload.len() as u8 + 1,
            repeats,
        })
    }

    /// The bytes on the wire, checksum included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Number of bytes on the wire, checksum included.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` if the packet carries no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of extra transmissions after the first one.
    pub fn repeats(&self) -> u8 {
        self.repeats
    }
}

/// XOR of all bytes, the DCC error-detection byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

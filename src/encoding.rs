//! NMRA DCC bit encoding for packet transmission.
//!
//! This module turns a [`Packet`] into the bit sequence required by NMRA
//! S-9.2:
//!
//! ```text
//! 1111111111111111 0 AAAAAAAA 0 DDDDDDDD 0 EEEEEEEE 1
//! |-- preamble --| ^ address  ^ data     ^ checksum ^ packet end bit
//!                  start bits
//! ```
//!
//! ## Purpose
//!
//! The waveform generator asks for one bit at a time. Bits are derived on
//! the fly from the packet bytes and a small cursor; a packet is never
//! expanded into a bit buffer ahead of time, so the interrupt handler only
//! ever touches a few bytes of state.
//!
//! ## Types
//!
//! - [`BitCursor`]: position within the current packet, yields [`EncodedBit`]s
//! - [`PacketBits`]: iterator over the complete bit sequence of one packet
//!
//! ## Bit order
//!
//! Each byte is preceded by a `0` start bit and sent most significant bit
//! first. The final byte is followed by a single `1` packet end bit.

use crate::packet::Packet;

/// Mask selecting the bit sent at each position of a 9-bit byte frame.
///
/// Position 0 is the start bit and always masks to `0`.
static BIT_MASK: [u8; 9] = [0x00, 0x80, 0x40, 0x20, 0x10, 0x08, 0x04, 0x02, 0x01];

/// One bit produced by the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodedBit {
    /// `true` for a `1` bit, `false` for a `0` bit.
    pub one: bool,
    /// `true` if this is the packet end bit.
    pub end_of_packet: bool,
}

/// Position within a packet during transmission.
///
/// The cursor starts in the preamble. Each call to
/// [`next_bit`](BitCursor::next_bit) advances by one bit; after the packet
/// end bit has been produced, [`restart`](BitCursor::restart) must be called
/// before the next packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitCursor {
    preamble_bits: u8,
    remaining_preamble: u8,
    byte_index: u8,
    // 0 = start bit, 1..=8 = data bits
    bit_index: u8,
}

impl BitCursor {
    /// Creates a cursor positioned at the start of a packet's preamble.
    pub const fn new(preamble_bits: u8) -> Self {
        Self {
            preamble_bits,
            remaining_preamble: preamble_bits,
            byte_index: 0,
            bit_index: 0,
        }
    }

    /// Rewinds to the start of the preamble for the next packet.
    pub fn restart(&mut self) {
        self.remaining_preamble = self.preamble_bits;
        self.byte_index = 0;
        self.bit_index = 0;
    }

    /// Number of preamble bits sent before each packet.
    pub fn preamble_bits(&self) -> u8 {
        self.preamble_bits
    }

    /// Produces the next bit of `packet`.
    ///
    /// Constant time, no allocation; safe to call from interrupt context.
    pub fn next_bit(&mut self, packet: &Packet) -> EncodedBit {
        if self.remaining_preamble > 0 {
            self.remaining_preamble -= 1;
            return EncodedBit {
                one: true,
                end_of_packet: false,
            };
        }

        let bytes = packet.bytes();
        let Some(&byte) = bytes.get(self.byte_index as usize) else {
            return EncodedBit {
                one: true,
                end_of_packet: true,
            };
        };

        let one = byte & BIT_MASK[self.bit_index as usize] != 0;
        self.bit_index += 1;
        if self.bit_index as usize == BIT_MASK.len() {
            self.bit_index = 0;
            self.byte_index += 1;
        }
        EncodedBit {
            one,
            end_of_packet: false,
        }
    }
}

/// Iterator over the full bit sequence of one packet, preamble through end bit.
///
/// Used for diagnostics and tests; the waveform generator drives a
/// [`BitCursor`] directly.
#[derive(Debug)]
pub struct PacketBits<'p> {
    packet: &'p Packet,
    cursor: BitCursor,
    done: bool,
}

impl<'p> PacketBits<'p> {
    /// Creates an iterator over `packet` with the given preamble length.
    pub fn new(packet: &'p Packet, preamble_bits: u8) -> Self {
        Self {
            packet,
            cursor: BitCursor::new(preamble_bits),
            done: false,
        }
    }
}

impl Iterator for PacketBits<'_> {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.done {
            return None;
        }
        let bit = self.cursor.next_bit(self.packet);
        self.done = bit.end_of_packet;
        Some(bit.one)
    }
}

/// Number of bits in the encoded form of a packet of `len` bytes.
pub const fn encoded_len(len: usize, preamble_bits: u8) -> usize {
    preamble_bits as usize + len * 9 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{PREAMBLE_BITS_MAIN, PREAMBLE_BITS_PROG};
    use std::vec::Vec;

    fn leading_ones(bits: &[bool]) -> usize {
        bits.iter().take_while(|&&b| b).count()
    }

    #[test]
    fn test_main_preamble_is_16_bits() {
        let packet = Packet::with_checksum(&[0x03, 0x3F, 0x10], 0).unwrap();
        let bits: Vec<bool> = PacketBits::new(&packet, PREAMBLE_BITS_MAIN).collect();
        assert_eq!(leading_ones(&bits), 16);
        assert!(!bits[16], "start bit must follow the preamble");
    }

    #[test]
    fn test_prog_preamble_is_22_bits() {
        let bits: Vec<bool> = PacketBits::new(&Packet::RESET, PREAMBLE_BITS_PROG).collect();
        assert_eq!(leading_ones(&bits), 22);
    }

    #[test]
    fn test_idle_packet_bit_pattern() {
        let bits: Vec<u8> = PacketBits::new(&Packet::IDLE, 16)
            .skip(16)
            .map(u8::from)
            .collect();
        assert_eq!(
            bits,
            [
                0, 1, 1, 1, 1, 1, 1, 1, 1, // start + 0xFF
                0, 0, 0, 0, 0, 0, 0, 0, 0, // start + 0x00
                0, 1, 1, 1, 1, 1, 1, 1, 1, // start + 0xFF
                1, // packet end bit
            ]
        );
    }

    #[test]
    fn test_data_bits_are_msb_first() {
        let packet = Packet::with_checksum(&[0b1010_0001], 0).unwrap();
        let bits: Vec<u8> = PacketBits::new(&packet, 0).take(9).map(u8::from).collect();
        assert_eq!(bits, [0, 1, 0, 1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_encoded_len_matches_iterator() {
        let packet = Packet::with_checksum(&[1, 2, 3, 4, 5], 0).unwrap();
        assert_eq!(
            PacketBits::new(&packet, PREAMBLE_BITS_PROG).count(),
            encoded_len(packet.len(), PREAMBLE_BITS_PROG)
        );
    }

    #[test]
    fn test_cursor_flags_end_bit_and_restarts() {
        let mut cursor = BitCursor::new(2);
        let packet = Packet::IDLE;
        let mut last = cursor.next_bit(&packet);
        let mut produced = 1;
        while !last.end_of_packet {
            last = cursor.next_bit(&packet);
            produced += 1;
        }
        assert!(last.one);
        assert_eq!(produced, encoded_len(3, 2));

        cursor.restart();
        assert_eq!(cursor, BitCursor::new(2));
        assert_eq!(cursor.preamble_bits(), 2);
    }
}

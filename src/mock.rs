//! Test doubles for running the command station without hardware.
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockMotorDriver`] | [`MotorDriver`] | Settable current, records power and brake calls |
//! | [`RecordingSignal`] | [`TrackSignal`] | Records the level of every tick |
//!
//! plus two decoders that turn recorded levels back into bits and packets,
//! so tests can check the waveform the way a DCC decoder would see it.
//!
//! # Example
//!
//! ```rust
//! use dccwave::mock::{RecordingSignal, decode_bits, decode_packets};
//! use dccwave::station::StationShared;
//! use dccwave::wave::{NoSignal, Waveform};
//!
//! let shared = StationShared::new();
//! let mut waveform: Waveform<'_, RecordingSignal, NoSignal> =
//!     Waveform::new(&shared, RecordingSignal::default(), None);
//! for _ in 0..400 {
//!     waveform.tick();
//! }
//! let bits = decode_bits(&waveform.main_signal().levels).unwrap();
//! let packets = decode_packets(&bits, 10);
//! assert_eq!(packets[0].bytes, [0xFF, 0x00, 0xFF]);
//! ```

use std::collections::VecDeque;
use std::vec::Vec;

use crate::driver::MotorDriver;
use crate::wave::TrackSignal;

/// Mock motor driver.
///
/// Current readings come from `queued` first, then from `current`.
#[derive(Debug, Default, Clone)]
pub struct MockMotorDriver {
    /// Power output state.
    pub power: bool,
    /// Brake state.
    pub brake: bool,
    /// Reading returned once `queued` is empty.
    pub current: i32,
    /// Readings returned first, in order.
    pub queued: VecDeque<i32>,
    /// Number of current readings taken.
    pub reads: usize,
    /// Number of brake applications.
    pub brake_pulses: usize,
    /// Value returned by [`MotorDriver::can_measure_current`].
    pub can_measure: bool,
}

impl MockMotorDriver {
    /// Creates a driver with current sensing, power off and zero current.
    pub fn new() -> Self {
        Self {
            can_measure: true,
            ..Default::default()
        }
    }

    /// Creates a driver that reads `current` until changed.
    pub fn with_current(current: i32) -> Self {
        Self {
            current,
            ..Self::new()
        }
    }
}

impl MotorDriver for MockMotorDriver {
    fn set_power(&mut self, on: bool) {
        if on {
            self.set_brake(true);
            self.set_brake(false);
        }
        self.power = on;
    }

    fn set_brake(&mut self, on: bool) {
        if on {
            self.brake_pulses += 1;
        }
        self.brake = on;
    }

    fn current_raw(&mut self) -> i32 {
        self.reads += 1;
        self.queued.pop_front().unwrap_or(self.current)
    }

    fn can_measure_current(&self) -> bool {
        self.can_measure
    }
}

/// Signal output that records the level driven on every tick.
#[derive(Debug, Default, Clone)]
pub struct RecordingSignal {
    /// Levels in tick order, `true` = high.
    pub levels: Vec<bool>,
}

impl TrackSignal for RecordingSignal {
    fn set_signal(&mut self, high: bool) {
        self.levels.push(high);
    }
}

/// Turns per-tick levels back into DCC bits.
///
/// Every bit starts high and ends low: one tick each way is a `1`, two ticks
/// each way a `0`. A truncated bit at the end of the recording is dropped.
///
/// # Returns
/// `None` if any bit has unequal or unexpected half lengths.
pub fn decode_bits(levels: &[bool]) -> Option<Vec<bool>> {
    let mut runs: Vec<(bool, usize)> = Vec::new();
    for &level in levels {
        match runs.last_mut() {
            Some((last, len)) if *last == level => *len += 1,
            _ => runs.push((level, 1)),
        }
    }

    let mut bits = Vec::new();
    let mut iter = runs.chunks(2).peekable();
    while let Some(pair) = iter.next() {
        let last = iter.peek().is_none();
        match pair {
            [(true, 1), (false, 1)] => bits.push(true),
            [(true, 2), (false, 2)] => bits.push(false),
            [(true, _)] if last => {}
            [(true, 2), (false, 1)] if last => {}
            _ => return None,
        }
    }
    Some(bits)
}

/// A packet recovered from a bit stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    /// Number of `1` bits seen before the first start bit.
    pub preamble: usize,
    /// Packet bytes, checksum included.
    pub bytes: Vec<u8>,
}

/// Splits a bit stream into packets the way a decoder does.
///
/// A `0` bit after at least `min_preamble` ones starts a packet; a `1` bit
/// after a data byte ends it. A packet cut off at the end is dropped.
pub fn decode_packets(bits: &[bool], min_preamble: usize) -> Vec<DecodedPacket> {
    let mut packets = Vec::new();
    let mut ones = 0;
    let mut i = 0;
    while i < bits.len() {
        if bits[i] {
            ones += 1;
            i += 1;
            continue;
        }
        if ones < min_preamble {
            ones = 0;
            i += 1;
            continue;
        }

        let preamble = ones;
        let mut bytes = Vec::new();
        i += 1;
        loop {
            let Some(byte_bits) = bits.get(i..i + 8) else {
                return packets;
            };
            bytes.push(byte_bits.iter().fold(0u8, |acc, &b| (acc << 1) | u8::from(b)));
            i += 8;
            match bits.get(i) {
                None => return packets,
                Some(true) => {
                    i += 1;
                    break;
                }
                Some(false) => i += 1,
            }
        }
        packets.push(DecodedPacket { preamble, bytes });
        ones = 0;
    }
    packets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bits() {
        let levels = [true, false, true, true, false, false, true, false];
        assert_eq!(decode_bits(&levels), Some(vec![true, false, true]));
    }

    #[test]
    fn test_decode_bits_rejects_asymmetry() {
        assert_eq!(decode_bits(&[true, false, false, true, false]), None);
        assert_eq!(decode_bits(&[true, true, true, false, false, false]), None);
    }

    #[test]
    fn test_decode_bits_drops_truncated_tail() {
        assert_eq!(decode_bits(&[true, false, true, true, false]), Some(vec![true]));
        assert_eq!(decode_bits(&[true, false, true]), Some(vec![true]));
    }

    #[test]
    fn test_decode_packets() {
        let mut bits = vec![true; 12];
        for byte in [0x03u8, 0x3F, 0x3C] {
            bits.push(false);
            bits.extend((0..8).rev().map(|i| byte & (1 << i) != 0));
        }
        bits.push(true);
        bits.extend([true; 3]);
        let packets = decode_packets(&bits, 10);
        assert_eq!(
            packets,
            [DecodedPacket {
                preamble: 12,
                bytes: vec![0x03, 0x3F, 0x3C],
            }]
        );
    }

    #[test]
    fn test_mock_driver_queue_then_current() {
        let mut driver = MockMotorDriver::with_current(5);
        driver.queued.extend([1, 2]);
        assert_eq!(driver.current_raw(), 1);
        assert_eq!(driver.current_raw(), 2);
        assert_eq!(driver.current_raw(), 5);
        assert_eq!(driver.reads, 3);
        driver.set_power(true);
        assert!(driver.power && !driver.brake);
        assert_eq!(driver.brake_pulses, 1);
    }
}

//! Constants used across the DCC command station core.
//!
//! This module defines protocol-wide constants for packet sizing, preamble
//! length, signal timing, current limits and the overload/ACK timing
//! defaults.
//!
//! These values follow the NMRA S-9.1 / S-9.2 electrical and packet
//! conventions and the defaults used by common Arduino based command
//! stations.
//!
//! ## Key Concepts
//!
//! - **Preamble**: a run of `1` bits used by decoders to synchronise. The
//!   programming track uses a longer preamble than the operating track.
//! - **Payload Limits**: NMRA extended packets carry at most 5 bytes of
//!   payload; the XOR checksum is appended on top of that.
//! - **Tick**: the fixed timer period. One tick is half of a `1` bit; a `0`
//!   bit lasts two ticks per half.
//! - **Sampling**: overload checks are throttled to one sample per interval,
//!   with the interval depending on the power mode.

/// Number of preamble bits sent on the operating (main) track.
pub const PREAMBLE_BITS_MAIN: u8 = 16;

/// Number of preamble bits sent on the programming track.
///
/// Service-mode decoders need the longer preamble to recognise
/// programming packets.
pub const PREAMBLE_BITS_PROG: u8 = 22;

/// Maximum payload size of a packet in bytes, **without** the checksum.
pub const MAX_PACKET_SIZE: usize = 5;

/// Size of a packet buffer: the payload plus one checksum byte.
pub const PACKET_BUFFER_LEN: usize = MAX_PACKET_SIZE + 1;

/// The idle packet, checksum included.
///
/// Sent continuously on the main track whenever nothing else is queued.
pub const IDLE_PACKET: [u8; 3] = [0xFF, 0x00, 0xFF];

/// The digital decoder reset packet, checksum included.
///
/// Sent continuously on the programming track whenever nothing else is queued.
pub const RESET_PACKET: [u8; 3] = [0x00, 0x00, 0x00];

/// Timer period in microseconds.
///
/// A `1` bit is one tick high and one tick low (58 µs per half);
/// a `0` bit is two ticks high and two ticks low (116 µs per half).
pub const TICK_PERIOD_US: u32 = 58;

/// Number of ticks in each half of a `1` bit.
pub const ONE_BIT_HALF_TICKS: u8 = 1;

/// Number of ticks in each half of a `0` bit.
pub const ZERO_BIT_HALF_TICKS: u8 = 2;

/// Booster id reported for the main track driver.
pub const MAIN_TRACK_ID: u8 = 0;

/// Booster id reported for the programming track driver.
pub const PROG_TRACK_ID: u8 = 255;

/// Maximum number of boosters that can be chained to one track.
pub const MAX_BOOSTERS: usize = 4;

/// Maximum number of current-sensing drivers on one track (track + boosters).
pub const MAX_TRACK_DRIVERS: usize = MAX_BOOSTERS + 1;

/// NMRA programming track current limit in milliamps.
pub const TRIP_CURRENT_PROG_MA: u32 = 250;

/// Sampling interval while a track is switched on, in milliseconds.
pub const POWER_SAMPLE_ON_WAIT_MS: u32 = 100;

/// Sampling interval while a track is switched off, in milliseconds.
pub const POWER_SAMPLE_OFF_WAIT_MS: u32 = 1000;

/// Initial (minimum) off-time after an overload, in milliseconds.
pub const POWER_SAMPLE_OVERLOAD_WAIT_MS: u32 = 20;

/// Ceiling for the overload off-time back-off, in milliseconds.
pub const POWER_SAMPLE_OVERLOAD_WAIT_MAX_MS: u32 = 10_000;

/// Consecutive good samples after which the overload back-off resets.
pub const POWER_GOOD_SAMPLES: u8 = 100;

/// Saturation value of the "filler packets since last real packet" counter.
pub const MAX_SENT_RESETS: u8 = 250;

/// Default ACK current rise above the baseline, in milliamps.
///
/// NMRA S-9.2.3 requires at least 60 mA.
pub const ACK_LIMIT_MA: u32 = 60;

/// Default minimum ACK pulse duration in microseconds.
pub const MIN_ACK_PULSE_US: u32 = 2_000;

/// Default maximum ACK pulse duration in microseconds.
pub const MAX_ACK_PULSE_US: u32 = 8_500;

/// Default time allowed for a decoder to acknowledge, in milliseconds.
pub const ACK_TIMEOUT_MS: u32 = 150;

//! # dccwave
//!
//! A portable, no_std Rust core for NMRA DCC (Digital Command Control) model-railway
//! command stations: the part that turns packets into track signal, keeps the track
//! powered, and listens for decoder acknowledgements on the programming track.
//!
//! This crate implements:
//! - a table-driven waveform generator, ticked from a fixed 58 µs timer
//! - a lock-free, last-write-wins packet slot between mainline code and the interrupt
//! - per-driver overload protection with exponential retry back-off
//! - programming track ACK pulse detection
//! - `embedded-hal` traits for every pin, so it runs on AVR and ARM Cortex-M alike
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support and enables the [`mock`] module |
//! | `delay-loop`          | Uses `embedded_hal::delay::DelayNs` for tick timing |
//! | `timer-isr` (default) | Uses `critical_section::with` for tick timing |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Architecture
//!
//! ```text
//!   mainline loop                        timer interrupt (every 58 µs)
//!   -------------                        -----------------------------
//!   CommandStation                       Waveform
//!    ├─ TrackController (main)            ├─ WaveGenerator (main) ──> signal pin
//!    │   ├─ MotorDriver + OverloadMonitor │
//!    │   └─ boosters                      └─ WaveGenerator (prog) ──> signal pin
//!    └─ TrackController (prog)
//!        └─ AckDetector
//!                 │                                 ▲
//!                 └──── StationShared (PacketSlots) ┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use dccwave::config::StationConfig;
//! use dccwave::mock::{MockMotorDriver, RecordingSignal};
//! use dccwave::power::PowerMode;
//! use dccwave::station::{CommandStation, StationShared};
//! use dccwave::wave::{NoSignal, Waveform};
//!
//! static SHARED: StationShared = StationShared::new();
//!
//! let mut waveform: Waveform<'_, RecordingSignal, NoSignal> =
//!     Waveform::new(&SHARED, RecordingSignal::default(), None);
//! let mut station = CommandStation::new(&SHARED, MockMotorDriver::new(), None, StationConfig::default());
//!
//! station.main_mut().set_power_mode(PowerMode::On);
//! // Loco 3, speed step 16 forward, sent four times.
//! station.main().schedule_packet(&[0x03, 0x3F, 0x90], 3).unwrap();
//! loop {
//!     waveform.tick(); // Call at 58 µs intervals
//!     # break;
//! }
//! ```
//!
//! Or, use `run_tick_loop()` with a `DelayNs` implementation:
//!
//! ```rust,ignore
//! dccwave::timer::run_tick_loop(&mut waveform, &mut delay, 58);
//! ```
//!
//! ## Integration Notes
//!
//! - The tick handler never blocks, allocates or locks; it must still be the
//!   highest-priority interrupt, because every late tick stretches a bit
//! - Only one `Waveform` should be ticked per `StationShared`
//! - All mainline timestamps are wrapping `u32` milliseconds or microseconds
//!   supplied by the caller
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "timer-isr")]
pub use critical_section;

#[cfg(not(feature = "std"))]
pub use heapless;

#[macro_use]
mod fmt;

pub mod ack;
pub mod config;
pub mod consts;
pub mod driver;
pub mod encoding;
pub mod error;
#[cfg(feature = "std")]
pub mod mock;
pub mod packet;
pub mod power;
pub mod scheduler;
pub mod station;
pub mod timer;
pub mod track;
pub mod wave;

pub use ack::AckResult;
pub use error::DccError;
pub use packet::Packet;
pub use power::{PowerEvent, PowerMode};
pub use station::{CommandStation, StationShared};
pub use track::TrackController;
pub use wave::{TrackKind, Waveform};

//! Table-driven DCC waveform generation.
//!
//! This module provides the interrupt-side half of the command station:
//!
//! - [`WaveState`] and its transition/level tables
//! - [`WaveGenerator`], the per-track state machine advanced once per tick
//! - [`TrackSignal`] and [`SignalPins`], the signal pin outputs
//! - [`Waveform`], which drives the main and programming tracks from a single
//!   timer interrupt
//!
//! ## Timing
//!
//! [`Waveform::tick()`] must be called every [`TICK_PERIOD_US`] (58 µs), from
//! a hardware timer interrupt or a tight delay loop. Each call:
//!
//! 1. drives every signal pin to the level of its track's current state
//! 2. moves every track to its next state via the transition table
//! 3. for a track that reached [`WaveState::Pending`], asks the encoder for
//!    the next bit and jumps to [`WaveState::MidOne`] (bit `1`) or
//!    [`WaveState::HighZero`] (bit `0`)
//!
//! A `1` bit therefore lasts one tick high and one tick low, a `0` bit two
//! ticks high and two ticks low. The tables are total over all six states, so
//! a tick can never skip or double a transition.
//!
//! ## Contract
//!
//! `tick()` never blocks, never allocates and takes no locks. Its worst-case
//! execution time is one table lookup and pin write per track, plus one
//! fixed-size packet copy at a packet boundary.
//!
//! [`TICK_PERIOD_US`]: crate::consts::TICK_PERIOD_US

use core::convert::Infallible;
use embedded_hal::digital::OutputPin;
use portable_atomic::{AtomicBool, Ordering};

use crate::consts::{PREAMBLE_BITS_MAIN, PREAMBLE_BITS_PROG};
use crate::encoding::BitCursor;
use crate::packet::Packet;
use crate::scheduler::PacketSlot;
use crate::station::StationShared;

/// State of the wave generator within the current bit.
///
/// The discriminants index [`WaveState::TRANSITIONS`] and
/// [`WaveState::LEVELS`]. Do not reorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WaveState {
    /// First tick of every bit; signal high.
    Start = 0,
    /// Second half of a `1` bit; signal low.
    MidOne = 1,
    /// Second high tick of a `0` bit.
    HighZero = 2,
    /// First low tick of a `0` bit.
    MidZero = 3,
    /// Second low tick of a `0` bit.
    LowZero = 4,
    /// The next bit must be fetched from the encoder.
    Pending = 5,
}

impl WaveState {
    /// All states in discriminant order.
    pub const ALL: [WaveState; 6] = [
        WaveState::Start,
        WaveState::MidOne,
        WaveState::HighZero,
        WaveState::MidZero,
        WaveState::LowZero,
        WaveState::Pending,
    ];

    /// Next state, indexed by the current state.
    pub const TRANSITIONS: [WaveState; 6] = [
        /* Start    -> */ WaveState::Pending,
        /* MidOne   -> */ WaveState::Start,
        /* HighZero -> */ WaveState::MidZero,
        /* MidZero  -> */ WaveState::LowZero,
        /* LowZero  -> */ WaveState::Start,
        /* Pending  -> */ WaveState::Pending,
    ];

    /// Signal level (`true` = high), indexed by the current state.
    pub const LEVELS: [bool; 6] = [
        /* Start    */ true,
        /* MidOne   */ false,
        /* HighZero */ true,
        /* MidZero  */ false,
        /* LowZero  */ false,
        /* Pending  */ true,
    ];

    /// The state that follows this one.
    #[inline(always)]
    pub fn next(self) -> WaveState {
        Self::TRANSITIONS[self as usize]
    }

    /// The signal level driven while in this state.
    #[inline(always)]
    pub fn level(self) -> bool {
        Self::LEVELS[self as usize]
    }
}

/// Electrical role of a track, which fixes its preamble and filler packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    /// Operating track: 16-bit preamble, idle packets as filler.
    Main,
    /// Programming track: 22-bit preamble, reset packets as filler.
    Programming,
}

impl TrackKind {
    /// Number of preamble bits sent before each packet.
    pub const fn preamble_bits(self) -> u8 {
        match self {
            TrackKind::Main => PREAMBLE_BITS_MAIN,
            TrackKind::Programming => PREAMBLE_BITS_PROG,
        }
    }

    /// Packet repeated when nothing has been scheduled.
    pub const fn filler(self) -> Packet {
        match self {
            TrackKind::Main => Packet::IDLE,
            TrackKind::Programming => Packet::RESET,
        }
    }

    /// Short label used in diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            TrackKind::Main => "MAIN",
            TrackKind::Programming => "PROG",
        }
    }
}

/// Per-track wave state machine.
///
/// Owns the *transmitting* packet buffer, which only the interrupt context
/// touches, and pulls new packets from the track's [`PacketSlot`] at packet
/// boundaries.
#[derive(Debug)]
pub struct WaveGenerator<'a> {
    kind: TrackKind,
    slot: &'a PacketSlot,
    state: WaveState,
    transmit: Packet,
    remaining_repeats: u8,
    cursor: BitCursor,
}

impl<'a> WaveGenerator<'a> {
    /// Creates a generator that starts by sending the track's filler packet.
    pub fn new(kind: TrackKind, slot: &'a PacketSlot) -> Self {
        Self {
            kind,
            slot,
            state: WaveState::Start,
            transmit: kind.filler(),
            remaining_repeats: 0,
            cursor: BitCursor::new(kind.preamble_bits()),
        }
    }

    /// The track role this generator was built for.
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Current wave state.
    pub fn state(&self) -> WaveState {
        self.state
    }

    /// Signal level for the current state.
    #[inline(always)]
    pub fn level(&self) -> bool {
        self.state.level()
    }

    /// The packet currently being transmitted.
    pub fn transmitting(&self) -> &Packet {
        &self.transmit
    }

    /// Moves to the next state, fetching the next bit when one is needed.
    #[inline]
    pub fn advance(&mut self) {
        self.state = self.state.next();
        if self.state == WaveState::Pending {
            self.load_next_bit();
        }
    }

    fn load_next_bit(&mut self) {
        let bit = self.cursor.next_bit(&self.transmit);
        self.state = if bit.one {
            WaveState::MidOne
        } else {
            WaveState::HighZero
        };
        if bit.end_of_packet {
            self.end_of_packet();
        }
    }

    fn end_of_packet(&mut self) {
        self.cursor.restart();
        if self.remaining_repeats > 0 {
            self.remaining_repeats -= 1;
        } else if let Some(packet) = self.slot.take() {
            self.transmit = packet;
            self.remaining_repeats = packet.repeats();
        } else {
            self.transmit = self.kind.filler();
            self.remaining_repeats = 0;
            self.slot.note_filler_sent();
        }
    }
}

/// Output side of a track signal.
///
/// Implementations must be fast enough to call from the timer interrupt.
pub trait TrackSignal {
    /// Drives the track signal high (`true`) or low (`false`).
    fn set_signal(&mut self, high: bool);
}

/// Signal output made of one pin, or two complementary pins.
///
/// With a second pin the outputs are always driven to opposite levels, for
/// H-bridges that do not invert internally.
#[derive(Debug)]
pub struct SignalPins<SIG, SIG2>
where
    SIG: OutputPin,
    SIG2: OutputPin,
{
    /// Primary signal pin.
    pub signal: SIG,
    /// Optional inverted signal pin.
    pub signal2: Option<SIG2>,
}

impl<SIG, SIG2> SignalPins<SIG, SIG2>
where
    SIG: OutputPin,
    SIG2: OutputPin,
{
    /// Creates a signal output.
    ///
    /// # Arguments
    /// - `signal`: pin driven with the DCC level
    /// - `signal2`: optional pin driven with the inverse level
    pub fn new(signal: SIG, signal2: Option<SIG2>) -> Self {
        Self { signal, signal2 }
    }
}

impl<SIG, SIG2> TrackSignal for SignalPins<SIG, SIG2>
where
    SIG: OutputPin,
    SIG2: OutputPin,
{
    #[inline]
    fn set_signal(&mut self, high: bool) {
        // Pin errors cannot be handled in interrupt context.
        let _ = self.signal.set_state(high.into());
        if let Some(ref mut signal2) = self.signal2 {
            let _ = signal2.set_state((!high).into());
        }
    }
}

/// Placeholder signal for stations built without a programming track.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignal;

impl TrackSignal for NoSignal {
    fn set_signal(&mut self, _high: bool) {}
}

impl embedded_hal::digital::ErrorType for NoSignal {
    type Error = Infallible;
}

impl OutputPin for NoSignal {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Interrupt-side view of the whole station: one generator and signal per track.
///
/// Construct once at start-up, move into the timer interrupt (see
/// [`crate::timer`]) and call [`tick()`](Waveform::tick) every 58 µs.
#[derive(Debug)]
pub struct Waveform<'a, M, P>
where
    M: TrackSignal,
    P: TrackSignal,
{
    main: WaveGenerator<'a>,
    main_signal: M,
    prog: Option<(WaveGenerator<'a>, P)>,
    prog_sync_main: &'a AtomicBool,
}

impl<'a, M, P> Waveform<'a, M, P>
where
    M: TrackSignal,
    P: TrackSignal,
{
    /// Creates the waveform for a station.
    ///
    /// # Arguments
    /// - `shared`: the packet slots and flags shared with the mainline
    ///   [`CommandStation`](crate::station::CommandStation)
    /// - `main_signal`: main track signal output
    /// - `prog_signal`: programming track signal output, if there is one
    pub fn new(shared: &'a StationShared, main_signal: M, prog_signal: Option<P>) -> Self {
        Self {
            main: WaveGenerator::new(TrackKind::Main, &shared.main),
            main_signal,
            prog: prog_signal
                .map(|signal| (WaveGenerator::new(TrackKind::Programming, &shared.prog), signal)),
            prog_sync_main: &shared.prog_sync_main,
        }
    }

    /// Advances every track by one tick. Interrupt context.
    #[inline]
    pub fn tick(&mut self) {
        let main_level = self.main.level();
        self.main_signal.set_signal(main_level);

        if let Some((generator, signal)) = self.prog.as_mut() {
            let level = if self.prog_sync_main.load(Ordering::Relaxed) {
                main_level
            } else {
                generator.level()
            };
            signal.set_signal(level);
            generator.advance();
        }

        self.main.advance();
    }

    /// Main track generator.
    pub fn main(&self) -> &WaveGenerator<'a> {
        &self.main
    }

    /// Programming track generator, if present.
    pub fn prog(&self) -> Option<&WaveGenerator<'a>> {
        self.prog.as_ref().map(|(generator, _)| generator)
    }

    /// Main track signal output.
    pub fn main_signal(&self) -> &M {
        &self.main_signal
    }

    /// Programming track signal output, if present.
    pub fn prog_signal(&self) -> Option<&P> {
        self.prog.as_ref().map(|(_, signal)| signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::PacketBits;
    use crate::mock::{RecordingSignal, decode_bits};
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use std::vec::Vec;

    #[test]
    fn test_transition_table_is_total() {
        for state in WaveState::ALL {
            let next = state.next();
            assert!(WaveState::ALL.contains(&next));
            assert_eq!(WaveState::ALL[state as usize], state);
        }
    }

    #[test]
    fn test_every_state_returns_to_start() {
        // Pending is resolved by the encoder into MidOne or HighZero.
        let resolve = |s: WaveState| if s == WaveState::Pending { WaveState::HighZero } else { s };
        for state in WaveState::ALL {
            let mut s = resolve(state);
            let mut steps = 0;
            while s != WaveState::Start {
                s = resolve(s.next());
                steps += 1;
                assert!(steps <= 4, "{state:?} never reaches Start");
            }
        }
    }

    #[test]
    fn test_bit_cycles_visit_every_state_once() {
        let one_bit = [WaveState::Start, WaveState::Pending, WaveState::MidOne];
        let zero_bit = [
            WaveState::Start,
            WaveState::Pending,
            WaveState::HighZero,
            WaveState::MidZero,
            WaveState::LowZero,
        ];
        assert_eq!(WaveState::MidOne.next(), WaveState::Start);
        assert_eq!(WaveState::LowZero.next(), WaveState::Start);
        for pair in zero_bit[2..].windows(2) {
            assert_eq!(pair[0].next(), pair[1]);
        }
        let mut visited: Vec<WaveState> = one_bit.iter().chain(zero_bit.iter()).copied().collect();
        visited.sort_by_key(|s| *s as u8);
        visited.dedup();
        assert_eq!(visited, WaveState::ALL);
    }

    #[test]
    fn test_level_table() {
        let high: Vec<bool> = WaveState::ALL.iter().map(|s| s.level()).collect();
        assert_eq!(high, [true, false, true, false, false, true]);
    }

    #[test]
    fn test_one_and_zero_bit_tick_counts() {
        // A `1` bit: Start (H), MidOne (L). A `0` bit: Start, HighZero (H), MidZero, LowZero (L).
        let one = [WaveState::Start, WaveState::MidOne];
        let zero = [
            WaveState::Start,
            WaveState::HighZero,
            WaveState::MidZero,
            WaveState::LowZero,
        ];
        let highs = |bit: &[WaveState]| bit.iter().filter(|s| s.level()).count();
        let lows = |bit: &[WaveState]| bit.iter().filter(|s| !s.level()).count();
        assert_eq!(highs(&one), lows(&one));
        assert_eq!(highs(&zero), lows(&zero));
        assert_eq!(highs(&zero), 2 * highs(&one));
    }

    #[test]
    fn test_generator_starts_with_filler() {
        let slot = PacketSlot::new();
        let main = WaveGenerator::new(TrackKind::Main, &slot);
        assert_eq!(main.state(), WaveState::Start);
        assert_eq!(main.transmitting(), &Packet::IDLE);
        let prog = WaveGenerator::new(TrackKind::Programming, &slot);
        assert_eq!(prog.transmitting(), &Packet::RESET);
        assert_eq!(prog.kind(), TrackKind::Programming);
    }

    #[test]
    fn test_generator_emits_encoded_bits() {
        let slot = PacketSlot::new();
        let mut generator = WaveGenerator::new(TrackKind::Main, &slot);
        let mut levels = Vec::new();
        let expected: Vec<bool> = PacketBits::new(&Packet::IDLE, PREAMBLE_BITS_MAIN).collect();
        // 1 bits take 2 ticks, 0 bits take 4.
        let ticks: usize = expected.iter().map(|&b| if b { 2 } else { 4 }).sum();
        for _ in 0..ticks {
            levels.push(generator.level());
            generator.advance();
        }
        assert_eq!(decode_bits(&levels).unwrap(), expected);
        assert_eq!(slot.sent_resets_since_packet(), 1);
    }

    #[test]
    fn test_signal_pins_drive_complementary_levels() {
        let signal = PinMock::new(&[
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let signal2 = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut pins = SignalPins::new(signal, Some(signal2));
        pins.set_signal(true);
        pins.set_signal(false);
        pins.signal.done();
        if let Some(signal2) = pins.signal2.as_mut() {
            signal2.done();
        }
    }

    #[test]
    fn test_waveform_drives_single_pin() {
        let signal = PinMock::new(&[
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let shared = StationShared::new();
        let mut waveform: Waveform<'_, SignalPins<PinMock, NoSignal>, NoSignal> =
            Waveform::new(&shared, SignalPins::new(signal, None), None);
        // First preamble bit: one tick high, one tick low.
        waveform.tick();
        waveform.tick();
        assert_eq!(waveform.main().state(), WaveState::Start);
        assert!(waveform.prog().is_none());
        let mut pins = waveform.main_signal;
        pins.signal.done();
    }

    #[test]
    fn test_prog_follows_main_when_synced() {
        let shared = StationShared::new();
        let mut waveform = Waveform::new(
            &shared,
            RecordingSignal::default(),
            Some(RecordingSignal::default()),
        );
        shared.main.schedule(&[0x00, 0x00], 0).unwrap();
        shared.set_prog_sync_main(true);
        for _ in 0..500 {
            waveform.tick();
        }
        let main = &waveform.main_signal().levels;
        let prog = &waveform.prog_signal().unwrap().levels;
        assert_eq!(main, prog);
    }

    #[test]
    fn test_prog_runs_independently_by_default() {
        let shared = StationShared::new();
        let mut waveform = Waveform::new(
            &shared,
            RecordingSignal::default(),
            Some(RecordingSignal::default()),
        );
        // 16 vs 22 preamble bits: the tracks diverge at the main start bit.
        for _ in 0..40 {
            waveform.tick();
        }
        let main = &waveform.main_signal().levels;
        let prog = &waveform.prog_signal().unwrap().levels;
        assert_eq!(main[..32], prog[..32]);
        assert_ne!(main, prog);
    }
}

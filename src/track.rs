//! Mainline-side controller of one physical track.
//!
//! A [`TrackController`] ties together everything the polling loop needs for
//! one track:
//!
//! - the track's [`PacketSlot`], shared with the interrupt-side
//!   [`WaveGenerator`](crate::wave::WaveGenerator)
//! - the track's [`MotorDriver`] and its [`OverloadMonitor`]
//! - up to [`MAX_BOOSTERS`] boosters, each with its own driver and monitor
//! - on the programming track, the [`AckDetector`]
//!
//! The controller never touches the signal pin; the waveform does that from
//! the timer interrupt.

use core::convert::Infallible;
use core::fmt;
use heapless::Vec;

use crate::ack::{AckDetector, AckResult};
use crate::config::{AckConfig, OverloadConfig, SenseConfig};
use crate::consts::{MAIN_TRACK_ID, MAX_BOOSTERS, MAX_TRACK_DRIVERS, PROG_TRACK_ID};
use crate::driver::MotorDriver;
use crate::error::DccError;
use crate::packet::Packet;
use crate::power::{OverloadMonitor, PowerEvent, PowerMode};
use crate::scheduler::PacketSlot;
use crate::wave::TrackKind;

/// Power events produced by one overload check of a track and its boosters.
pub type PowerEvents = Vec<PowerEvent, MAX_TRACK_DRIVERS>;

/// An auxiliary power output sharing a track's signal.
#[derive(Debug)]
pub struct Booster<D: MotorDriver> {
    driver: D,
    monitor: OverloadMonitor,
}

impl<D: MotorDriver> Booster<D> {
    /// Booster id.
    pub fn id(&self) -> u8 {
        self.monitor.booster_id()
    }

    /// The booster's driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The booster's overload state.
    pub fn monitor(&self) -> &OverloadMonitor {
        &self.monitor
    }
}

/// Controller of one track: packet scheduling, power, overload and ACK.
#[derive(Debug)]
pub struct TrackController<'a, D: MotorDriver> {
    kind: TrackKind,
    slot: &'a PacketSlot,
    driver: D,
    monitor: OverloadMonitor,
    overload: OverloadConfig,
    boosters: Vec<Booster<D>, MAX_BOOSTERS>,
    ack: Option<AckDetector>,
    // Start of the deferred ACK pulse (us) and the poll time that first saw it (ms).
    ack_deferral: Option<(u32, u32)>,
    auto_power_off: bool,
}

impl<'a, D: MotorDriver> TrackController<'a, D> {
    /// Creates a controller with power off.
    ///
    /// # Arguments
    /// - `kind`: main or programming track
    /// - `slot`: the track's packet slot, shared with its wave generator
    /// - `driver`: the track's motor driver
    /// - `sense`: scaling and trip limits of `driver`
    /// - `overload`: sampling policy for the track and its boosters
    /// - `ack`: acknowledgement parameters, only used on the programming track
    pub fn new(
        kind: TrackKind,
        slot: &'a PacketSlot,
        mut driver: D,
        sense: SenseConfig,
        overload: OverloadConfig,
        ack: AckConfig,
    ) -> Self {
        let id = match kind {
            TrackKind::Main => MAIN_TRACK_ID,
            TrackKind::Programming => PROG_TRACK_ID,
        };
        let mut monitor = OverloadMonitor::new(id, sense, overload);
        monitor.set_mode(&mut driver, PowerMode::Off);
        Self {
            kind,
            slot,
            driver,
            monitor,
            overload,
            boosters: Vec::new(),
            ack: (kind == TrackKind::Programming).then(|| AckDetector::new(ack, sense)),
            ack_deferral: None,
            auto_power_off: false,
        }
    }

    /// Track role.
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// The track's motor driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the track's motor driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// The track's overload state.
    pub fn monitor(&self) -> &OverloadMonitor {
        &self.monitor
    }

    /// Attached boosters in attachment order.
    pub fn boosters(&self) -> &[Booster<D>] {
        &self.boosters
    }

    /// Queues a packet; it replaces any packet not yet picked up.
    ///
    /// # Errors
    /// [`DccError::PacketTooLong`] if `payload` exceeds five bytes.
    pub fn schedule_packet(&self, payload: &[u8], repeats: u8) -> Result<(), DccError> {
        self.slot.schedule(payload, repeats)
    }

    /// Waits until the previous packet has been picked up, then queues a packet.
    ///
    /// Busy-waits on the interrupt handler; never call it from interrupt context.
    ///
    /// # Errors
    /// [`DccError::PacketTooLong`] if `payload` exceeds five bytes.
    pub fn schedule_packet_blocking(&self, payload: &[u8], repeats: u8) -> Result<(), DccError> {
        let packet = Packet::with_checksum(payload, repeats)?;
        let _: Result<(), Infallible> = nb::block!(self.slot.poll_taken());
        self.slot.publish(packet);
        Ok(())
    }

    /// Returns `true` while a scheduled packet has not been picked up.
    pub fn is_packet_pending(&self) -> bool {
        self.slot.is_pending()
    }

    /// Filler packets sent since the last real packet, saturating.
    pub fn sent_resets_since_packet(&self) -> u8 {
        self.slot.sent_resets_since_packet()
    }

    /// Switches the track and all its boosters.
    pub fn set_power_mode(&mut self, mode: PowerMode) {
        self.monitor.set_mode(&mut self.driver, mode);
        for booster in self.boosters.iter_mut() {
            booster.monitor.set_mode(&mut booster.driver, mode);
        }
    }

    /// Power mode of the track driver.
    pub fn power_mode(&self) -> PowerMode {
        self.monitor.mode()
    }

    /// Returns `true` if the track driver has current sensing.
    pub fn can_measure_current(&self) -> bool {
        self.driver.can_measure_current()
    }

    /// Attaches a booster with the track's current power mode.
    ///
    /// # Errors
    /// - [`DccError::TooManyBoosters`] if the table is full
    /// - [`DccError::UnknownBooster`] if `id` is reserved for a track or already used
    pub fn add_booster(&mut self, id: u8, mut driver: D, sense: SenseConfig) -> Result<(), DccError> {
        if id == MAIN_TRACK_ID || id == PROG_TRACK_ID || self.has_booster(id) {
            return Err(DccError::UnknownBooster(id));
        }
        let mut monitor = OverloadMonitor::new(id, sense, self.overload);
        monitor.set_mode(&mut driver, self.monitor.mode());
        self.boosters
            .push(Booster { driver, monitor })
            .map_err(|_| DccError::TooManyBoosters)
    }

    /// Returns `true` if a booster with `id` is attached.
    pub fn has_booster(&self, id: u8) -> bool {
        self.boosters.iter().any(|b| b.id() == id)
    }

    /// Switches one booster.
    ///
    /// # Errors
    /// [`DccError::UnknownBooster`] if no booster has `id`.
    pub fn set_booster_power_mode(&mut self, id: u8, mode: PowerMode) -> Result<(), DccError> {
        let booster = self
            .boosters
            .iter_mut()
            .find(|b| b.id() == id)
            .ok_or(DccError::UnknownBooster(id))?;
        booster.monitor.set_mode(&mut booster.driver, mode);
        Ok(())
    }

    /// Power mode of one booster.
    ///
    /// # Errors
    /// [`DccError::UnknownBooster`] if no booster has `id`.
    pub fn booster_power_mode(&self, id: u8) -> Result<PowerMode, DccError> {
        self.boosters
            .iter()
            .find(|b| b.id() == id)
            .map(|b| b.monitor.mode())
            .ok_or(DccError::UnknownBooster(id))
    }

    /// Runs the overload check of the track and its boosters.
    ///
    /// The programming trip limit applies on the programming track unless an
    /// acknowledgement sequence is running, the track follows the main track
    /// signal, or it is boosted. While the ACK detector is timing a pulse the
    /// track driver itself is not sampled, for at most the longest accepted
    /// pulse duration.
    ///
    /// # Arguments
    /// - `ack_in_progress`: a programming sequence is waiting for an acknowledgement
    /// - `sync_main`: the programming track is driven with the main signal
    /// - `boosted`: the programming track is not current limited
    /// - `now_ms`: monotonic millisecond clock, wrapping
    pub fn check_power_overload(
        &mut self,
        ack_in_progress: bool,
        sync_main: bool,
        boosted: bool,
        now_ms: u32,
    ) -> PowerEvents {
        let use_prog_trip =
            self.kind == TrackKind::Programming && !ack_in_progress && !sync_main && !boosted;
        let mut events = PowerEvents::new();

        if !self.defer_for_ack_pulse(now_ms) {
            if let Some(event) = self.monitor.check(&mut self.driver, use_prog_trip, now_ms) {
                let _ = events.push(event);
            }
        }
        for booster in self.boosters.iter_mut() {
            if let Some(event) = booster.monitor.check(&mut booster.driver, use_prog_trip, now_ms) {
                let _ = events.push(event);
            }
        }
        events
    }

    /// Returns `true` if a pulse the ACK detector is timing may still be an
    /// acknowledgement at `now_ms`.
    ///
    /// The deferral lasts at most the longest accepted pulse, counted from the
    /// first check that saw the pulse, whether or not `get_ack` is still polled.
    fn defer_for_ack_pulse(&mut self, now_ms: u32) -> bool {
        let Some(ack) = self.ack.as_ref() else {
            return false;
        };
        let Some(start_us) = ack.pulse_start_us() else {
            self.ack_deferral = None;
            return false;
        };
        let seen_ms = match self.ack_deferral {
            Some((pulse, seen_ms)) if pulse == start_us => seen_ms,
            _ => {
                self.ack_deferral = Some((start_us, now_ms));
                now_ms
            }
        };
        let elapsed_us = now_ms.wrapping_sub(seen_ms).saturating_mul(1000);
        if elapsed_us > ack.config().max_pulse_us {
            diag_debug!("ack pulse outlasted {}us, checking overload", ack.config().max_pulse_us);
            return false;
        }
        true
    }

    fn ack_mut(&mut self) -> Result<&mut AckDetector, DccError> {
        self.ack.as_mut().ok_or(DccError::NotProgrammingTrack)
    }

    /// The acknowledgement detector, programming track only.
    pub fn ack_detector(&self) -> Option<&AckDetector> {
        self.ack.as_ref()
    }

    /// Reads the current and records it as the no-acknowledgement level.
    ///
    /// # Errors
    /// [`DccError::NotProgrammingTrack`] on the main track.
    pub fn set_ack_baseline(&mut self) -> Result<(), DccError> {
        let raw = self.driver.current_raw();
        self.ack_mut()?.set_baseline(raw);
        Ok(())
    }

    /// Opens the acknowledgement window at `now_us`.
    ///
    /// # Errors
    /// [`DccError::NotProgrammingTrack`] on the main track.
    pub fn set_ack_pending(&mut self, now_us: u32) -> Result<(), DccError> {
        self.ack_mut()?.arm(now_us);
        Ok(())
    }

    /// Samples the current and evaluates the acknowledgement window.
    ///
    /// Non-blocking; call once per poll until the answer is not
    /// [`AckResult::Waiting`].
    ///
    /// # Errors
    /// [`DccError::NotProgrammingTrack`] on the main track.
    pub fn get_ack(&mut self, now_us: u32) -> Result<AckResult, DccError> {
        let ack = self.ack.as_mut().ok_or(DccError::NotProgrammingTrack)?;
        if !ack.is_pending() {
            return Ok(ack.sample(0, now_us));
        }
        let raw = self.driver.current_raw();
        Ok(ack.sample(raw, now_us))
    }

    /// Sets the acknowledgement threshold above the baseline, in milliamps.
    ///
    /// # Errors
    /// [`DccError::NotProgrammingTrack`] on the main track.
    pub fn set_ack_limit(&mut self, ma: u32) -> Result<(), DccError> {
        self.ack_mut()?.set_limit_ma(ma);
        Ok(())
    }

    /// Sets the shortest accepted acknowledgement pulse, in microseconds.
    ///
    /// # Errors
    /// [`DccError::NotProgrammingTrack`] on the main track.
    pub fn set_min_ack_pulse_duration(&mut self, us: u32) -> Result<(), DccError> {
        self.ack_mut()?.set_min_pulse_us(us);
        Ok(())
    }

    /// Sets the longest accepted acknowledgement pulse, in microseconds.
    ///
    /// # Errors
    /// [`DccError::NotProgrammingTrack`] on the main track.
    pub fn set_max_ack_pulse_duration(&mut self, us: u32) -> Result<(), DccError> {
        self.ack_mut()?.set_max_pulse_us(us);
        Ok(())
    }

    /// Flags the track to be switched off by [`do_auto_power_off`](Self::do_auto_power_off).
    pub fn set_auto_power_off(&mut self, auto_power_off: bool) {
        self.auto_power_off = auto_power_off;
    }

    /// Returns `true` if the track is flagged for auto power-off.
    pub fn auto_power_off(&self) -> bool {
        self.auto_power_off
    }

    /// Switches the track off if it was flagged, and clears the flag.
    pub fn do_auto_power_off(&mut self) {
        if self.auto_power_off {
            self.set_power_mode(PowerMode::Off);
            self.auto_power_off = false;
        }
    }

    /// Writes one `<G ...>` line for the track and each booster.
    pub fn describe_gauges<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        self.monitor.describe_gauge(out)?;
        for booster in self.boosters.iter() {
            booster.monitor.describe_gauge(out)?;
        }
        Ok(())
    }

    /// Writes the last raw reading of the track and each booster, space separated.
    pub fn write_raw_gauges<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        self.monitor.write_raw_current(out)?;
        for booster in self.boosters.iter() {
            out.write_char(' ')?;
            booster.monitor.write_raw_current(out)?;
        }
        Ok(())
    }
}

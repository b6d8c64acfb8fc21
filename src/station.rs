//! Top-level command station object.
//!
//! The station is split along the interrupt boundary:
//!
//! - [`StationShared`] holds the only state both contexts touch: the two
//!   packet slots and the "programming track follows main" flag. It is
//!   `const`-constructible so that it can live in a `static`.
//! - [`Waveform`](crate::wave::Waveform) borrows it on the interrupt side.
//! - [`CommandStation`] borrows it on the mainline side and owns the track
//!   controllers, their drivers and all overload and ACK state.
//!
//! ## Example
//!
//! ```rust
//! use dccwave::config::StationConfig;
//! use dccwave::mock::{MockMotorDriver, RecordingSignal};
//! use dccwave::power::PowerMode;
//! use dccwave::station::{CommandStation, StationShared};
//! use dccwave::wave::Waveform;
//!
//! static SHARED: StationShared = StationShared::new();
//!
//! let mut waveform = Waveform::new(&SHARED, RecordingSignal::default(), Some(RecordingSignal::default()));
//! let mut station = CommandStation::new(
//!     &SHARED,
//!     MockMotorDriver::new(),
//!     Some(MockMotorDriver::new()),
//!     StationConfig::default(),
//! );
//!
//! station.main_mut().set_power_mode(PowerMode::On);
//! station.main().schedule_packet(&[0x03, 0x3F, 0x10], 3).unwrap();
//! for _ in 0..1000 {
//!     waveform.tick();
//! }
//! let mut log = String::new();
//! station.poll(false, 0, &mut log).unwrap();
//! assert!(log.is_empty());
//! ```

use core::fmt;
use portable_atomic::{AtomicBool, Ordering};

use crate::config::StationConfig;
use crate::consts::{MAIN_TRACK_ID, PROG_TRACK_ID};
use crate::driver::MotorDriver;
use crate::error::DccError;
use crate::power::PowerMode;
use crate::scheduler::PacketSlot;
use crate::track::TrackController;
use crate::wave::TrackKind;

/// State shared between the mainline loop and the timer interrupt.
#[derive(Debug, Default)]
pub struct StationShared {
    pub(crate) main: PacketSlot,
    pub(crate) prog: PacketSlot,
    pub(crate) prog_sync_main: AtomicBool,
}

impl StationShared {
    /// Creates the shared state with empty slots.
    pub const fn new() -> Self {
        Self {
            main: PacketSlot::new(),
            prog: PacketSlot::new(),
            prog_sync_main: AtomicBool::new(false),
        }
    }

    /// Main track packet slot.
    pub fn main(&self) -> &PacketSlot {
        &self.main
    }

    /// Programming track packet slot.
    pub fn prog(&self) -> &PacketSlot {
        &self.prog
    }

    /// Drives the programming track with the main track signal when `true`.
    pub fn set_prog_sync_main(&self, sync: bool) {
        self.prog_sync_main.store(sync, Ordering::Relaxed);
    }

    /// Returns `true` while the programming track follows the main signal.
    pub fn prog_sync_main(&self) -> bool {
        self.prog_sync_main.load(Ordering::Relaxed)
    }
}

/// Mainline-side command station: main track, optional programming track.
#[derive(Debug)]
pub struct CommandStation<'a, D: MotorDriver> {
    shared: &'a StationShared,
    main: TrackController<'a, D>,
    prog: Option<TrackController<'a, D>>,
    prog_boosted: bool,
    gauge_interval_ms: u32,
    last_gauge_ms: u32,
}

impl<'a, D: MotorDriver> CommandStation<'a, D> {
    /// Creates the station with every track switched off.
    ///
    /// # Arguments
    /// - `shared`: the state shared with the [`Waveform`](crate::wave::Waveform)
    /// - `main_driver`: main track motor driver
    /// - `prog_driver`: programming track motor driver, if there is one
    /// - `config`: scaling, overload and ACK settings
    pub fn new(
        shared: &'a StationShared,
        main_driver: D,
        prog_driver: Option<D>,
        config: StationConfig,
    ) -> Self {
        let main = TrackController::new(
            TrackKind::Main,
            &shared.main,
            main_driver,
            config.main_sense,
            config.overload,
            config.ack,
        );
        let prog = prog_driver.map(|driver| {
            TrackController::new(
                TrackKind::Programming,
                &shared.prog,
                driver,
                config.prog_sense,
                config.overload,
                config.ack,
            )
        });
        Self {
            shared,
            main,
            prog,
            prog_boosted: false,
            gauge_interval_ms: config.gauge_interval_ms,
            last_gauge_ms: 0,
        }
    }

    /// Main track controller.
    pub fn main(&self) -> &TrackController<'a, D> {
        &self.main
    }

    /// Mutable main track controller.
    pub fn main_mut(&mut self) -> &mut TrackController<'a, D> {
        &mut self.main
    }

    /// Programming track controller, if present.
    pub fn prog(&self) -> Option<&TrackController<'a, D>> {
        self.prog.as_ref()
    }

    /// Mutable programming track controller, if present.
    pub fn prog_mut(&mut self) -> Option<&mut TrackController<'a, D>> {
        self.prog.as_mut()
    }

    /// Drives the programming track with the main signal and lifts its prog trip limit.
    pub fn set_prog_sync_main(&mut self, sync: bool) {
        diag_info!("prog track sync main={}", sync);
        self.shared.set_prog_sync_main(sync);
    }

    /// Returns `true` while the programming track follows the main signal.
    pub fn prog_sync_main(&self) -> bool {
        self.shared.prog_sync_main()
    }

    /// Lifts the programming track trip limit without joining it to main.
    pub fn set_prog_boosted(&mut self, boosted: bool) {
        self.prog_boosted = boosted;
    }

    /// Returns `true` while the programming track is not current limited.
    pub fn prog_boosted(&self) -> bool {
        self.prog_boosted
    }

    fn track_by_id(&mut self, id: u8) -> Option<&mut TrackController<'a, D>> {
        if id == MAIN_TRACK_ID || self.main.has_booster(id) {
            return Some(&mut self.main);
        }
        match self.prog.as_mut() {
            Some(prog) if id == PROG_TRACK_ID || prog.has_booster(id) => Some(prog),
            _ => None,
        }
    }

    /// Switches a track or a booster by id.
    ///
    /// Id 0 is the main track and 255 the programming track; track ids
    /// switch the track together with its boosters.
    ///
    /// # Errors
    /// [`DccError::UnknownBooster`] if nothing has `id`.
    pub fn set_booster_power_mode(&mut self, id: u8, mode: PowerMode) -> Result<(), DccError> {
        let track = self.track_by_id(id).ok_or(DccError::UnknownBooster(id))?;
        if id == MAIN_TRACK_ID || id == PROG_TRACK_ID {
            track.set_power_mode(mode);
            Ok(())
        } else {
            track.set_booster_power_mode(id, mode)
        }
    }

    /// Power mode of a track or booster by id.
    ///
    /// # Errors
    /// [`DccError::UnknownBooster`] if nothing has `id`.
    pub fn booster_power_mode(&self, id: u8) -> Result<PowerMode, DccError> {
        if id == MAIN_TRACK_ID {
            return Ok(self.main.power_mode());
        }
        if self.main.has_booster(id) {
            return self.main.booster_power_mode(id);
        }
        match self.prog.as_ref() {
            Some(prog) if id == PROG_TRACK_ID => Ok(prog.power_mode()),
            Some(prog) => prog.booster_power_mode(id),
            None => Err(DccError::UnknownBooster(id)),
        }
    }

    /// One pass of the mainline power loop.
    ///
    /// Runs the overload checks of both tracks, writes every resulting
    /// [`PowerEvent`](crate::power::PowerEvent) as a line to `out`, and emits
    /// the periodic raw gauge report if one is configured.
    ///
    /// # Arguments
    /// - `ack_manager_active`: a programming sequence is waiting for an acknowledgement
    /// - `now_ms`: monotonic millisecond clock, wrapping
    /// - `out`: diagnostic sink
    pub fn poll<W: fmt::Write>(
        &mut self,
        ack_manager_active: bool,
        now_ms: u32,
        out: &mut W,
    ) -> fmt::Result {
        let sync_main = self.shared.prog_sync_main();

        for event in self.main.check_power_overload(false, false, false, now_ms) {
            writeln!(out, "{event}")?;
        }
        if let Some(prog) = self.prog.as_mut() {
            for event in
                prog.check_power_overload(ack_manager_active, sync_main, self.prog_boosted, now_ms)
            {
                writeln!(out, "{event}")?;
            }
        }

        if self.gauge_interval_ms > 0
            && now_ms.wrapping_sub(self.last_gauge_ms) >= self.gauge_interval_ms
        {
            self.last_gauge_ms = now_ms;
            self.list_raw_gauges(out)?;
        }
        Ok(())
    }

    /// Writes one `<G id LABEL factor trip mA>` line per current-sensing driver.
    pub fn describe_gauges<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        self.main.describe_gauges(out)?;
        if let Some(prog) = self.prog.as_ref() {
            prog.describe_gauges(out)?;
        }
        Ok(())
    }

    /// Writes `<g r1 r2 ...>` with the last raw reading of every driver, `X` for overload.
    pub fn list_raw_gauges<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        out.write_str("<g ")?;
        self.main.write_raw_gauges(out)?;
        if let Some(prog) = self.prog.as_ref() {
            out.write_char(' ')?;
            prog.write_raw_gauges(out)?;
        }
        out.write_str(">\n")
    }
}

//! Track power switching and overload protection.
//!
//! Every current-sensing driver (track or booster) has an [`OverloadMonitor`]
//! which is polled from the mainline loop. The monitor throttles itself to one
//! sample per interval and runs a three-state machine:
//!
//! ```text
//!   OFF --(command)--> ON --(current >= trip)--> OVERLOAD
//!                      ^                            |
//!                      +-------(retry delay)--------+
//! ```
//!
//! ## Back-off
//!
//! Each trip switches the driver off for the current retry delay, then
//! doubles the delay for the next trip, capped at
//! [`OverloadConfig::overload_wait_max_ms`]. Once
//! [`OverloadConfig::good_samples`] consecutive good samples have been seen
//! the delay drops back to its minimum.
//!
//! ## Units
//!
//! Trip comparisons use raw ADC units (offset-corrected); milliamps are only
//! computed for diagnostics. All timestamps are wrapping `u32` milliseconds.

use core::fmt;

use crate::config::{OverloadConfig, SenseConfig};
use crate::consts::PROG_TRACK_ID;
use crate::driver::MotorDriver;

/// Power state of a track or booster output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PowerMode {
    /// Output switched off by command.
    #[default]
    Off,
    /// Output energised.
    On,
    /// Output switched off after an overload, waiting to retry.
    Overload,
}

impl PowerMode {
    /// Upper-case name used in diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            PowerMode::Off => "OFF",
            PowerMode::On => "ON",
            PowerMode::Overload => "OVERLOAD",
        }
    }
}

/// Diagnostic record of a power mode change made by the overload monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerEvent {
    /// Driver id: 0 for main, [`PROG_TRACK_ID`] for the programming track,
    /// otherwise the booster id.
    pub booster_id: u8,
    /// Mode before the change.
    pub from: PowerMode,
    /// Mode after the change.
    pub to: PowerMode,
    /// Raw current sample that caused the change.
    pub current_raw: i32,
    /// The same sample converted to milliamps.
    pub current_ma: u32,
    /// Raw trip threshold in force.
    pub trip_raw: i32,
    /// Trip threshold in milliamps.
    pub trip_ma: u32,
    /// Time until the next sample, in milliseconds.
    pub off_time_ms: u32,
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            PowerMode::Overload => {
                if self.booster_id == PROG_TRACK_ID {
                    f.write_str("*** PROG TRACK")?;
                } else {
                    write!(f, "*** TRACK {}", self.booster_id)?;
                }
                write!(
                    f,
                    " OVERLOAD current={}/{}mA max={}/{}mA offtime={}mS ***",
                    self.current_raw, self.current_ma, self.trip_raw, self.trip_ma, self.off_time_ms
                )
            }
            to => {
                if self.booster_id == PROG_TRACK_ID {
                    f.write_str("PROG TRACK")?;
                } else {
                    write!(f, "TRACK {}", self.booster_id)?;
                }
                write!(f, " POWER {} after {}", to.as_str(), self.from.as_str())
            }
        }
    }
}

/// Overload sample state for one current-sensing driver.
#[derive(Debug, Clone)]
pub struct OverloadMonitor {
    booster_id: u8,
    sense: SenseConfig,
    config: OverloadConfig,
    mode: PowerMode,
    trip_raw: i32,
    prog_trip_raw: i32,
    last_current: i32,
    last_sample_ms: u32,
    sample_delay_ms: u32,
    overload_wait_ms: u32,
    good_samples: u8,
}

impl OverloadMonitor {
    /// Creates a monitor for a driver that starts switched off.
    ///
    /// # Arguments
    /// - `booster_id`: id reported in diagnostics
    /// - `sense`: scale factor and trip limits of the driver
    /// - `config`: sampling cadence and back-off limits
    pub fn new(booster_id: u8, sense: SenseConfig, config: OverloadConfig) -> Self {
        Self {
            booster_id,
            trip_raw: sense.ma_to_raw(sense.trip_ma),
            prog_trip_raw: sense.ma_to_raw(sense.prog_trip_ma),
            sense,
            mode: PowerMode::Off,
            last_current: 0,
            last_sample_ms: 0,
            sample_delay_ms: 0,
            overload_wait_ms: config.overload_wait_min_ms,
            good_samples: 0,
            config,
        }
    }

    /// Driver id reported in diagnostics.
    pub fn booster_id(&self) -> u8 {
        self.booster_id
    }

    /// Current power mode.
    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    /// Last raw current sample.
    pub fn last_current(&self) -> i32 {
        self.last_current
    }

    /// Off-time that the next overload will use, in milliseconds.
    pub fn retry_delay_ms(&self) -> u32 {
        self.overload_wait_ms
    }

    /// Scale factor and limits of the driver.
    pub fn sense(&self) -> &SenseConfig {
        &self.sense
    }

    /// Raw trip threshold: the programming limit when `use_prog_trip`, else the track limit.
    pub fn trip_raw(&self, use_prog_trip: bool) -> i32 {
        if use_prog_trip {
            self.prog_trip_raw
        } else {
            self.trip_raw
        }
    }

    /// Switches the driver to `mode` by command.
    ///
    /// Only [`PowerMode::On`] energises the output.
    pub fn set_mode<D: MotorDriver>(&mut self, driver: &mut D, mode: PowerMode) {
        if mode != self.mode {
            diag_info!(
                "driver {} power {} -> {}",
                self.booster_id,
                self.mode.as_str(),
                mode.as_str()
            );
        }
        self.apply(driver, mode);
    }

    fn apply<D: MotorDriver>(&mut self, driver: &mut D, mode: PowerMode) {
        self.mode = mode;
        driver.set_power(mode == PowerMode::On);
    }

    /// Takes a current sample if the sampling interval has elapsed.
    ///
    /// # Arguments
    /// - `driver`: the driver this monitor protects
    /// - `use_prog_trip`: compare against the programming track limit
    /// - `now_ms`: monotonic millisecond clock, wrapping
    ///
    /// # Returns
    /// A [`PowerEvent`] when the monitor changed the power mode.
    pub fn check<D: MotorDriver>(
        &mut self,
        driver: &mut D,
        use_prog_trip: bool,
        now_ms: u32,
    ) -> Option<PowerEvent> {
        if !driver.can_measure_current() {
            return None;
        }
        if now_ms.wrapping_sub(self.last_sample_ms) < self.sample_delay_ms {
            return None;
        }
        self.last_sample_ms = now_ms;

        let trip_raw = self.trip_raw(use_prog_trip);
        self.last_current = driver.current_raw();

        match self.mode {
            PowerMode::Off => {
                self.sample_delay_ms = self.config.sample_off_ms;
                None
            }
            PowerMode::On => {
                // Negative readings flag an active fault pin.
                if self.last_current < 0 {
                    return self.fault(driver, trip_raw);
                }
                if self.last_current < trip_raw {
                    self.sample_delay_ms = self.config.sample_on_ms;
                    if self.good_samples < self.config.good_samples {
                        self.good_samples += 1;
                    }
                    if self.good_samples >= self.config.good_samples {
                        self.overload_wait_ms = self.config.overload_wait_min_ms;
                    }
                    return None;
                }
                Some(self.trip(driver, trip_raw))
            }
            PowerMode::Overload => {
                self.apply(driver, PowerMode::On);
                self.sample_delay_ms = self.config.sample_on_ms;
                let event = self.event(PowerMode::Overload, PowerMode::On, trip_raw);
                diag_info!("driver {} power retry after overload", event.booster_id);
                Some(event)
            }
        }
    }

    fn fault<D: MotorDriver>(&mut self, driver: &mut D, trip_raw: i32) -> Option<PowerEvent> {
        let current = self.last_current.saturating_neg();
        if self.config.common_fault_pin && current <= trip_raw {
            // A shared fault line may have been pulled by another output.
            self.apply(driver, PowerMode::Overload);
            self.apply(driver, PowerMode::On);
            self.last_current = current;
            self.sample_delay_ms = self.config.sample_on_ms;
            diag_warn!("driver {} common fault pin active, power toggled", self.booster_id);
            return None;
        }
        diag_warn!("driver {} fault pin active", self.booster_id);
        self.last_current = current.max(trip_raw);
        Some(self.trip(driver, trip_raw))
    }

    fn trip<D: MotorDriver>(&mut self, driver: &mut D, trip_raw: i32) -> PowerEvent {
        self.apply(driver, PowerMode::Overload);
        self.good_samples = 0;
        self.sample_delay_ms = self.overload_wait_ms;
        self.overload_wait_ms = self
            .overload_wait_ms
            .saturating_mul(2)
            .min(self.config.overload_wait_max_ms);

        let event = self.event(PowerMode::On, PowerMode::Overload, trip_raw);
        diag_warn!(
            "driver {} OVERLOAD current={}/{}mA max={}/{}mA offtime={}ms",
            event.booster_id,
            event.current_raw,
            event.current_ma,
            event.trip_raw,
            event.trip_ma,
            event.off_time_ms
        );
        event
    }

    fn event(&self, from: PowerMode, to: PowerMode, trip_raw: i32) -> PowerEvent {
        PowerEvent {
            booster_id: self.booster_id,
            from,
            to,
            current_raw: self.last_current,
            current_ma: self.sense.raw_to_ma(self.last_current.unsigned_abs()),
            trip_raw,
            trip_ma: self.sense.raw_to_ma(trip_raw.unsigned_abs()),
            off_time_ms: self.sample_delay_ms,
        }
    }

    /// Writes the `<G ...>` gauge description line for this driver.
    ///
    /// Field order: id, label, scale factor, trip milliamps.
    pub fn describe_gauge<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        if self.booster_id == PROG_TRACK_ID {
            writeln!(
                out,
                "<G 0 PROG {:.2} {} mA>",
                self.sense.sense_factor, self.sense.trip_ma
            )
        } else {
            writeln!(
                out,
                "<G {} TRACK{} {:.2} {} mA>",
                u16::from(self.booster_id) + 1,
                self.booster_id,
                self.sense.sense_factor,
                self.sense.trip_ma
            )
        }
    }

    /// Writes the last raw reading, or `X` while in overload.
    pub fn write_raw_current<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        if self.mode == PowerMode::Overload {
            out.write_str("X")
        } else {
            write!(out, "{}", self.last_current)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMotorDriver;
    use heapless::String;

    const SENSE: SenseConfig = SenseConfig {
        sense_factor: 2.0,
        trip_ma: 2000,
        prog_trip_ma: 250,
    };

    fn monitor() -> (OverloadMonitor, MockMotorDriver) {
        let mut driver = MockMotorDriver::new();
        let mut monitor = OverloadMonitor::new(0, SENSE, OverloadConfig::default());
        monitor.set_mode(&mut driver, PowerMode::On);
        (monitor, driver)
    }

    #[test]
    fn test_trip_thresholds_in_raw_units() {
        let (monitor, _) = monitor();
        assert_eq!(monitor.trip_raw(false), 1000);
        assert_eq!(monitor.trip_raw(true), 125);
    }

    #[test]
    fn test_set_mode_switches_power() {
        let (mut monitor, mut driver) = monitor();
        assert!(driver.power);
        monitor.set_mode(&mut driver, PowerMode::Off);
        assert!(!driver.power);
        assert_eq!(monitor.mode(), PowerMode::Off);
    }

    #[test]
    fn test_sampling_is_throttled() {
        let (mut monitor, mut driver) = monitor();
        driver.current = 10;
        assert!(monitor.check(&mut driver, false, 0).is_none());
        assert_eq!(driver.reads, 1);
        assert!(monitor.check(&mut driver, false, 50).is_none());
        assert_eq!(driver.reads, 1);
        assert!(monitor.check(&mut driver, false, 100).is_none());
        assert_eq!(driver.reads, 2);
    }

    #[test]
    fn test_off_mode_samples_slowly() {
        let mut driver = MockMotorDriver::new();
        let mut monitor = OverloadMonitor::new(0, SENSE, OverloadConfig::default());
        assert!(monitor.check(&mut driver, false, 0).is_none());
        assert!(monitor.check(&mut driver, false, 999).is_none());
        assert_eq!(driver.reads, 1);
        assert!(monitor.check(&mut driver, false, 1000).is_none());
        assert_eq!(driver.reads, 2);
    }

    #[test]
    fn test_overload_trips_and_retries() {
        let (mut monitor, mut driver) = monitor();
        driver.current = 1000;
        let event = monitor.check(&mut driver, false, 0).unwrap();
        assert_eq!(event.to, PowerMode::Overload);
        assert_eq!(event.current_ma, 2000);
        assert_eq!(event.off_time_ms, 20);
        assert!(!driver.power);

        // Still within the off time.
        assert!(monitor.check(&mut driver, false, 19).is_none());
        let retry = monitor.check(&mut driver, false, 20).unwrap();
        assert_eq!((retry.from, retry.to), (PowerMode::Overload, PowerMode::On));
        assert!(driver.power);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap_and_resets() {
        let (mut monitor, mut driver) = monitor();
        let mut now = 0u32;
        driver.current = 5000;

        let mut off_times = Vec::new();
        for _ in 0..12 {
            let trip = monitor.check(&mut driver, false, now).unwrap();
            off_times.push(trip.off_time_ms);
            now = now.wrapping_add(trip.off_time_ms);
            let retry = monitor.check(&mut driver, false, now).unwrap();
            assert_eq!(retry.to, PowerMode::On);
            now = now.wrapping_add(100);
        }
        assert_eq!(&off_times[..4], &[20, 40, 80, 160]);
        assert_eq!(*off_times.last().unwrap(), 10_000);
        assert!(off_times.iter().all(|&t| t <= 10_000));

        driver.current = 0;
        for _ in 0..99 {
            assert!(monitor.check(&mut driver, false, now).is_none());
            now += 100;
        }
        assert_eq!(monitor.retry_delay_ms(), 10_000);
        assert!(monitor.check(&mut driver, false, now).is_none());
        assert_eq!(monitor.retry_delay_ms(), 20);
    }

    #[test]
    fn test_prog_trip_is_lower() {
        let (mut monitor, mut driver) = monitor();
        driver.current = 200;
        assert!(monitor.check(&mut driver, false, 0).is_none());
        let event = monitor.check(&mut driver, true, 100).unwrap();
        assert_eq!(event.trip_raw, 125);
        assert_eq!(event.trip_ma, 250);
    }

    #[test]
    fn test_fault_pin_reading_trips() {
        let (mut small, mut small_driver) = monitor();
        let (mut large, mut large_driver) = monitor();

        small_driver.current = -1;
        let event = small.check(&mut small_driver, false, 0).unwrap();
        assert_eq!(event.to, PowerMode::Overload);
        // Reported as at least the trip value.
        assert_eq!(event.current_raw, 1000);
        assert_eq!(event.current_ma, 2000);

        large_driver.current = -1500;
        let event = large.check(&mut large_driver, false, 0).unwrap();
        assert_eq!(event.current_raw, 1500);
    }

    #[test]
    fn test_common_fault_pin_toggles_power() {
        let mut driver = MockMotorDriver::new();
        let config = OverloadConfig::default().with_common_fault_pin(true);
        let mut monitor = OverloadMonitor::new(0, SENSE, config);
        monitor.set_mode(&mut driver, PowerMode::On);
        let pulses = driver.brake_pulses;

        driver.current = -200;
        assert!(monitor.check(&mut driver, false, 0).is_none());
        assert_eq!(monitor.mode(), PowerMode::On);
        assert!(driver.power);
        assert_eq!(driver.brake_pulses, pulses + 1);
        assert_eq!(monitor.last_current(), 200);

        // Above the trip value the fault is this output's own.
        driver.current = -1200;
        let event = monitor.check(&mut driver, false, 100).unwrap();
        assert_eq!(event.to, PowerMode::Overload);
        assert_eq!(event.current_raw, 1200);
        assert!(!driver.power);
    }

    #[test]
    fn test_sampling_survives_clock_wraparound() {
        let (mut monitor, mut driver) = monitor();
        assert!(monitor.check(&mut driver, false, u32::MAX - 10).is_none());
        assert_eq!(driver.reads, 1);
        assert!(monitor.check(&mut driver, false, 50).is_none());
        assert_eq!(driver.reads, 1);
        assert!(monitor.check(&mut driver, false, 89).is_none());
        assert_eq!(driver.reads, 2);
    }

    #[test]
    fn test_no_current_sense_is_never_sampled() {
        let (mut monitor, mut driver) = monitor();
        driver.can_measure = false;
        driver.current = 10_000;
        assert!(monitor.check(&mut driver, false, 0).is_none());
        assert_eq!(driver.reads, 0);
        assert_eq!(monitor.mode(), PowerMode::On);
    }

    #[test]
    fn test_gauge_lines() {
        let (monitor, _) = monitor();
        let mut out: String<64> = String::new();
        monitor.describe_gauge(&mut out).unwrap();
        assert_eq!(out.as_str(), "<G 1 TRACK0 2.00 2000 mA>\n");

        let prog = OverloadMonitor::new(PROG_TRACK_ID, SENSE, OverloadConfig::default());
        out.clear();
        prog.describe_gauge(&mut out).unwrap();
        assert_eq!(out.as_str(), "<G 0 PROG 2.00 2000 mA>\n");
    }

    #[test]
    fn test_raw_current_shows_x_in_overload() {
        let (mut monitor, mut driver) = monitor();
        driver.current = 42;
        let _ = monitor.check(&mut driver, false, 0);
        let mut out: String<16> = String::new();
        monitor.write_raw_current(&mut out).unwrap();
        assert_eq!(out.as_str(), "42");

        driver.current = 4000;
        let _ = monitor.check(&mut driver, false, 100);
        out.clear();
        monitor.write_raw_current(&mut out).unwrap();
        assert_eq!(out.as_str(), "X");
    }

    #[test]
    fn test_event_display() {
        let (mut monitor, mut driver) = monitor();
        driver.current = 1500;
        let event = monitor.check(&mut driver, false, 0).unwrap();
        let mut out: String<96> = String::new();
        fmt::write(&mut out, format_args!("{event}")).unwrap();
        assert_eq!(
            out.as_str(),
            "*** TRACK 0 OVERLOAD current=1500/3000mA max=1000/2000mA offtime=20mS ***"
        );
    }
}

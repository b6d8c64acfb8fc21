//! Runtime configuration for drivers, overload sampling and ACK detection.
//!
//! Every struct has a [`Default`] built from [`crate::consts`] and a set of
//! `with_*` builders, so a board definition only spells out what differs:
//!
//! ```rust
//! use dccwave::config::{SenseConfig, StationConfig};
//!
//! let config = StationConfig::default()
//!     .with_main_sense(SenseConfig::default().with_sense_factor(2.99).with_trip_ma(2000))
//!     .with_gauge_interval_ms(1000);
//! assert_eq!(config.main_sense.trip_ma, 2000);
//! ```

use crate::consts::{
    ACK_LIMIT_MA, ACK_TIMEOUT_MS, MAX_ACK_PULSE_US, MIN_ACK_PULSE_US, POWER_GOOD_SAMPLES,
    POWER_SAMPLE_OFF_WAIT_MS, POWER_SAMPLE_ON_WAIT_MS, POWER_SAMPLE_OVERLOAD_WAIT_MAX_MS,
    POWER_SAMPLE_OVERLOAD_WAIT_MS, TRIP_CURRENT_PROG_MA,
};
use libm::roundf;

/// Current-sense scaling and trip limits of one motor driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SenseConfig {
    /// Milliamps per raw ADC unit.
    pub sense_factor: f32,
    /// Trip current of the driver in milliamps.
    pub trip_ma: u32,
    /// Trip current used when the driver feeds a programming track, in milliamps.
    pub prog_trip_ma: u32,
}

impl Default for SenseConfig {
    fn default() -> Self {
        // Arduino motor shield: 1 A ≈ 2.99 mA per unit on a 10-bit ADC.
        Self {
            sense_factor: 2.99,
            trip_ma: 2000,
            prog_trip_ma: TRIP_CURRENT_PROG_MA,
        }
    }
}

impl SenseConfig {
    /// Sets the milliamps per raw unit.
    pub fn with_sense_factor(mut self, sense_factor: f32) -> Self {
        self.sense_factor = sense_factor;
        self
    }

    /// Sets the trip current in milliamps.
    pub fn with_trip_ma(mut self, trip_ma: u32) -> Self {
        self.trip_ma = trip_ma;
        self
    }

    /// Sets the programming track trip current in milliamps.
    pub fn with_prog_trip_ma(mut self, prog_trip_ma: u32) -> Self {
        self.prog_trip_ma = prog_trip_ma;
        self
    }

    /// Converts milliamps to raw ADC units, rounding to nearest.
    pub fn ma_to_raw(&self, ma: u32) -> i32 {
        if self.sense_factor <= 0.0 {
            return i32::MAX;
        }
        roundf(ma as f32 / self.sense_factor) as i32
    }

    /// Converts raw ADC units to milliamps, rounding to nearest.
    pub fn raw_to_ma(&self, raw: u32) -> u32 {
        roundf(raw as f32 * self.sense_factor) as u32
    }
}

/// Sampling cadence and back-off limits of the overload monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverloadConfig {
    /// Sampling interval while the output is on, in milliseconds.
    pub sample_on_ms: u32,
    /// Sampling interval while the output is off, in milliseconds.
    pub sample_off_ms: u32,
    /// First off-time after an overload, in milliseconds.
    pub overload_wait_min_ms: u32,
    /// Ceiling of the doubling off-time, in milliseconds.
    pub overload_wait_max_ms: u32,
    /// Good samples in a row after which the off-time resets.
    pub good_samples: u8,
    /// The fault pin is shared between outputs. A fault reading below the
    /// trip value then power cycles the output instead of tripping it.
    pub common_fault_pin: bool,
}

impl Default for OverloadConfig {
    fn default() -> Self {
        Self {
            sample_on_ms: POWER_SAMPLE_ON_WAIT_MS,
            sample_off_ms: POWER_SAMPLE_OFF_WAIT_MS,
            overload_wait_min_ms: POWER_SAMPLE_OVERLOAD_WAIT_MS,
            overload_wait_max_ms: POWER_SAMPLE_OVERLOAD_WAIT_MAX_MS,
            good_samples: POWER_GOOD_SAMPLES,
            common_fault_pin: false,
        }
    }
}

impl OverloadConfig {
    /// Sets the sampling interval while on.
    pub fn with_sample_on_ms(mut self, ms: u32) -> Self {
        self.sample_on_ms = ms;
        self
    }

    /// Sets the sampling interval while off.
    pub fn with_sample_off_ms(mut self, ms: u32) -> Self {
        self.sample_off_ms = ms;
        self
    }

    /// Sets the minimum and maximum overload off-time.
    pub fn with_overload_wait_ms(mut self, min_ms: u32, max_ms: u32) -> Self {
        self.overload_wait_min_ms = min_ms;
        self.overload_wait_max_ms = max_ms.max(min_ms);
        self
    }

    /// Sets how many good samples reset the off-time.
    pub fn with_good_samples(mut self, good_samples: u8) -> Self {
        self.good_samples = good_samples;
        self
    }

    /// Marks the fault pin as shared between outputs.
    pub fn with_common_fault_pin(mut self, common: bool) -> Self {
        self.common_fault_pin = common;
        self
    }
}

/// Programming track acknowledgement detection parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckConfig {
    /// Current rise above the baseline that counts as a pulse, in milliamps.
    pub limit_ma: u32,
    /// Shortest accepted pulse, in microseconds.
    pub min_pulse_us: u32,
    /// Longest accepted pulse, in microseconds.
    pub max_pulse_us: u32,
    /// Detection window after arming, in milliseconds.
    pub timeout_ms: u32,
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            limit_ma: ACK_LIMIT_MA,
            min_pulse_us: MIN_ACK_PULSE_US,
            max_pulse_us: MAX_ACK_PULSE_US,
            timeout_ms: ACK_TIMEOUT_MS,
        }
    }
}

impl AckConfig {
    /// Sets the pulse threshold in milliamps.
    pub fn with_limit_ma(mut self, limit_ma: u32) -> Self {
        self.limit_ma = limit_ma;
        self
    }

    /// Sets the accepted pulse duration window in microseconds.
    pub fn with_pulse_window_us(mut self, min_us: u32, max_us: u32) -> Self {
        self.min_pulse_us = min_us;
        self.max_pulse_us = max_us;
        self
    }

    /// Sets the detection window in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Top-level configuration of a [`CommandStation`](crate::station::CommandStation).
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct StationConfig {
    /// Main track driver scaling.
    pub main_sense: SenseConfig,
    /// Programming track driver scaling.
    pub prog_sense: SenseConfig,
    /// Overload sampling policy, shared by all drivers.
    pub overload: OverloadConfig,
    /// ACK detection parameters for the programming track.
    pub ack: AckConfig,
    /// Interval of the periodic `<g ...>` raw gauge report; `0` disables it.
    pub gauge_interval_ms: u32,
}

impl StationConfig {
    /// Sets the main track driver scaling.
    pub fn with_main_sense(mut self, sense: SenseConfig) -> Self {
        self.main_sense = sense;
        self
    }

    /// Sets the programming track driver scaling.
    pub fn with_prog_sense(mut self, sense: SenseConfig) -> Self {
        self.prog_sense = sense;
        self
    }

    /// Sets the overload sampling policy.
    pub fn with_overload(mut self, overload: OverloadConfig) -> Self {
        self.overload = overload;
        self
    }

    /// Sets the ACK detection parameters.
    pub fn with_ack(mut self, ack: AckConfig) -> Self {
        self.ack = ack;
        self
    }

    /// Sets the raw gauge report interval.
    pub fn with_gauge_interval_ms(mut self, ms: u32) -> Self {
        self.gauge_interval_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion_rounds() {
        let sense = SenseConfig::default().with_sense_factor(2.99);
        assert_eq!(sense.ma_to_raw(250), 84);
        assert_eq!(sense.raw_to_ma(84), 251);
        assert_eq!(sense.ma_to_raw(0), 0);
    }

    #[test]
    fn test_zero_factor_never_trips() {
        let sense = SenseConfig::default().with_sense_factor(0.0);
        assert_eq!(sense.ma_to_raw(100), i32::MAX);
    }

    #[test]
    fn test_defaults() {
        let overload = OverloadConfig::default();
        assert_eq!(overload.sample_on_ms, 100);
        assert_eq!(overload.sample_off_ms, 1000);
        assert_eq!(overload.overload_wait_min_ms, 20);
        assert_eq!(overload.overload_wait_max_ms, 10_000);
        assert_eq!(overload.good_samples, 100);

        let ack = AckConfig::default();
        assert_eq!((ack.min_pulse_us, ack.max_pulse_us), (2000, 8500));
        assert_eq!(SenseConfig::default().prog_trip_ma, 250);
        assert_eq!(StationConfig::default().gauge_interval_ms, 0);
    }

    #[test]
    fn test_overload_wait_max_is_at_least_min() {
        let overload = OverloadConfig::default().with_overload_wait_ms(500, 100);
        assert_eq!(overload.overload_wait_max_ms, 500);
    }
}

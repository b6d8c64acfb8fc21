//! Programming track acknowledgement pulse detection.
//!
//! A decoder acknowledges a service-mode packet by drawing an extra 60 mA or
//! more for about 6 ms. The [`AckDetector`] recognises such a pulse from
//! periodic current samples:
//!
//! 1. [`set_baseline`](AckDetector::set_baseline) records the idle current
//!    before the programming packet goes out.
//! 2. [`arm`](AckDetector::arm) opens the detection window.
//! 3. Every mainline poll feeds one sample to
//!    [`sample`](AckDetector::sample), which answers [`AckResult::Waiting`]
//!    until a decision is made.
//!
//! A rise above the threshold starts a pulse, the fall below it ends the
//! pulse. Only pulses whose length lies within the configured window count:
//! shorter ones are noise, longer ones are a real overcurrent. A pulse is
//! dropped as soon as it outlasts the window, and no new one starts until the
//! current has fallen back below the threshold. When the window times out
//! without a valid pulse the answer is [`AckResult::Nack`].
//!
//! Timestamps are wrapping `u32` microseconds.

use crate::config::{AckConfig, SenseConfig};

/// Outcome of an acknowledgement poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckResult {
    /// No valid pulse within the detection window.
    Nack,
    /// A pulse of valid duration was seen.
    Ack,
    /// Detection still in progress.
    Waiting,
}

/// Acknowledgement detection state for the programming track.
#[derive(Clone, Debug)]
pub struct AckDetector {
    config: AckConfig,
    sense: SenseConfig,
    baseline: i32,
    threshold: i32,
    pending: bool,
    detected: bool,
    check_start_us: u32,
    pulse_start_us: Option<u32>,
    overcurrent: bool,
    max_current: i32,
    pulse_duration_us: u32,
    check_duration_us: u32,
}

impl AckDetector {
    /// Creates an idle detector.
    ///
    /// # Arguments
    /// - `config`: threshold, pulse window and timeout
    /// - `sense`: scaling of the programming track driver, used to convert
    ///   the milliamp threshold to raw units
    pub fn new(config: AckConfig, sense: SenseConfig) -> Self {
        Self {
            threshold: sense.ma_to_raw(config.limit_ma),
            config,
            sense,
            baseline: 0,
            pending: false,
            detected: false,
            check_start_us: 0,
            pulse_start_us: None,
            overcurrent: false,
            max_current: 0,
            pulse_duration_us: 0,
            check_duration_us: 0,
        }
    }

    /// Records the no-acknowledgement current level.
    pub fn set_baseline(&mut self, raw: i32) {
        self.baseline = raw.max(0);
        self.threshold = self
            .baseline
            .saturating_add(self.sense.ma_to_raw(self.config.limit_ma));
        diag_debug!("ack baseline={} threshold={}", self.baseline, self.threshold);
    }

    /// Opens the detection window at `now_us`.
    pub fn arm(&mut self, now_us: u32) {
        self.pending = true;
        self.detected = false;
        self.check_start_us = now_us;
        self.pulse_start_us = None;
        self.overcurrent = false;
        self.max_current = 0;
        self.pulse_duration_us = 0;
        self.check_duration_us = 0;
    }

    /// Evaluates one current sample.
    ///
    /// Once a decision has been made it is returned again until the detector
    /// is re-armed.
    pub fn sample(&mut self, raw: i32, now_us: u32) -> AckResult {
        if !self.pending {
            return self.decision();
        }
        self.max_current = self.max_current.max(raw);

        if raw > self.threshold {
            let open = self.pulse_start_us;
            match open {
                None if !self.overcurrent => self.pulse_start_us = Some(now_us),
                Some(start) if now_us.wrapping_sub(start) > self.config.max_pulse_us => {
                    self.pulse_start_us = None;
                    self.overcurrent = true;
                    self.pulse_duration_us = now_us.wrapping_sub(start);
                    diag_debug!("ack pulse over {}us, overcurrent", self.config.max_pulse_us);
                }
                _ => {}
            }
        } else {
            self.overcurrent = false;
            if let Some(start) = self.pulse_start_us.take() {
                let duration = now_us.wrapping_sub(start);
                self.pulse_duration_us = duration;
                if (self.config.min_pulse_us..=self.config.max_pulse_us).contains(&duration) {
                    self.finish(true, now_us);
                    return AckResult::Ack;
                }
                diag_debug!("ack pulse of {}us rejected", duration);
            }
        }

        let timeout_us = self.config.timeout_ms.saturating_mul(1000);
        if now_us.wrapping_sub(self.check_start_us) >= timeout_us {
            self.pulse_start_us = None;
            self.finish(false, now_us);
            return AckResult::Nack;
        }
        AckResult::Waiting
    }

    fn finish(&mut self, detected: bool, now_us: u32) {
        self.pending = false;
        self.detected = detected;
        self.check_duration_us = now_us.wrapping_sub(self.check_start_us);
        diag_info!(
            "{} max={} pulse={}us check={}us",
            if detected { "ACK" } else { "NACK" },
            self.max_current,
            self.pulse_duration_us,
            self.check_duration_us
        );
    }

    fn decision(&self) -> AckResult {
        if self.detected {
            AckResult::Ack
        } else {
            AckResult::Nack
        }
    }

    /// Returns `true` while the detection window is open.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Returns `true` while a candidate pulse is being timed.
    pub fn in_pulse(&self) -> bool {
        self.pending && self.pulse_start_us.is_some()
    }

    /// Start time of the pulse being timed, if any.
    pub fn pulse_start_us(&self) -> Option<u32> {
        self.pulse_start_us.filter(|_| self.pending)
    }

    /// Baseline current in raw units.
    pub fn baseline(&self) -> i32 {
        self.baseline
    }

    /// Pulse threshold in raw units.
    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Highest raw current seen since arming.
    pub fn max_current(&self) -> i32 {
        self.max_current
    }

    /// Length of the last completed pulse, in microseconds.
    pub fn pulse_duration_us(&self) -> u32 {
        self.pulse_duration_us
    }

    /// Time from arming to the decision, in microseconds.
    pub fn check_duration_us(&self) -> u32 {
        self.check_duration_us
    }

    /// Active configuration.
    pub fn config(&self) -> &AckConfig {
        &self.config
    }

    /// Sets the pulse threshold above the baseline, in milliamps.
    pub fn set_limit_ma(&mut self, limit_ma: u32) {
        self.config.limit_ma = limit_ma;
        self.set_baseline(self.baseline);
    }

    /// Sets the shortest accepted pulse, in microseconds.
    pub fn set_min_pulse_us(&mut self, us: u32) {
        self.config.min_pulse_us = us;
    }

    /// Sets the longest accepted pulse, in microseconds.
    pub fn set_max_pulse_us(&mut self, us: u32) {
        self.config.max_pulse_us = us;
    }
}

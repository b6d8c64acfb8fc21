//! Timer and tick-loop utilities for the waveform.
//!
//! The waveform needs one call to [`Waveform::tick()`](crate::wave::Waveform::tick)
//! every [`TICK_PERIOD_US`]. Two ways of providing it are supported: a timer
//! interrupt service routine using `critical_section::with` (`timer-isr`
//! feature), or a busy-loop delay timer (`delay-loop` feature).
//!
//! Contains helpers for polling- and ISR-based scheduling, including:
//! - `compute_ocr_value`: runtime compare-register calculator
//! - `const_ocr_value`: compile-time compare-register calculator
//! - `run_tick_loop`: blocking waveform loop for `DelayNs` (feature `delay-loop`)
//! - `global_waveform_tick` and `tick_waveform!()`: interrupt-based tick callback wrapper
//!   (feature `timer-isr`)
//!
//! Compare values for a 58 µs tick (`compute_ocr_value`):
//!
//! | F_CPU    | PRESCALER | OCR |
//! |----------|-----------|-----|
//! | 16 MHz   |         8 | 116 |
//! | 16 MHz   |         1 | 928 |
//! | 48 MHz   |         1 | 2784 |
//! | 72 MHz   |         8 | 522 |

use libm::round;

use crate::consts::TICK_PERIOD_US;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// Ticks in one `1` bit (one high, one low).
pub const TICKS_PER_ONE_BIT: u32 = 2;
/// Ticks in one `0` bit (two high, two low).
pub const TICKS_PER_ZERO_BIT: u32 = 4;
/// 1,000,000 nanoseconds = 1 millisecond
pub const NANOSECONDS_PER_MILLISECOND: u64 = 1_000_000;
/// 1,000 nanoseconds = 1 microsecond
pub const NANOSECONDS_PER_MICROSECOND: u64 = 1_000;

/// Computes the compare value for a timer in CTC mode.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 1, 8, 64)
/// - `tick_us`: desired tick interval in microseconds (e.g., 58.0)
///
/// # Returns
/// - Compare value for OCRnA (rounded to nearest integer)
pub fn compute_ocr_value(f_cpu: u32, prescaler: u32, tick_us: f32) -> u16 {
    let counts_per_second: f64 = f_cpu as f64 / prescaler as f64;
    round(counts_per_second * (tick_us as f64 / 1_000_000.0)) as u16
}

/// Compile-time compare value calculator
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 1, 8, 64)
/// - `tick_us`: desired tick interval in whole microseconds
///
/// # Returns
/// - Compare value for OCRnA (truncated)
pub const fn const_ocr_value(f_cpu: u32, prescaler: u32, tick_us: u32) -> u16 {
    let tick_ns = tick_us as u64 * NANOSECONDS_PER_MICROSECOND;
    ((f_cpu / prescaler) as u64 * tick_ns / (NANOSECONDS_PER_MILLISECOND * 1_000)) as u16
}

/// Compare value for the standard [`TICK_PERIOD_US`] tick.
pub const fn dcc_ocr_value(f_cpu: u32, prescaler: u32) -> u16 {
    const_ocr_value(f_cpu, prescaler, TICK_PERIOD_US)
}

/// Converts a tick count to microseconds.
pub const fn ticks_to_us(ticks: u32) -> u32 {
    ticks * TICK_PERIOD_US
}

/// Number of whole ticks in `us` microseconds.
pub const fn us_to_ticks(us: u32) -> u32 {
    us / TICK_PERIOD_US
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_ocr_value() {
        assert_eq!(compute_ocr_value(16_000_000, 8, 58.0), 116);
        assert_eq!(compute_ocr_value(16_000_000, 1, 58.0), 928);
        assert_eq!(compute_ocr_value(48_000_000, 1, 58.0), 2784);
    }

    #[test]
    fn test_const_ocr_value_matches_runtime() {
        const OCR: u16 = dcc_ocr_value(16_000_000, 8);
        assert_eq!(OCR, 116);
        assert_eq!(const_ocr_value(72_000_000, 8, 58), 522);
    }

    #[test]
    fn test_bit_durations() {
        assert_eq!(ticks_to_us(TICKS_PER_ONE_BIT), 116);
        assert_eq!(ticks_to_us(TICKS_PER_ZERO_BIT), 232);
        assert_eq!(us_to_ticks(150_000), 2586);
    }
}

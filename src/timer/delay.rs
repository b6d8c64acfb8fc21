use crate::wave::{TrackSignal, Waveform};
use embedded_hal::delay::DelayNs;

/// Runs a blocking loop that repeatedly calls `tick()` on the provided waveform.
///
/// This is a simple timing loop for use in environments where interrupts are unavailable
/// or undesired. It drives the waveform timing using a delay provider implementing
/// `embedded_hal::delay::DelayNs`.
///
/// # Arguments
/// - `waveform`: A mutable reference to a `Waveform` instance.
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL.
/// - `tick_us`: The delay between each tick call, in microseconds. Pass less than
///   [`TICK_PERIOD_US`](crate::consts::TICK_PERIOD_US) to account for the time spent
///   in `tick()` itself.
///
/// # Notes
/// - This loop will never return; it is intended for single-purpose polling firmware.
///   Use [`run_ticks`] to run a bounded number of ticks.
/// - Delay jitter goes straight onto the track signal; prefer interrupt-driven tick
///   scheduling whenever a hardware timer is available.
pub fn run_tick_loop<D: DelayNs, M: TrackSignal, P: TrackSignal>(
    waveform: &mut Waveform<'_, M, P>,
    delay: &mut D,
    tick_us: u32,
) -> ! {
    loop {
        waveform.tick();
        delay.delay_us(tick_us);
    }
}

/// Runs exactly `ticks` ticks with `tick_us` microseconds between them.
pub fn run_ticks<D: DelayNs, M: TrackSignal, P: TrackSignal>(
    waveform: &mut Waveform<'_, M, P>,
    delay: &mut D,
    tick_us: u32,
    ticks: u32,
) {
    for _ in 0..ticks {
        waveform.tick();
        delay.delay_us(tick_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordingSignal, decode_bits};
    use crate::station::StationShared;
    use crate::wave::NoSignal;
    use embedded_hal_mock::eh1::delay::NoopDelay;

    #[test]
    fn test_run_ticks_drives_waveform() {
        let shared = StationShared::new();
        let mut waveform: Waveform<'_, RecordingSignal, NoSignal> =
            Waveform::new(&shared, RecordingSignal::default(), None);
        let mut delay = NoopDelay::new();
        run_ticks(&mut waveform, &mut delay, 58, 32);
        let bits = decode_bits(&waveform.main_signal().levels).unwrap();
        assert_eq!(bits, [true; 16]);
    }
}

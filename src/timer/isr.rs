use crate::station::StationShared;
use crate::wave::{TrackSignal, Waveform};
use core::cell::RefCell;
use critical_section::Mutex;

/// Global slot holding the interrupt-side [`Waveform`].
pub type GlobalWaveform<M, P> = Mutex<RefCell<Option<Waveform<'static, M, P>>>>;

/// Used to initialize the global static `Waveform` for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust
/// use dccwave::mock::RecordingSignal;
/// use dccwave::timer::{GlobalWaveform, global_waveform_init};
/// use dccwave::wave::NoSignal;
///
/// static WAVEFORM: GlobalWaveform<RecordingSignal, NoSignal> = global_waveform_init();
/// ```
pub const fn global_waveform_init<M: TrackSignal, P: TrackSignal>() -> GlobalWaveform<M, P> {
    Mutex::new(RefCell::new(None))
}

/// Builds the `Waveform` and moves it into the global slot.
///
/// # Arguments
/// * The global static `Waveform` slot
/// * The static shared station state
/// * The main track signal output
/// * The programming track signal output, if there is one
///
/// # Example
/// ```rust
/// # use dccwave::mock::RecordingSignal;
/// # use dccwave::station::StationShared;
/// # use dccwave::timer::{GlobalWaveform, global_waveform_init, global_waveform_setup, global_waveform_tick};
/// # use dccwave::wave::NoSignal;
/// static SHARED: StationShared = StationShared::new();
/// static WAVEFORM: GlobalWaveform<RecordingSignal, NoSignal> = global_waveform_init();
///
/// global_waveform_setup(&WAVEFORM, &SHARED, RecordingSignal::default(), None);
/// global_waveform_tick(&WAVEFORM);
/// ```
pub fn global_waveform_setup<M: TrackSignal, P: TrackSignal>(
    global_waveform: &'static GlobalWaveform<M, P>,
    shared: &'static StationShared,
    main_signal: M,
    prog_signal: Option<P>,
) {
    critical_section::with(|cs| {
        let _ = global_waveform
            .borrow(cs)
            .replace(Some(Waveform::new(shared, main_signal, prog_signal)));
    });
}

/// Runs the tick at each interrupt
///
/// Does nothing until [`global_waveform_setup`] has been called.
///
/// # Arguments
/// * The global static `Waveform` slot
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     global_waveform_tick(&WAVEFORM);
/// }
/// ```
pub fn global_waveform_tick<M: TrackSignal, P: TrackSignal>(
    global_waveform: &'static GlobalWaveform<M, P>,
) {
    critical_section::with(|cs| {
        if let Some(waveform) = global_waveform.borrow(cs).borrow_mut().as_mut() {
            waveform.tick();
        }
    });
}

/// Declares the static globals `DCC_SHARED` and `DCC_WAVEFORM`.
///
/// `DCC_SHARED` is the [`StationShared`](crate::station::StationShared)
/// state handed to the mainline `CommandStation`; `DCC_WAVEFORM` is the
/// `critical_section` protected slot the timer interrupt ticks.
///
/// # Arguments
/// - `$main`: The concrete type of the main track signal (must implement `TrackSignal`)
/// - `$prog`: The concrete type of the programming track signal (must implement `TrackSignal`)
///
/// # Example
/// ```rust
/// use dccwave::init_waveform;
/// use dccwave::mock::RecordingSignal;
///
/// init_waveform!(RecordingSignal, RecordingSignal);
/// ```
#[macro_export]
macro_rules! init_waveform {
    ( $main:ty, $prog:ty ) => {
        pub static DCC_SHARED: $crate::station::StationShared =
            $crate::station::StationShared::new();
        pub static DCC_WAVEFORM: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::wave::Waveform<'static, $main, $prog>>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
    ( $main:ty ) => {
        $crate::init_waveform!($main, $crate::wave::NoSignal);
    };
}

/// Initializes `DCC_WAVEFORM` with a new waveform over `DCC_SHARED`.
///
/// # Arguments
/// - `$main`: The main track signal expression
/// - `$prog`: Optional programming track signal expression (an `Option`)
///
/// # Example
/// ```rust
/// use dccwave::{init_waveform, setup_waveform, tick_waveform};
/// use dccwave::mock::RecordingSignal;
///
/// init_waveform!(RecordingSignal);
///
/// fn main() {
///     setup_waveform!(RecordingSignal::default());
///     tick_waveform!();
/// }
/// ```
///
/// # Notes
/// - Must be called inside a critical section-aware context (safe in `main()`).
/// - Requires `init_waveform!` to have been used earlier.
#[macro_export]
macro_rules! setup_waveform {
    ( $main:expr, $prog:expr ) => {
        $crate::critical_section::with(|cs| {
            let _ = DCC_WAVEFORM
                .borrow(cs)
                .replace(Some($crate::wave::Waveform::new(&DCC_SHARED, $main, $prog)));
        });
    };
    ( $main:expr ) => {
        $crate::setup_waveform!($main, None);
    };
}

/// Calls `tick()` on `DCC_WAVEFORM` if it has been initialized.
///
/// This macro is intended to be invoked from a timer ISR every 58 µs.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     tick_waveform!();
/// }
/// ```
///
/// # Notes
/// - This macro assumes `DCC_WAVEFORM` was declared with `init_waveform!`
///   and initialized via `setup_waveform!`.
/// - Safe to call repeatedly; does nothing if the waveform hasn't been set up yet.
#[macro_export]
macro_rules! tick_waveform {
    () => {
        $crate::critical_section::with(|cs| {
            if let Some(waveform) = DCC_WAVEFORM.borrow(cs).borrow_mut().as_mut() {
                waveform.tick();
            }
        });
    };
}

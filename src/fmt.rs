//! Internal diagnostic macros.
//!
//! Forward to `defmt` or `log` depending on the enabled feature. With neither
//! feature the arguments still go through `format_args!`, so call sites are
//! checked the same way in every configuration and nothing is formatted.

#![allow(unused_macros)]

macro_rules! diag_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt-0-3")]
        defmt::warn!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt-0-3")))]
        log::warn!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-0-3")))]
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! diag_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt-0-3")]
        defmt::info!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt-0-3")))]
        log::info!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-0-3")))]
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! diag_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt-0-3")]
        defmt::debug!($($arg)*);
        #[cfg(all(feature = "log", not(feature = "defmt-0-3")))]
        log::debug!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-0-3")))]
        let _ = format_args!($($arg)*);
    }};
}

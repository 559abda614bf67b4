//! Logging macros that forward to `defmt` or `log`
//!
//! The macros are expanded in the calling crate, so the `defmt` and `log` features checked here are the
//! caller's features. Every crate using them exposes the same two features and forwards them here.
//! With neither feature enabled the arguments are still borrowed so that no unused-variable warnings appear.

#[doc(hidden)]
#[macro_export]
macro_rules! __log_forward {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::$level!($s $(, $x)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        ::log::$level!($s $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "log")))]
        let _ = ($( & $x ),*);
    }};
}

/// Trace level log
#[macro_export]
macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        $crate::__log_forward!(trace, $s $(, $x)*)
    };
}

/// Debug level log
#[macro_export]
macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        $crate::__log_forward!(debug, $s $(, $x)*)
    };
}

/// Info level log
#[macro_export]
macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        $crate::__log_forward!(info, $s $(, $x)*)
    };
}

/// Warning level log
#[macro_export]
macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        $crate::__log_forward!(warn, $s $(, $x)*)
    };
}

/// Error level log
#[macro_export]
macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        $crate::__log_forward!(error, $s $(, $x)*)
    };
}

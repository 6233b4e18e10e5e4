#![no_std]

//! Logging front-end shared by the workspace crates.
//!
//! `defmt` output is picked by the calling crate's `defmt` feature, since `defmt` macros
//! must expand where they are used. `log` output is enabled by this crate's own `log`
//! feature, so enabling `logger/log` anywhere in the build turns it on. With neither
//! enabled every statement compiles to nothing. Format strings must stay within the
//! subset both backends accept (`{}` and `{:?}`).

#[cfg(feature = "log")]
#[doc(hidden)]
pub use log as __log;

#[cfg(feature = "log")]
#[doc(hidden)]
#[macro_export]
macro_rules! __log_dispatch {
    ($level:ident, $($args:tt)*) => {
        $crate::__log::$level!($($args)*)
    };
}

#[cfg(not(feature = "log"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __log_dispatch {
    ($level:ident, $($args:tt)*) => {
        ()
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __dispatch {
    ($level:ident, $($args:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::$level!($($args)*);
        $crate::__log_dispatch!($level, $($args)*);
    }};
}

#[macro_export]
macro_rules! trace {
    ($($args:tt)*) => {
        $crate::__dispatch!(trace, $($args)*)
    };
}

#[macro_export]
macro_rules! debug {
    ($($args:tt)*) => {
        $crate::__dispatch!(debug, $($args)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($args:tt)*) => {
        $crate::__dispatch!(info, $($args)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($args:tt)*) => {
        $crate::__dispatch!(warn, $($args)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($args:tt)*) => {
        $crate::__dispatch!(error, $($args)*)
    };
}

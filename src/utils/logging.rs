//! Tagged logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Every module that logs defines two consts and imports the macros from the
//! crate root:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TAG: &str = "locator";
//!
//! use crate::{log_debug, log_info, log_warn, log_error};
//!
//! log_info!("found input via {}", pattern);
//! // => "[locator] found input via #prompt-textarea"
//! ```

/// Info-level log line prefixed with the calling module's `LOG_TAG`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!("[{}] {}", LOG_TAG, format_args!($($arg)*));
        }
    };
}

/// Debug-level variant, used for per-tick noise.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!("[{}] {}", LOG_TAG, format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!("[{}] {}", LOG_TAG, format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!("[{}] {}", LOG_TAG, format_args!($($arg)*));
        }
    };
}

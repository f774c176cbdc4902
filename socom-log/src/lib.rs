// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small logging facade used by the `socom` crate family. It has 6
//! [`LogLevel`]s which can be set via [`set_log_level()`] and read via
//! [`get_log_level()`].
//!
//! The crate provides convenience macros that combine error handling with
//! logging: [`fail!`] returns early with a converted error after logging,
//! [`fatal_panic!`] logs and then panics.
//!
//! # Example
//!
//! ```
//! use socom_log::{debug, error, info, trace, warn};
//!
//! #[derive(Debug)]
//! struct MyDataType {
//!     value: u64,
//! }
//!
//! impl MyDataType {
//!     fn log_stuff(&self) {
//!         trace!("trace message");
//!         trace!(from self, "trace message");
//!         debug!("hello {} {}", 123, 456);
//!         info!(from self, "world");
//!         warn!("warn message");
//!         error!(from self, "bla {}", 1);
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

mod console;
mod fail;
mod log;

pub use console::ConsoleLogger;

const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

/// Severity of a logged message, ordered from least to most severe.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[repr(u8)]
pub enum LogLevel {
    /// Very verbose, per-message tracing.
    Trace = 0,
    /// Diagnostic detail useful while developing.
    Debug = 1,
    /// Normal operational messages.
    Info = 2,
    /// Something unexpected happened but the caller can continue.
    Warn = 3,
    /// An operation failed.
    Error = 4,
    /// Unrecoverable condition; the process is about to abort.
    Fatal = 5,
}

/// Implemented by anything that can receive formatted log messages.
pub trait Log: Sync {
    /// Writes one log message.
    fn log(&self, log_level: LogLevel, origin: std::fmt::Arguments, args: std::fmt::Arguments);
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(DEFAULT_LOG_LEVEL as u8);
static LOGGER: OnceLock<&'static dyn Log> = OnceLock::new();

/// Sets the current log level. Messages below this level are discarded.
pub fn set_log_level(v: LogLevel) {
    LOG_LEVEL.store(v as u8, Ordering::Relaxed);
}

/// Returns the current log level.
pub fn get_log_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Trace,
        1 => LogLevel::Debug,
        2 => LogLevel::Info,
        3 => LogLevel::Warn,
        4 => LogLevel::Error,
        _ => LogLevel::Fatal,
    }
}

/// Sets the log level by reading the `SOCOM_LOG_LEVEL` environment variable, falling back to
/// `default_level` if it is unset or unrecognized.
pub fn set_log_level_from_env_or(default_level: LogLevel) {
    let level = std::env::var("SOCOM_LOG_LEVEL")
        .ok()
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "fatal" => LogLevel::Fatal,
            _ => default_level,
        })
        .unwrap_or(default_level);
    set_log_level(level);
}

fn get_logger() -> &'static dyn Log {
    static DEFAULT: ConsoleLogger = ConsoleLogger::new();
    *LOGGER.get_or_init(|| &DEFAULT)
}

/// Installs the process-wide logger. Can only be called once; returns `false` if a logger was
/// already installed (including the implicit default).
pub fn set_logger(logger: &'static dyn Log) -> bool {
    LOGGER.set(logger).is_ok()
}

#[doc(hidden)]
pub fn __internal_print_log_msg(
    log_level: LogLevel,
    origin: std::fmt::Arguments,
    args: std::fmt::Arguments,
) {
    if log_level >= get_log_level() {
        get_logger().log(log_level, origin, args)
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The default [`Log`] implementation: writes colored, counter-ordered
//! messages to stderr.

use std::io::IsTerminal;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Log, LogLevel};

/// Logs to stderr, coloring output when stderr is a tty.
pub struct ConsoleLogger {
    counter: AtomicU64,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    /// Creates a new console logger. `const fn` so it can back a `static`.
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    fn is_terminal() -> bool {
        std::io::stderr().is_terminal()
    }

    fn log_level_tag(log_level: LogLevel) -> &'static str {
        if Self::is_terminal() {
            match log_level {
                LogLevel::Trace => "\x1b[0;90m[T]",
                LogLevel::Debug => "\x1b[0;93m[D]",
                LogLevel::Info => "\x1b[0;92m[I]",
                LogLevel::Warn => "\x1b[0;33m[W]",
                LogLevel::Error => "\x1b[0;31m[E]",
                LogLevel::Fatal => "\x1b[1;4;91m[F]",
            }
        } else {
            match log_level {
                LogLevel::Trace => "[T]",
                LogLevel::Debug => "[D]",
                LogLevel::Info => "[I]",
                LogLevel::Warn => "[W]",
                LogLevel::Error => "[E]",
                LogLevel::Fatal => "[F]",
            }
        }
    }

    fn message_color(log_level: LogLevel) -> &'static str {
        if Self::is_terminal() {
            match log_level {
                LogLevel::Trace => "\x1b[1;90m",
                LogLevel::Debug => "\x1b[1;90m",
                LogLevel::Info => "\x1b[1;37m",
                LogLevel::Warn => "\x1b[1;93m",
                LogLevel::Error => "\x1b[1;91m",
                LogLevel::Fatal => "\x1b[1;4;91m",
            }
        } else {
            ""
        }
    }

    fn counter_color() -> &'static str {
        if Self::is_terminal() {
            "\x1b[0;90m"
        } else {
            ""
        }
    }

    fn origin_color(log_level: LogLevel) -> &'static str {
        if Self::is_terminal() {
            match log_level {
                LogLevel::Trace => "\x1b[0;90m",
                LogLevel::Debug => "\x1b[0;90m",
                LogLevel::Info => "\x1b[0;37m",
                LogLevel::Warn => "\x1b[0;37m",
                LogLevel::Error => "\x1b[0;37m",
                LogLevel::Fatal => "\x1b[0;4;91m",
            }
        } else {
            ""
        }
    }

    fn print(color: &str, output: &str) {
        let mut stderr = std::io::stderr();
        if Self::is_terminal() {
            let _ = write!(stderr, "{color}{output}\x1b[0m\n");
        } else {
            let _ = writeln!(stderr, "{output}");
        }
    }

    fn print_origin(log_level: LogLevel, origin: &str) {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "{} ", Self::log_level_tag(log_level));
        Self::print(Self::origin_color(log_level), origin);
        let _ = write!(stderr, "| ");
    }
}

impl Log for ConsoleLogger {
    fn log(&self, log_level: LogLevel, origin: std::fmt::Arguments, args: std::fmt::Arguments) {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let origin_str = origin.to_string();
        let message_str = args.to_string();

        let mut stderr = std::io::stderr();
        if origin_str.is_empty() {
            let _ = write!(
                stderr,
                "{}{} {} ",
                Self::counter_color(),
                counter,
                Self::log_level_tag(log_level),
            );
        } else {
            let _ = write!(stderr, "{}{} ", Self::counter_color(), counter);
            Self::print_origin(log_level, &origin_str);
        }

        Self::print(Self::message_color(log_level), &message_str);
    }
}

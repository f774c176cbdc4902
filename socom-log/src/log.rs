// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contains all macros to log messages.

/// Logs a trace message.
///
/// ```
/// use socom_log::trace;
///
/// trace!("Only a message");
/// trace!(from "Somewhere over the Rainbow", "Message with custom origin");
/// ```
#[macro_export(local_inner_macros)]
macro_rules! trace {
    ($($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Trace, std::format_args!(""), std::format_args!($($e),*))
    };
    (from $o:expr, $($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Trace, std::format_args!("{:?}", $o), std::format_args!($($e),*))
    };
}

/// Logs a debug message.
///
/// ```
/// use socom_log::debug;
///
/// debug!("hello {} {}", 123, 456);
/// ```
#[macro_export(local_inner_macros)]
macro_rules! debug {
    ($($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Debug, std::format_args!(""), std::format_args!($($e),*))
    };
    (from $o:expr, $($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Debug, std::format_args!("{:?}", $o), std::format_args!($($e),*))
    };
}

/// Logs an info message.
#[macro_export(local_inner_macros)]
macro_rules! info {
    ($($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Info, std::format_args!(""), std::format_args!($($e),*))
    };
    (from $o:expr, $($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Info, std::format_args!("{:?}", $o), std::format_args!($($e),*))
    };
}

/// Logs a warn message.
#[macro_export(local_inner_macros)]
macro_rules! warn {
    ($($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Warn, std::format_args!(""), std::format_args!($($e),*))
    };
    (from $o:expr, $($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Warn, std::format_args!("{:?}", $o), std::format_args!($($e),*))
    };
}

/// Logs an error message.
#[macro_export(local_inner_macros)]
macro_rules! error {
    ($($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Error, std::format_args!(""), std::format_args!($($e),*))
    };
    (from $o:expr, $($e:expr),*) => {
        $crate::__internal_print_log_msg($crate::LogLevel::Error, std::format_args!("{:?}", $o), std::format_args!($($e),*))
    };
}

/// Logs a fatal message and aborts the process.
///
/// Used only by the deadlock detector: a callback attempting to destroy the connector it
/// is running on is a guaranteed deadlock, not a recoverable error.
#[macro_export(local_inner_macros)]
macro_rules! fatal_panic {
    ($($e:expr),*) => {
        {
            $crate::__internal_print_log_msg($crate::LogLevel::Fatal, std::format_args!(""), std::format_args!($($e),*));
            std::process::abort();
        }
    };
    (from $o:expr, $($e:expr),*) => {
        {
            $crate::__internal_print_log_msg($crate::LogLevel::Fatal, std::format_args!("{:?}", $o), std::format_args!($($e),*));
            std::process::abort();
        }
    };
}

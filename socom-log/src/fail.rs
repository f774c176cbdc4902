// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Combines error handling with logging.

/// Macro to combine error handling with log messages. It automatically fails and converts the
/// error with [`From`].
///
/// ```
/// use socom_log::fail;
///
/// #[derive(Debug)]
/// struct MyDataType {
///     value: u64,
/// }
///
/// impl MyDataType {
///     fn do_stuff(&self, value: u64) -> Result<(), ()> {
///         if value == 0 { Err(()) } else { Ok(()) }
///     }
///
///     fn do_more_stuff(&self) -> Result<(), u64> {
///         fail!(from self, when self.do_stuff(0),
///                 with 1234, "Failed while calling do_stuff");
///         Ok(())
///     }
///
///     fn do_more(&self) -> Result<(), u64> {
///         if self.value == 0 {
///             fail!(from self, with 4567, "Value is zero");
///         }
///         Ok(())
///     }
///
///     fn even_more(&self) -> Result<(), u64> {
///         fail!(from self, when self.do_more(), "do_more failed");
///         Ok(())
///     }
/// }
/// ```
#[macro_export(local_inner_macros)]
macro_rules! fail {
    (with $error_value:expr, $($message:expr),*) => {
        {
            $crate::debug!($($message),*);
            return Err($error_value);
        }
    };
    (from $origin:expr, with $error_value:expr, $($message:expr),*) => {
        {
            $crate::debug!(from $origin, $($message),*);
            return Err($error_value);
        }
    };
    (from $origin:expr, when $call:expr, with $error_value:expr, $($message:expr),*) => {
        {
            let result = $call;
            match result.is_err() {
                true => {
                    $crate::debug!(from $origin, $($message),*);
                    return Err($error_value);
                }
                false => {
                    result.ok().unwrap()
                }
            }
        }
    };
    (from $origin:expr, when $call:expr, map $($error_origin:path => $error_value:expr);*,
            unmatched $error_unmatched:expr, $($message:expr),*) => {
        {
            match $call {
                Err(e) => {
                    $crate::debug!(from $origin, $($message),*);
                    match e {
                        $($error_origin => return Err($error_value)),*,
                        _ => return Err($error_unmatched),
                    }
                },
                Ok(v) => v,
            }
        }
    };
    (when $call:expr, $($message:expr),*) => {
        {
            let result = $call;
            match result.is_err() {
                true => {
                    $crate::debug!($($message),*);
                    result?
                }
                false => {
                    result.ok().unwrap()
                }
            }
        }
    };
    (from $origin:expr, when $call:expr, to $error:ty, $($message:expr),*) => {
        {
            let result = $call;
            match result.is_err() {
                true => {
                    $crate::debug!(from $origin, $($message),*);
                    let error = <$error>::from(result.err().unwrap());
                    Err(error)?
                }
                false => {
                    result.ok().unwrap()
                }
            }
        }
    };
    (from $origin:expr, when $call:expr, $($message:expr),*) => {
        {
            let result = $call;
            match result.is_err() {
                true => {
                    $crate::debug!(from $origin, $($message),*);
                    result?
                }
                false => {
                    result.ok().unwrap()
                }
            }
        }
    };
}

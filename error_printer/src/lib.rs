use std::fmt::{Debug, Display};
use std::panic::Location;

use tracing::{debug, error, info, warn};

/// A helper trait to log errors.
/// The logging functions will track the caller's callsite.
/// For a chain of calls A -> B -> C -> ErrorPrinter, the
/// topmost function without #[track_caller] is deemed the callsite.
pub trait ErrorPrinter {
    fn log_error<M: Display>(self, message: M) -> Self;

    fn warn_error<M: Display>(self, message: M) -> Self;

    fn debug_error<M: Display>(self, message: M) -> Self;

    fn info_error<M: Display>(self, message: M) -> Self;
}

impl<T, E: Debug> ErrorPrinter for Result<T, E> {
    /// If self is an Err(e), prints out the given string to tracing::error,
    /// appending "error: {e}" to the end of the message.
    #[track_caller]
    fn log_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = get_caller();
            error!(caller, "{message}, error: {e:?}")
        }
        self
    }

    /// If self is an Err(e), prints out the given string to tracing::warn,
    /// appending "error: {e}" to the end of the message.
    #[track_caller]
    fn warn_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = get_caller();
            warn!(caller, "{message}, error: {e:?}")
        }
        self
    }

    #[track_caller]
    fn debug_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = get_caller();
            debug!(caller, "{message}, error: {e:?}")
        }
        self
    }

    #[track_caller]
    fn info_error<M: Display>(self, message: M) -> Self {
        if let Err(e) = &self {
            let caller = get_caller();
            info!(caller, "{message}, error: {e:?}")
        }
        self
    }
}

/// A helper trait to log when an option is None.
pub trait OptionPrinter {
    fn error_none<M: Display>(self, message: M) -> Self;

    fn warn_none<M: Display>(self, message: M) -> Self;

    fn debug_none<M: Display>(self, message: M) -> Self;

    fn info_none<M: Display>(self, message: M) -> Self;
}

impl<T> OptionPrinter for Option<T> {
    #[track_caller]
    fn error_none<M: Display>(self, message: M) -> Self {
        if self.is_none() {
            let caller = get_caller();
            error!(caller, "{message}")
        }
        self
    }

    #[track_caller]
    fn warn_none<M: Display>(self, message: M) -> Self {
        if self.is_none() {
            let caller = get_caller();
            warn!(caller, "{message}")
        }
        self
    }

    #[track_caller]
    fn debug_none<M: Display>(self, message: M) -> Self {
        if self.is_none() {
            let caller = get_caller();
            debug!(caller, "{message}")
        }
        self
    }

    #[track_caller]
    fn info_none<M: Display>(self, message: M) -> Self {
        if self.is_none() {
            let caller = get_caller();
            info!(caller, "{message}")
        }
        self
    }
}

#[track_caller]
fn get_caller() -> String {
    let location = Location::caller();
    format!("{}:{}", location.file(), location.line())
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn test_log_error_passes_value_through() {
        let ok: Result<u32, String> = Ok(5);
        assert_eq!(ok.log_error("should not be logged"), Ok(5));
        assert!(!logs_contain("should not be logged"));

        let err: Result<u32, String> = Err("connection reset".to_owned());
        let _ = err.log_error("upload stream failed");
        assert!(logs_contain("upload stream failed"));
        assert!(logs_contain("connection reset"));
    }

    #[test]
    #[traced_test]
    fn test_option_printer() {
        let some = Some(1).warn_none("missing value");
        assert_eq!(some, Some(1));
        assert!(!logs_contain("missing value"));

        let none: Option<u32> = None.info_none("no content length");
        assert!(none.is_none());
        assert!(logs_contain("no content length"));
    }
}

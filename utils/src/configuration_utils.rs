use std::str::FromStr;

use tracing::{info, warn};

/// Prefix for every environment variable consulted by `configurable_constants!`.
pub const ENV_VAR_PREFIX: &str = "SPEEDTEST_";

/// A trait to control how a value is parsed from an environment string or other config source
/// if it's present.
pub trait ParsableConfigValue: std::fmt::Debug + Sized {
    fn parse_user_value(value: &str) -> Option<Self>;

    /// Parse the value, returning the default if it can't be parsed or the string is empty.
    /// Issue a warning if it can't be parsed.
    fn parse(variable_name: &str, value: Option<String>, default: Self) -> Self {
        match value {
            Some(v) => match Self::parse_user_value(&v) {
                Some(v) => {
                    info!("Config: {variable_name} = {v:?} (user set)");
                    v
                },
                None => {
                    warn!(
                        "Configuration value {v} for {variable_name} cannot be parsed into correct type; reverting to default."
                    );
                    info!("Config: {variable_name} = {default:?} (default due to parse error)");
                    default
                },
            },
            None => default,
        }
    }
}

/// Most values work with the FromStr implementation, but we want to override the behavior for some types
/// (e.g. Option<T> and bool) to have custom parsing behavior.
pub trait FromStrParseable: FromStr + std::fmt::Debug {}

impl<T: FromStrParseable> ParsableConfigValue for T {
    fn parse_user_value(value: &str) -> Option<Self> {
        value.trim().parse::<T>().ok()
    }
}

impl FromStrParseable for usize {}
impl FromStrParseable for u16 {}
impl FromStrParseable for u32 {}
impl FromStrParseable for u64 {}
impl FromStrParseable for i64 {}
impl FromStrParseable for String {}

/// Special handling for bool:
/// - true: "1","true","yes","y","on"  -> true
/// - false: "0","false","no","n","off" -> false
fn parse_bool_value(value: &str) -> Option<bool> {
    let t = value.trim().to_ascii_lowercase();

    match t.as_str() {
        "0" | "false" | "no" | "n" | "off" => Some(false),
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        _ => None,
    }
}

impl ParsableConfigValue for bool {
    fn parse_user_value(value: &str) -> Option<Self> {
        parse_bool_value(value)
    }
}

/// Enable Option<T> to allow the default value to be None if nothing is set and appear as
/// Some(Value) if the user specifies the value.
impl<T: ParsableConfigValue> ParsableConfigValue for Option<T> {
    fn parse_user_value(value: &str) -> Option<Self> {
        T::parse_user_value(value).map(Some)
    }
}

/// Reads `SPEEDTEST_<name>` and parses it, falling back to `default`.
pub fn load_from_env<T: ParsableConfigValue>(name: &str, default: T) -> T {
    let maybe_env_value = std::env::var(format!("{ENV_VAR_PREFIX}{name}")).ok();
    T::parse(name, maybe_env_value, default)
}

// Reexport this so that dependencies don't have weird other dependencies
pub use lazy_static::lazy_static;

/// Declares lazily initialized constants whose default can be overridden by setting
/// the environment variable `SPEEDTEST_<CONSTANT_NAME>`.
///
/// # Example
/// ```ignore
/// utils::configurable_constants! {
///    /// Size of a single read.
///    ref READ_SIZE: usize = 32 * 1024;
/// }
///
/// assert_eq!(*READ_SIZE, 32 * 1024);
/// ```
#[macro_export]
macro_rules! configurable_constants {
    ($(
        $(#[$meta:meta])*
        ref $name:ident : $type:ty = $value:expr;
    )+) => {
        $crate::configuration_utils::lazy_static! {
            $(
                $(#[$meta])*
                pub static ref $name: $type = {
                    let default_value: $type = $value;
                    $crate::configuration_utils::load_from_env(stringify!($name), default_value)
                };
            )+
        }
    };
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_parse_bool_values() {
        assert_eq!(bool::parse_user_value("yes"), Some(true));
        assert_eq!(bool::parse_user_value(" Off "), Some(false));
        assert_eq!(bool::parse_user_value("maybe"), None);
    }

    #[test]
    fn test_parse_falls_back_to_default() {
        assert_eq!(u64::parse("X", Some("not-a-number".to_owned()), 7), 7);
        assert_eq!(u64::parse("X", Some(" 42 ".to_owned()), 7), 42);
        assert_eq!(u64::parse("X", None, 7), 7);
        assert_eq!(<Option<u16>>::parse("X", Some("8443".to_owned()), None), Some(8443));
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::set_var("SPEEDTEST_TEST_LOAD_FROM_ENV", "123");
        assert_eq!(load_from_env("TEST_LOAD_FROM_ENV", 5usize), 123);
        std::env::remove_var("SPEEDTEST_TEST_LOAD_FROM_ENV");
        assert_eq!(load_from_env("TEST_LOAD_FROM_ENV", 5usize), 5);
    }

    configurable_constants! {
        /// Only used to check that the macro expands.
        ref TEST_MACRO_CONSTANT: u64 = 17;
    }

    #[test]
    fn test_configurable_constant_default() {
        assert_eq!(*TEST_MACRO_CONSTANT, 17);
    }
}

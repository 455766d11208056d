#![cfg_attr(feature = "strict", deny(warnings))]

pub mod configuration_utils;

// The configurable_constants! macro is exported at the crate root by #[macro_export].

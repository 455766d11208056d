#![cfg_attr(feature = "strict", deny(warnings))]

pub mod config;
mod controller;
pub mod errors;
pub mod logging;
mod session;
mod sink;

pub use config::{parse_direction, SpeedTestConfig, StartupProtocol};
pub use controller::SpeedTestController;
pub use errors::SessionError;
pub use session::{SessionStatus, TransferSession};
pub use sink::{PresentationSink, TerminalStatus};

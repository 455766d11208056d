use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

utils::configurable_constants! {

    /// The log destination.  If unset or empty, logs go to the console; otherwise to the
    /// file at this path.
    ref LOG_DEST : Option<String> = None;

    /// The format the logs are printed in.  If "json", logs are dumped as json blobs; otherwise
    /// they are treated as text.  By default logging to a file is done in json and console
    /// logging in text.
    ref LOG_FORMAT : Option<String> = None;
}

/// Default log level. Override using the `RUST_LOG` env variable.
const DEFAULT_LOG_LEVEL_FILE: &str = "info";
const DEFAULT_LOG_LEVEL_CONSOLE: &str = "warn";

#[derive(Clone, Debug, PartialEq)]
pub enum LoggingMode {
    File(PathBuf),
    Console,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub logging_mode: LoggingMode,
    pub use_json: bool,
    pub version: String,
}

impl LoggingConfig {
    /// Reads SPEEDTEST_LOG_DEST and SPEEDTEST_LOG_FORMAT.
    pub fn from_env(version: String) -> LoggingConfig {
        Self::new(LOG_DEST.as_deref(), LOG_FORMAT.as_deref(), version)
    }

    pub fn new(log_dest: Option<&str>, log_format: Option<&str>, version: String) -> LoggingConfig {
        let logging_mode = match log_dest {
            Some(dest) if !dest.trim().is_empty() => LoggingMode::File(PathBuf::from(dest)),
            _ => LoggingMode::Console,
        };

        let use_json = match log_format {
            Some(format) => format.trim().eq_ignore_ascii_case("json"),
            None => logging_mode != LoggingMode::Console,
        };

        Self {
            logging_mode,
            use_json,
            version,
        }
    }
}

/// The main entry point to set up logging.  Should only be called once.
pub fn init_logging(cfg: LoggingConfig) {
    match &cfg.logging_mode {
        LoggingMode::File(log_file) => {
            // Fall back to the console if the file can't be used.
            if let Err(e) = init_logging_to_file(log_file, cfg.use_json) {
                init_logging_to_console(&cfg);
                error!("Error logging to file {log_file:?} ({e}); falling back to console logging.");
            }
        },
        LoggingMode::Console => init_logging_to_console(&cfg),
    }

    info!("speedtest {}", &cfg.version);
}

fn init_logging_to_console(cfg: &LoggingConfig) {
    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_line_number(true)
        .with_file(true)
        .with_target(false);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL_CONSOLE))
        .unwrap_or_default();

    let registry = tracing_subscriber::registry();
    if cfg.use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).init();
    } else {
        registry.with(fmt_layer_base.with_filter(fmt_filter)).init();
    }
}

fn init_logging_to_file(path: &Path, use_json: bool) -> Result<(), std::io::Error> {
    use std::ffi::OsStr;

    use tracing_appender::{non_blocking, rolling};

    let (path, file_name) = match path.file_name() {
        Some(name) => (path.to_path_buf(), name.to_owned()),
        None => (path.join("speedtest.log"), OsStr::new("speedtest.log").to_owned()),
    };

    let log_directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            parent.to_path_buf()
        },
        _ => PathBuf::from("."),
    };

    // Error out here, before installing anything, if the file isn't writeable.
    std::fs::write(&path, [])?;

    let (writer, guard) = non_blocking(rolling::never(log_directory, file_name));

    // The guard flushes on drop, so it has to live as long as the process.
    static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
    let _ = FILE_GUARD.set(guard);

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_writer(writer);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL_FILE))
        .unwrap_or_default();

    let registry = tracing_subscriber::registry();
    if use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).init();
    } else {
        registry.with(fmt_layer_base.with_filter(fmt_filter)).init();
    }

    Ok(())
}

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use progress_tracking::ProgressSnapshot;
use speedtest::config::{DEFAULT_BASE_PORT, DEFAULT_HOST, DEFAULT_NUM_STREAMS, DEFAULT_SCHEME, DEFAULT_UPLOAD_BYTES};
use speedtest::logging::{init_logging, LoggingConfig};
use speedtest::{
    parse_direction, PresentationSink, SessionStatus, SpeedTestConfig, SpeedTestController, StartupProtocol,
    TerminalStatus,
};
use transfer_client::TransferDirection;

/// Measures upload or download throughput against a speed-test server, using one
/// stream per port starting at the base port.
#[derive(Parser, Debug)]
#[clap(version)]
struct SpeedTestArgs {
    /// Server host name or address.
    #[clap(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port of the first stream; stream i uses base-port + i.
    #[clap(long, default_value_t = *DEFAULT_BASE_PORT)]
    base_port: u16,

    #[clap(long, default_value_t = *DEFAULT_NUM_STREAMS)]
    num_streams: usize,

    /// Bytes uploaded by each stream.
    #[clap(long, default_value_t = *DEFAULT_UPLOAD_BYTES)]
    upload_bytes: u64,

    /// One of "okhttp", "http1.1", "http2" or "quic".
    #[clap(long, default_value = "http1.1")]
    protocol: StartupProtocol,

    /// "upload" or "download".
    #[clap(long, default_value = "upload", value_parser = parse_direction)]
    mode: TransferDirection,

    /// Connection options handed to the QUIC transport as is.
    #[clap(long)]
    quic_connection_options: Option<String>,

    /// Client connection options handed to the QUIC transport as is.
    #[clap(long)]
    quic_client_connection_options: Option<String>,

    #[clap(long, default_value = DEFAULT_SCHEME)]
    scheme: String,

    /// Accept invalid TLS certificates.
    #[clap(long)]
    insecure: bool,
}

impl SpeedTestArgs {
    fn into_config(self) -> SpeedTestConfig {
        SpeedTestConfig {
            host: self.host,
            base_port: self.base_port,
            num_streams: self.num_streams,
            upload_bytes: self.upload_bytes,
            direction: self.mode,
            connection_options: self.quic_connection_options,
            client_connection_options: self.quic_client_connection_options,
            scheme: self.scheme,
            accept_invalid_certs: self.insecure,
            ..Default::default()
        }
        .with_startup_protocol(self.protocol)
    }
}

/// Renders session output on stdout, with progress on a single rewritten line.
struct ConsoleSink;

impl PresentationSink for ConsoleSink {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        let progress = match snapshot.per_mille() {
            Some(per_mille) => format!("{:>5.1}%", per_mille as f64 / 10.0),
            None => "   ?  ".to_owned(),
        };
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r{progress}  {}", snapshot.bitrate_indication());
        let _ = stdout.flush();
    }

    fn on_log(&self, message: &str, _append: bool) {
        println!("\n{}", message.trim_end());
    }

    fn on_terminal(&self, status: TerminalStatus, _detail: &str) {
        println!("Transfer {status}.");
    }

    fn on_controls_reset(&self) {}
}

fn run(args: SpeedTestArgs) -> Result<SessionStatus> {
    let controller = SpeedTestController::new(Arc::new(ConsoleSink));
    let session = controller.start(args.into_config())?;
    Ok(session.wait())
}

fn main() -> ExitCode {
    let args = SpeedTestArgs::parse();
    init_logging(LoggingConfig::from_env(env!("CARGO_PKG_VERSION").to_owned()));

    match run(args) {
        Ok(SessionStatus::Succeeded) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        },
    }
}

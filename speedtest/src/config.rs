use std::str::FromStr;

use serde::{Deserialize, Serialize};
use transfer_client::{BackendKind, ProtocolMode, TransferDirection, TransferError, TransportOptions};
use url::Url;

use crate::errors::{Result, SessionError};

utils::configurable_constants! {
    /// Port of stream 0; stream i connects to base port + i.
    ref DEFAULT_BASE_PORT: u16 = 8443;

    /// Bytes each stream uploads.
    ref DEFAULT_UPLOAD_BYTES: u64 = 500_000_000;

    ref DEFAULT_NUM_STREAMS: usize = 1;
}

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_SCHEME: &str = "https";
pub const UPLOAD_PATH: &str = "/uploads";

/// Everything needed to run one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTestConfig {
    pub host: String,
    pub base_port: u16,
    pub num_streams: usize,
    pub upload_bytes: u64,
    pub direction: TransferDirection,
    pub protocol: ProtocolMode,
    pub backend: BackendKind,

    /// Passed through verbatim to the multiplexed transport.
    pub connection_options: Option<String>,
    pub client_connection_options: Option<String>,

    pub scheme: String,
    pub accept_invalid_certs: bool,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            base_port: *DEFAULT_BASE_PORT,
            num_streams: *DEFAULT_NUM_STREAMS,
            upload_bytes: *DEFAULT_UPLOAD_BYTES,
            direction: TransferDirection::Upload,
            protocol: ProtocolMode::default(),
            backend: BackendKind::default(),
            connection_options: None,
            client_connection_options: None,
            scheme: DEFAULT_SCHEME.to_owned(),
            accept_invalid_certs: false,
        }
    }
}

impl SpeedTestConfig {
    /// Applies one of the protocol names accepted at startup, which selects both the
    /// backend and the wire protocol.
    pub fn with_startup_protocol(mut self, protocol: StartupProtocol) -> Self {
        self.backend = protocol.backend_kind();
        self.protocol = protocol.protocol_mode();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_streams == 0 {
            return Err(SessionError::Configuration("at least one stream is required".to_owned()));
        }
        if self.host.trim().is_empty() {
            return Err(SessionError::Configuration("no host given".to_owned()));
        }
        if self.scheme != "http" && self.scheme != "https" {
            return Err(SessionError::Configuration(format!("unsupported scheme {:?}", self.scheme)));
        }
        if self.backend == BackendKind::Streaming && self.protocol != ProtocolMode::Http11 {
            return Err(SessionError::Configuration(format!(
                "the streaming backend cannot use {:?}",
                self.protocol
            )));
        }
        Ok(())
    }

    /// The URL stream `stream_id` connects to: `{scheme}://{host}:{base_port + stream_id}/uploads`.
    pub fn target_url(&self, stream_id: usize) -> std::result::Result<Url, TransferError> {
        let port = u16::try_from(stream_id)
            .ok()
            .and_then(|offset| self.base_port.checked_add(offset))
            .ok_or(TransferError::InvalidUrl(url::ParseError::InvalidPort))?;

        Ok(Url::parse(&format!("{}://{}:{port}{UPLOAD_PATH}", self.scheme, self.host))?)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connection_options: self.connection_options.clone(),
            client_connection_options: self.client_connection_options.clone(),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

/// Protocol names accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupProtocol {
    /// Plain HTTP/1.1 through the streaming backend.
    OkHttp,
    Http11,
    Http2,
    Quic,
}

impl StartupProtocol {
    pub fn backend_kind(&self) -> BackendKind {
        match self {
            StartupProtocol::OkHttp => BackendKind::Streaming,
            _ => BackendKind::Multiplexed,
        }
    }

    pub fn protocol_mode(&self) -> ProtocolMode {
        match self {
            StartupProtocol::OkHttp | StartupProtocol::Http11 => ProtocolMode::Http11,
            StartupProtocol::Http2 => ProtocolMode::Http2,
            StartupProtocol::Quic => ProtocolMode::Multiplexed,
        }
    }
}

impl FromStr for StartupProtocol {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "okhttp" => Ok(StartupProtocol::OkHttp),
            "http1.1" => Ok(StartupProtocol::Http11),
            "http2" => Ok(StartupProtocol::Http2),
            "quic" => Ok(StartupProtocol::Quic),
            _ => Err(SessionError::Configuration(format!("unknown protocol {s:?}"))),
        }
    }
}

/// Parses the startup mode, "upload" or "download".
pub fn parse_direction(s: &str) -> Result<TransferDirection> {
    match s {
        "upload" => Ok(TransferDirection::Upload),
        "download" => Ok(TransferDirection::Download),
        _ => Err(SessionError::Configuration(format!("unknown mode {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_urls() {
        let config = SpeedTestConfig {
            host: "speed.example.com".to_owned(),
            base_port: 9000,
            ..Default::default()
        };

        assert_eq!(config.target_url(0).unwrap().as_str(), "https://speed.example.com:9000/uploads");
        assert_eq!(config.target_url(15).unwrap().port(), Some(9015));
    }

    #[test]
    fn test_port_overflow_is_a_url_error() {
        let config = SpeedTestConfig {
            base_port: 65534,
            ..Default::default()
        };

        assert!(config.target_url(1).is_ok());
        assert_eq!(config.target_url(2).unwrap_err(), TransferError::InvalidUrl(url::ParseError::InvalidPort));
        assert!(config.target_url(usize::MAX).is_err());
    }

    #[test]
    fn test_malformed_host() {
        let config = SpeedTestConfig {
            host: "bad host".to_owned(),
            ..Default::default()
        };
        assert!(matches!(config.target_url(0), Err(TransferError::InvalidUrl(_))));
    }

    #[test]
    fn test_validate() {
        assert!(SpeedTestConfig::default().validate().is_ok());

        let no_streams = SpeedTestConfig {
            num_streams: 0,
            ..Default::default()
        };
        assert!(no_streams.validate().unwrap_err().is_configuration_error());

        let bad_pairing = SpeedTestConfig {
            backend: BackendKind::Streaming,
            protocol: ProtocolMode::Http2,
            ..Default::default()
        };
        assert!(bad_pairing.validate().is_err());

        let ftp = SpeedTestConfig {
            scheme: "ftp".to_owned(),
            ..Default::default()
        };
        assert!(ftp.validate().is_err());
    }

    #[test]
    fn test_startup_protocols() {
        let config = SpeedTestConfig::default().with_startup_protocol("okhttp".parse().unwrap());
        assert_eq!(config.backend, BackendKind::Streaming);
        assert_eq!(config.protocol, ProtocolMode::Http11);

        let config = config.with_startup_protocol("quic".parse().unwrap());
        assert_eq!(config.backend, BackendKind::Multiplexed);
        assert_eq!(config.protocol, ProtocolMode::Multiplexed);

        assert!("spdy".parse::<StartupProtocol>().is_err());
        assert_eq!(parse_direction("download").unwrap(), TransferDirection::Download);
        assert!(parse_direction("sideways").is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SpeedTestConfig =
            serde_json::from_str(r#"{"host": "10.0.0.2", "num_streams": 4, "direction": "download"}"#).unwrap();
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.num_streams, 4);
        assert_eq!(config.direction, TransferDirection::Download);
        assert_eq!(config.base_port, *DEFAULT_BASE_PORT);
        assert_eq!(config.scheme, "https");
    }
}

use http::header::{CONTENT_LENGTH, LOCATION};
use http::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Result, TransferError};
use crate::{ProtocolMode, ResponseSummary};

/// Tuning handed through to the transport.
///
/// The two option strings are opaque: their syntax belongs to the multiplexed
/// transport, and they are forwarded exactly as given.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOptions {
    pub connection_options: Option<String>,
    pub client_connection_options: Option<String>,

    /// Skip certificate verification, for test servers with self-signed certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl TransportOptions {
    /// The experimental-options document for the multiplexed transport, or None when
    /// neither option string is set.
    pub fn experimental_options(&self) -> Option<String> {
        if self.connection_options.is_none() && self.client_connection_options.is_none() {
            return None;
        }

        let mut quic = Map::new();
        if let Some(options) = &self.connection_options {
            quic.insert("connection_options".to_owned(), Value::String(options.clone()));
        }
        if let Some(options) = &self.client_connection_options {
            quic.insert("client_connection_options".to_owned(), Value::String(options.clone()));
        }

        let mut root = Map::new();
        root.insert("QUIC".to_owned(), Value::Object(quic));
        Some(Value::Object(root).to_string())
    }
}

/// Builds the client for one stream.  Redirects are never followed and no timeouts are
/// set beyond the transport's defaults.
pub fn build_http_client(protocol: ProtocolMode, options: &TransportOptions) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder()
        .redirect(Policy::none())
        .danger_accept_invalid_certs(options.accept_invalid_certs);

    let builder = match protocol {
        ProtocolMode::Http11 => {
            debug!("Defaulting to http 1.1");
            builder.http1_only()
        },
        ProtocolMode::Http2 => {
            debug!("Enabling H2");
            builder.http2_prior_knowledge()
        },
        ProtocolMode::Multiplexed => multiplexed_transport(builder)?,
    };

    Ok(builder.build()?)
}

#[cfg(feature = "http3")]
fn multiplexed_transport(builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
    info!("Enabling QUIC");
    Ok(builder.http3_prior_knowledge())
}

#[cfg(not(feature = "http3"))]
fn multiplexed_transport(_builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
    info!("QUIC requested, but this build has no HTTP/3 support.");
    Err(TransferError::UnsupportedProtocol(
        "QUIC requires building transfer_client with the http3 feature".to_owned(),
    ))
}

/// Redirects are failures; every other status is passed through.
pub(crate) fn reject_redirect(response: &Response) -> Result<()> {
    if response.status().is_redirection() {
        let location = response
            .headers()
            .get(LOCATION)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();
        return Err(TransferError::RedirectReceived(location));
    }
    Ok(())
}

/// Status and headers of a non-redirect response.  Non-2xx statuses still count as a
/// completed stream; they are only logged.
pub(crate) fn summarize_response(stream_id: usize, response: &Response) -> ResponseSummary {
    let status = response.status();
    if !status.is_success() {
        warn!(stream_id, %status, url = %response.url(), "Server responded with a non-success status.");
    }
    ResponseSummary {
        status,
        headers: response.headers().clone(),
    }
}

/// The declared body length, or -1 if the response has no Content-Length header.
pub(crate) fn declared_content_length(headers: &HeaderMap) -> Result<i64> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(-1);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| TransferError::InvalidContentLength(String::from_utf8_lossy(value.as_bytes()).into_owned()))
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn test_experimental_options_forwarded_verbatim() {
        assert_eq!(TransportOptions::default().experimental_options(), None);

        let options = TransportOptions {
            connection_options: Some("TBBR,1RTT".to_owned()),
            client_connection_options: Some(" odd \"quoted\" value ".to_owned()),
            accept_invalid_certs: false,
        };

        let parsed: Value = serde_json::from_str(&options.experimental_options().unwrap()).unwrap();
        assert_eq!(parsed["QUIC"]["connection_options"], "TBBR,1RTT");
        assert_eq!(parsed["QUIC"]["client_connection_options"], " odd \"quoted\" value ");
    }

    #[test]
    fn test_experimental_options_only_include_present_keys() {
        let options = TransportOptions {
            client_connection_options: Some("ACKD".to_owned()),
            ..Default::default()
        };

        let parsed: Value = serde_json::from_str(&options.experimental_options().unwrap()).unwrap();
        let quic = parsed["QUIC"].as_object().unwrap();
        assert_eq!(quic.len(), 1);
        assert_eq!(quic["client_connection_options"], "ACKD");
    }

    #[test]
    fn test_declared_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_content_length(&headers).unwrap(), -1);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("32768"));
        assert_eq!(declared_content_length(&headers).unwrap(), 32768);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert!(matches!(
            declared_content_length(&headers),
            Err(TransferError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn test_build_clients() {
        assert!(build_http_client(ProtocolMode::Http11, &TransportOptions::default()).is_ok());
        assert!(build_http_client(ProtocolMode::Http2, &TransportOptions::default()).is_ok());

        #[cfg(not(feature = "http3"))]
        assert!(matches!(
            build_http_client(ProtocolMode::Multiplexed, &TransportOptions::default()),
            Err(TransferError::UnsupportedProtocol(_))
        ));
    }
}

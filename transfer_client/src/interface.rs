use std::fmt::Debug;
use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use url::Url;

use crate::error::Result;
use crate::StreamEvents;

/// Whether a session pushes bytes to the server or pulls them from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// The wire protocol a backend negotiates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolMode {
    #[default]
    #[serde(rename = "http1.1")]
    Http11,
    #[serde(rename = "http2")]
    Http2,
    /// Multiplexed streams over UDP (QUIC / HTTP/3).
    #[serde(rename = "quic")]
    Multiplexed,
}

/// Which backend implementation drives each stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A plain request/response connection; the body is written in a loop on a worker.
    Streaming,
    /// A connection-multiplexing transport that pulls body chunks when it is ready.
    #[default]
    Multiplexed,
}

/// Everything a backend needs to drive one stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    pub stream_id: usize,
    pub url: Url,
    pub direction: TransferDirection,
    /// Bytes to send; only meaningful for uploads.
    pub upload_bytes: u64,
}

/// The final response of a stream that completed without error.
#[derive(Clone, Debug, Default)]
pub struct ResponseSummary {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseSummary {
    /// One "name=value" line per header value, in response order.
    pub fn format_headers(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.headers.iter() {
            out.push_str(name.as_str());
            out.push('=');
            out.push_str(&String::from_utf8_lossy(value.as_bytes()));
            out.push('\n');
        }
        out
    }
}

/// Drives exactly one upload or download stream.
///
/// `start` must not block beyond issuing the work onto `runtime`.  Through `events`,
/// the backend reports the stream length once, then any number of completed byte
/// counts, then exactly one of succeeded, failed, or cancelled.  A 3xx response is a
/// failure; redirects are never followed.
///
/// `cancel` may be called any number of times, before or after the stream finished.
pub trait TransferBackend: Debug + Send + Sync {
    fn start(&self, runtime: &Handle, request: StreamRequest, events: StreamEvents);

    fn cancel(&self);
}

/// Constructs one backend per stream of a session.
pub trait BackendFactory: Debug + Send + Sync {
    fn create_backend(&self, stream_id: usize) -> Result<Arc<dyn TransferBackend>>;
}

#[cfg(test)]
mod tests {
    use http::header::{CONTENT_LENGTH, SERVER};
    use http::HeaderValue;

    use super::*;

    #[test]
    fn test_format_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1000"));
        headers.append(SERVER, HeaderValue::from_static("gfe"));
        headers.append(SERVER, HeaderValue::from_static("edge"));

        let summary = ResponseSummary {
            status: StatusCode::OK,
            headers,
        };
        let formatted = summary.format_headers();
        let mut lines: Vec<&str> = formatted.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["content-length=1000", "server=edge", "server=gfe"]);
        assert!(formatted.ends_with('\n'));
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(serde_json::to_string(&ProtocolMode::Multiplexed).unwrap(), "\"quic\"");
        assert_eq!(serde_json::from_str::<ProtocolMode>("\"http1.1\"").unwrap(), ProtocolMode::Http11);
        assert_eq!(serde_json::from_str::<TransferDirection>("\"upload\"").unwrap(), TransferDirection::Upload);
    }
}

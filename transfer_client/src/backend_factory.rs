use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, TransferError};
use crate::http_client::{build_http_client, TransportOptions};
use crate::{BackendFactory, BackendKind, HttpBackend, MultiplexedBackend, ProtocolMode, TransferBackend};

/// Creates reqwest-backed transfer backends.
///
/// One client is built up front and shared by every stream of the session; the
/// streams target distinct ports, so they still use distinct connections.
#[derive(Debug, Clone)]
pub struct ReqwestBackendFactory {
    kind: BackendKind,
    protocol: ProtocolMode,
    options: TransportOptions,
    client: reqwest::Client,
}

impl ReqwestBackendFactory {
    pub fn new(kind: BackendKind, protocol: ProtocolMode, options: TransportOptions) -> Result<Self> {
        if kind == BackendKind::Streaming && protocol != ProtocolMode::Http11 {
            return Err(TransferError::ConfigurationError(format!(
                "the streaming backend only speaks HTTP/1.1, not {protocol:?}"
            )));
        }

        let client = build_http_client(protocol, &options)?;
        Ok(Self::with_client(kind, protocol, options, client))
    }

    /// Uses the given client instead of building one for `protocol`.
    pub fn with_client(
        kind: BackendKind,
        protocol: ProtocolMode,
        options: TransportOptions,
        client: reqwest::Client,
    ) -> Self {
        Self {
            kind,
            protocol,
            options,
            client,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn protocol(&self) -> ProtocolMode {
        self.protocol
    }
}

impl BackendFactory for ReqwestBackendFactory {
    fn create_backend(&self, stream_id: usize) -> Result<Arc<dyn TransferBackend>> {
        debug!(stream_id, kind = ?self.kind, protocol = ?self.protocol, "Creating backend.");

        let backend: Arc<dyn TransferBackend> = match self.kind {
            BackendKind::Streaming => Arc::new(HttpBackend::new(self.client.clone())),
            BackendKind::Multiplexed => Arc::new(MultiplexedBackend::new(self.client.clone(), self.options.clone())),
        };
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_backend_requires_http11() {
        let err = ReqwestBackendFactory::new(BackendKind::Streaming, ProtocolMode::Http2, TransportOptions::default())
            .unwrap_err();
        assert!(err.is_configuration_error());

        let factory =
            ReqwestBackendFactory::new(BackendKind::Streaming, ProtocolMode::Http11, TransportOptions::default())
                .unwrap();
        assert!(factory.create_backend(0).is_ok());
    }

    #[test]
    fn test_multiplexed_backend_over_http2() {
        let factory =
            ReqwestBackendFactory::new(BackendKind::Multiplexed, ProtocolMode::Http2, TransportOptions::default())
                .unwrap();
        assert_eq!(factory.protocol(), ProtocolMode::Http2);
        assert!(factory.create_backend(3).is_ok());
    }
}

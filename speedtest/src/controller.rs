use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use transfer_client::{BackendFactory, ReqwestBackendFactory, TransferDirection};

use crate::config::SpeedTestConfig;
use crate::errors::{Result, SessionError};
use crate::session::{SessionStatus, TransferSession};
use crate::sink::{PresentationSink, TerminalStatus};

/// Front end for running speed tests one at a time.
///
/// Turns a [`SpeedTestConfig`] into a [`TransferSession`] with backends built for the
/// configured protocol, and routes all of the session's output to one sink.
pub struct SpeedTestController {
    sink: Arc<dyn PresentationSink>,

    // Used instead of building reqwest backends when set.
    backend_factory: Option<Arc<dyn BackendFactory>>,

    current: Mutex<Option<Arc<TransferSession>>>,
}

impl SpeedTestController {
    pub fn new(sink: Arc<dyn PresentationSink>) -> Self {
        Self {
            sink,
            backend_factory: None,
            current: Mutex::new(None),
        }
    }

    pub fn with_backend_factory(sink: Arc<dyn PresentationSink>, backend_factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            sink,
            backend_factory: Some(backend_factory),
            current: Mutex::new(None),
        }
    }

    /// Starts a new session.  Fails with [`SessionError::AlreadyActive`] while the
    /// previous one is still running.
    pub fn start(&self, config: SpeedTestConfig) -> Result<Arc<TransferSession>> {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|s| !s.status().is_terminal()) {
            return Err(SessionError::AlreadyActive);
        }

        let factory: Arc<dyn BackendFactory> = match &self.backend_factory {
            Some(factory) => factory.clone(),
            None => match ReqwestBackendFactory::new(config.backend, config.protocol, config.transport_options()) {
                Ok(factory) => Arc::new(factory),
                Err(e) => {
                    let e = SessionError::from(e);
                    self.sink.on_log(&format!("Exception:\n{e}"), true);
                    self.sink.on_terminal(TerminalStatus::Failed, &e.to_string());
                    self.sink.on_controls_reset();
                    return Err(e);
                },
            },
        };

        let session = TransferSession::start(&config, factory, self.sink.clone())?;
        info!(session_id = %session.id(), "Session started.");
        *current = Some(session.clone());
        Ok(session)
    }

    pub fn start_upload(&self, config: SpeedTestConfig) -> Result<Arc<TransferSession>> {
        self.start(SpeedTestConfig {
            direction: TransferDirection::Upload,
            ..config
        })
    }

    pub fn start_download(&self, config: SpeedTestConfig) -> Result<Arc<TransferSession>> {
        self.start(SpeedTestConfig {
            direction: TransferDirection::Download,
            ..config
        })
    }

    pub fn cancel(&self) -> Result<()> {
        let current = self.current.lock();
        match current.as_ref() {
            Some(session) if session.cancel() => Ok(()),
            _ => Err(SessionError::NoActiveSession),
        }
    }

    pub fn current_session(&self) -> Option<Arc<TransferSession>> {
        self.current.lock().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.current
            .lock()
            .as_ref()
            .map(|s| s.status())
            .unwrap_or(SessionStatus::Idle)
    }
}

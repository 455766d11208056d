#![cfg_attr(feature = "strict", deny(warnings))]

pub use backend_factory::ReqwestBackendFactory;
pub use error::{Result, TransferError};
pub use http_backend::HttpBackend;
pub use http_client::{build_http_client, TransportOptions};
pub use interface::{
    BackendFactory, BackendKind, ProtocolMode, ResponseSummary, StreamRequest, TransferBackend, TransferDirection,
};
pub use multiplexed_backend::MultiplexedBackend;
pub use random_payload::RandomPayload;
pub use stream_events::{StreamEvents, StreamOutcome, StreamTerminalEvent};
pub use upload_data_provider::{ReadCallback, UploadDataProvider};

mod backend_factory;
pub mod constants;
pub mod error;
mod http_backend;
mod http_client;
mod interface;
mod multiplexed_backend;
mod random_payload;
mod stream_events;
pub mod testing_utils;
mod upload_data_provider;

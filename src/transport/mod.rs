//! Transports carry encoded calls to the server and bring back raw returns.
//!
//! A transport never fails by `Err` on the call path: every outcome, including
//! connection and decode failures, is folded into an [`ApiReturn`].

pub mod http;
pub mod ws;

use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::ServiceDef;
use crate::types::{ApiError, ApiReturn};

pub use http::HttpTransport;
pub use ws::{InboundMsg, WsTransport};

/// One API call as handed to a transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub sn: u64,
    pub service: ServiceDef,
    pub params: Value,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform the call. Cancellation happens by dropping the returned future.
    async fn call(&self, req: ApiRequest) -> ApiReturn<Value>;

    /// Send a one-way message.
    async fn send_msg(&self, service: &ServiceDef, _msg: Value) -> Result<(), ApiError> {
        Err(ApiError::internal(format!(
            "Transport does not support messages (msg '{}')",
            service.name
        ))
        .with_code("UNSUPPORTED"))
    }
}

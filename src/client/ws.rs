use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::client::builder::ClientBuilder;
use crate::client::config::ClientConfig;
use crate::client::core::BaseClient;
use crate::protocol::ServiceProto;
use crate::transport::{InboundMsg, WsTransport};
use crate::types::ApiError;
use crate::Result;

/// Client that multiplexes calls over one WebSocket connection.
pub type WsClient = BaseClient<WsTransport>;

impl BaseClient<WsTransport> {
    /// Shorthand for `ClientBuilder::new(proto, config).build_ws()`.
    pub fn new(proto: ServiceProto, config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(proto, config).build_ws()
    }

    pub async fn connect(&self) -> std::result::Result<(), ApiError> {
        self.transport.connect().await
    }

    /// Close the connection. Calls waiting on it settle with a network error.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Listen for server-pushed messages named `name`.
    ///
    /// Only messages received after this call are observed.
    pub fn listen_msg(&self, name: &str) -> MsgListener {
        MsgListener {
            name: name.to_string(),
            rx: self.transport.subscribe(),
        }
    }
}

/// Stream of server-pushed messages with one name.
pub struct MsgListener {
    name: String,
    rx: broadcast::Receiver<InboundMsg>,
}

impl MsgListener {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next message payload, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if msg.service == self.name => return Some(msg.data),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(msg = self.name.as_str(), skipped, "message listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next message decoded as `T`. Payloads that do not decode are skipped.
    pub async fn recv_as<T: DeserializeOwned>(&mut self) -> Option<T> {
        loop {
            let data = self.recv().await?;
            match serde_json::from_value(data) {
                Ok(v) => return Some(v),
                Err(e) => tracing::warn!(msg = self.name.as_str(), "skipping undecodable message: {}", e),
            }
        }
    }
}

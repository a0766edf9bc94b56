use std::sync::Arc;

use crate::client::config::ClientConfig;
use crate::client::core::BaseClient;
use crate::interceptors::{Interceptor, InterceptorPipeline};
use crate::logger::{noop_sink, LogSink};
use crate::protocol::ServiceProto;
use crate::transport::{HttpTransport, Transport, WsTransport};
use crate::Result;

/// Builder for creating clients with custom configuration.
///
/// Keep this surface area small and predictable.
pub struct ClientBuilder {
    proto: ServiceProto,
    config: ClientConfig,
    logger: Arc<dyn LogSink>,
    interceptors: InterceptorPipeline,
    env_overrides: bool,
}

impl ClientBuilder {
    pub fn new(proto: ServiceProto, config: ClientConfig) -> Self {
        Self {
            proto,
            config,
            logger: noop_sink(),
            interceptors: InterceptorPipeline::new(),
            env_overrides: false,
        }
    }

    /// Inject a call event sink. Default is a no-op sink.
    pub fn logger(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.logger = sink;
        self
    }

    /// Append an interceptor. Hooks run in the order they were added.
    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors = self.interceptors.with(interceptor);
        self
    }

    /// Apply `RPCALL_*` environment overrides to the config at build time.
    pub fn with_env(mut self, enable: bool) -> Self {
        self.env_overrides = enable;
        self
    }

    fn finish(self) -> Result<(ServiceProto, ClientConfig, Arc<dyn LogSink>, InterceptorPipeline)> {
        self.proto.validate()?;
        let config = if self.env_overrides {
            self.config.with_env_overrides()
        } else {
            self.config
        };
        Ok((self.proto, config, self.logger, self.interceptors))
    }

    /// Build an HTTP client. The server must be an `http(s)://` URL.
    pub fn build_http(self) -> Result<BaseClient<HttpTransport>> {
        let (proto, config, logger, interceptors) = self.finish()?;
        config.validate(&["http", "https"])?;
        let transport = HttpTransport::new(&config)?;
        tracing::debug!(server = config.server.as_str(), json = config.json, "HTTP client built");
        Ok(BaseClient::from_parts(proto, config, transport, logger, interceptors))
    }

    /// Build a WebSocket client. The server must be a `ws(s)://` URL.
    ///
    /// The client starts disconnected; call `connect()` before calling APIs.
    pub fn build_ws(self) -> Result<BaseClient<WsTransport>> {
        let (proto, config, logger, interceptors) = self.finish()?;
        config.validate(&["ws", "wss"])?;
        let transport = WsTransport::with_logger(&config, logger.clone());
        tracing::debug!(server = config.server.as_str(), json = config.json, "WebSocket client built");
        Ok(BaseClient::from_parts(proto, config, transport, logger, interceptors))
    }

    /// Build a client over a caller-provided transport. The server URL is not checked.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<BaseClient<T>> {
        let (proto, config, logger, interceptors) = self.finish()?;
        Ok(BaseClient::from_parts(proto, config, transport, logger, interceptors))
    }
}

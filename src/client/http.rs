use crate::client::builder::ClientBuilder;
use crate::client::config::ClientConfig;
use crate::client::core::BaseClient;
use crate::protocol::ServiceProto;
use crate::transport::HttpTransport;
use crate::Result;

/// Client that sends each call as one HTTP POST.
pub type HttpClient = BaseClient<HttpTransport>;

impl BaseClient<HttpTransport> {
    /// Shorthand for `ClientBuilder::new(proto, config).build_http()`.
    pub fn new(proto: ServiceProto, config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(proto, config).build_http()
    }
}

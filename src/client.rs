//! Client surface: dispatcher, configuration and transport-specific clients.
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod config;
pub mod core;
pub mod http;
pub mod pending;
pub mod signals;
pub mod ws;

pub use builder::ClientBuilder;
pub use config::ClientConfig;
pub use self::core::BaseClient;
pub use http::HttpClient;
pub use pending::{CallOptions, CallOutcome, PendingCall};
pub use signals::SignalsSnapshot;
pub use ws::{MsgListener, WsClient};

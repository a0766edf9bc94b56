//! # rpcall
//!
//! 基于服务协议的 RPC 客户端：HTTP 与 WebSocket 两种传输，统一的返回值与可取消的调用。
//!
//! Protocol-driven RPC client over HTTP and WebSocket, with a unified return
//! type and cancellable calls.
//!
//! ## Overview
//!
//! A client is built from a [`ServiceProto`] (the list of APIs and messages the
//! server exposes) and a [`ClientConfig`]. Every call:
//!
//! - gets a unique, monotonically increasing sequence number (SN), readable
//!   immediately from the returned [`PendingCall`] and from `last_sn()`;
//! - settles exactly once, with an [`ApiReturn`] holding either the payload or
//!   an [`ApiError`] (`network`, `timeout`, `business` or `internal`);
//! - can be aborted by SN, by abort key, or all at once. An aborted call
//!   resolves to [`CallOutcome::Aborted`] and its late response is discarded.
//!
//! Calls never fail through `Result`; [`Error`] only covers building clients
//! and loading protocols.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rpcall::{ApiReturn, CallOptions, CallOutcome, ClientConfig, HttpClient, ServiceProto};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> rpcall::Result<()> {
//!     let proto = ServiceProto::load_from_file("proto.yaml").await?;
//!     let client = HttpClient::new(proto, ClientConfig::new("http://127.0.0.1:3000").json(true))?;
//!
//!     let call = client.call_api::<_, Value>("user/Login", &json!({"name": "alice"}), CallOptions::new());
//!     println!("sent SN {}", call.sn());
//!
//!     match call.await {
//!         CallOutcome::Settled(ApiReturn::Succ(res)) => println!("ok: {}", res),
//!         CallOutcome::Settled(ApiReturn::Err(err)) => println!("{} ({:?})", err.message, err.kind),
//!         CallOutcome::Aborted => println!("aborted"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Dispatcher, configuration, HTTP and WebSocket clients |
//! | [`registry`] | Cancellation registry (SN and abort-key bookkeeping) |
//! | [`types`] | `ApiReturn`, `ApiError`, `ErrorKind` |
//! | [`transport`] | `Transport` trait with HTTP and WebSocket implementations |
//! | [`codec`] | JSON / MessagePack frames and null pruning |
//! | [`protocol`] | Service protocol loading and validation |
//! | [`logger`] | Call event sinks |
//! | [`interceptors`] | Hooks around every call |

pub mod client;
pub mod codec;
pub mod interceptors;
pub mod logger;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{
    BaseClient, CallOptions, CallOutcome, ClientBuilder, ClientConfig, HttpClient, MsgListener,
    PendingCall, SignalsSnapshot, WsClient,
};
pub use logger::{CallEvent, LogSink};
pub use protocol::{ApiSpec, ServiceDef, ServiceProto};
pub use types::{ApiError, ApiReturn, ErrorKind};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

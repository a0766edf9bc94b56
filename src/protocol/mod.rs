//! 协议定义层：负责加载和校验服务协议（API 与消息列表）。
//!
//! # Service Protocol Layer
//!
//! A client is built against a [`ServiceProto`]: the list of APIs it may call
//! and messages it may send or receive. Protocols are plain YAML or JSON
//! documents, usually generated alongside the server.
//!
//! ```yaml
//! version: 3
//! services:
//!   - { id: 0, name: user/Login, type: api }
//!   - { id: 1, name: user/Logout, type: api, path: auth/logout }
//!   - { id: 2, name: chat/Notice, type: msg }
//! ```
//!
//! ## Example
//!
//! ```rust
//! use rpcall::protocol::ServiceProto;
//!
//! let proto = ServiceProto::from_yaml_str(
//!     "services:\n  - { id: 0, name: Hello, type: api }\n",
//! ).unwrap();
//! assert_eq!(proto.api("Hello").map(|s| s.path()), Some("Hello"));
//! ```

pub mod error;
pub mod proto;

pub use error::ProtocolError;
pub use proto::{ApiSpec, ServiceDef, ServiceKind, ServiceProto};

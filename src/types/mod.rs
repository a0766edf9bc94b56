//! 类型系统模块：定义调用结果与错误的统一表示。
//!
//! # Types Module
//!
//! Every call made through this crate settles into one shape, [`ApiReturn`],
//! whether it succeeded, was rejected by the server's business logic, hit a
//! network failure, timed out, or failed locally while encoding/decoding.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ApiReturn`] | Success payload XOR structured error |
//! | [`ApiError`] | Error carried by a failed return |
//! | [`ErrorKind`] | Discriminator: network, timeout, business, internal |
//!
//! ## Example
//!
//! ```rust
//! use rpcall::types::{ApiError, ApiReturn, ErrorKind};
//!
//! let ok: ApiReturn<u32> = ApiReturn::Succ(7);
//! assert!(ok.is_succ());
//!
//! let failed: ApiReturn<u32> = ApiReturn::Err(ApiError::business("Insufficient balance"));
//! match failed {
//!     ApiReturn::Succ(_) => unreachable!(),
//!     ApiReturn::Err(err) => assert_eq!(err.kind, ErrorKind::Business),
//! }
//! ```

pub mod api_return;

pub use api_return::{ApiError, ApiReturn, ErrorKind};

//! Unified call result.
//!
//! The wire form mirrors what servers send back:
//! `{"isSucc": true, "res": ...}` or `{"isSucc": false, "err": {...}}`.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Discriminator for [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport-level failure: connection refused, broken socket, bad HTTP status.
    Network,
    /// No response within the effective timeout.
    Timeout,
    /// The server handled the call and rejected it (application-level error).
    Business,
    /// Server-side internal failure, or a local encode/decode/config problem.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Business => "business",
            Self::Internal => "internal",
        }
    }

    /// Parse a wire name. Unknown names map to `Internal`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "network" => Self::Network,
            "timeout" => Self::Timeout,
            "business" => Self::Business,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

fn default_kind() -> ErrorKind {
    ErrorKind::Business
}

/// Structured error carried by a failed [`ApiReturn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ApiError {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: ErrorKind,
    pub message: String,
    /// Machine-readable code, e.g. `TIMEOUT`, `HTTP_502`, or an application code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            detail: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn business(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Business, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Outcome of a settled call: the response payload or an [`ApiError`], never both.
///
/// Accessing either side requires a `match` (or one of the accessors returning
/// `Option`), so the failure branch cannot be skipped silently.
#[must_use = "an ApiReturn may carry an error that should be handled"]
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReturn<Res> {
    Succ(Res),
    Err(ApiError),
}

impl<Res> ApiReturn<Res> {
    pub fn is_succ(&self) -> bool {
        matches!(self, Self::Succ(_))
    }

    pub fn res(&self) -> Option<&Res> {
        match self {
            Self::Succ(res) => Some(res),
            Self::Err(_) => None,
        }
    }

    pub fn err(&self) -> Option<&ApiError> {
        match self {
            Self::Succ(_) => None,
            Self::Err(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<Res, ApiError> {
        match self {
            Self::Succ(res) => Ok(res),
            Self::Err(err) => Err(err),
        }
    }

    pub fn map<U, F: FnOnce(Res) -> U>(self, f: F) -> ApiReturn<U> {
        match self {
            Self::Succ(res) => ApiReturn::Succ(f(res)),
            Self::Err(err) => ApiReturn::Err(err),
        }
    }
}

impl ApiReturn<Value> {
    /// Decode a JSON payload into a concrete response type.
    ///
    /// A payload that does not match `Res` becomes an `Internal` error.
    pub fn decode<Res: DeserializeOwned>(self) -> ApiReturn<Res> {
        match self {
            Self::Succ(value) => match serde_json::from_value(value) {
                Ok(res) => ApiReturn::Succ(res),
                Err(e) => ApiReturn::Err(
                    ApiError::internal(format!("Failed to decode response: {}", e))
                        .with_code("DECODE_RES"),
                ),
            },
            Self::Err(err) => ApiReturn::Err(err),
        }
    }
}

impl<Res> From<Result<Res, ApiError>> for ApiReturn<Res> {
    fn from(r: Result<Res, ApiError>) -> Self {
        match r {
            Ok(res) => Self::Succ(res),
            Err(err) => Self::Err(err),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BodyRef<'a, R> {
    is_succ: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    res: Option<&'a R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<&'a ApiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBody {
    is_succ: bool,
    #[serde(default)]
    res: Option<Value>,
    #[serde(default)]
    err: Option<ApiError>,
}

impl<R: Serialize> Serialize for ApiReturn<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            Self::Succ(res) => BodyRef {
                is_succ: true,
                res: Some(res),
                err: None,
            },
            Self::Err(err) => BodyRef {
                is_succ: false,
                res: None,
                err: Some(err),
            },
        };
        body.serialize(serializer)
    }
}

impl<'de, R: DeserializeOwned> Deserialize<'de> for ApiReturn<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let body = RawBody::deserialize(deserializer)?;
        if body.is_succ {
            // A successful call with no payload decodes as `null`.
            let value = body.res.unwrap_or(Value::Null);
            serde_json::from_value(value)
                .map(ApiReturn::Succ)
                .map_err(D::Error::custom)
        } else {
            body.err
                .map(ApiReturn::Err)
                .ok_or_else(|| D::Error::custom("`isSucc` is false but `err` is missing"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exactly_one_side_is_populated() {
        let ok: ApiReturn<i32> = ApiReturn::Succ(1);
        assert!(ok.is_succ());
        assert_eq!(ok.res(), Some(&1));
        assert!(ok.err().is_none());

        let failed: ApiReturn<i32> = ApiReturn::Err(ApiError::network("down"));
        assert!(!failed.is_succ());
        assert!(failed.res().is_none());
        assert_eq!(failed.err().map(|e| e.kind), Some(ErrorKind::Network));
    }

    #[test]
    fn test_wire_shape() {
        let ok: ApiReturn<Value> = ApiReturn::Succ(json!({"id": 3}));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"isSucc": true, "res": {"id": 3}})
        );

        let failed: ApiReturn<Value> =
            ApiReturn::Err(ApiError::business("Name taken").with_code("NAME_TAKEN"));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "isSucc": false,
                "err": {"type": "business", "message": "Name taken", "code": "NAME_TAKEN"}
            })
        );
    }

    #[test]
    fn test_deserialize_missing_err_is_rejected() {
        let r: Result<ApiReturn<Value>, _> = serde_json::from_value(json!({"isSucc": false}));
        assert!(r.is_err());
    }

    #[test]
    fn test_deserialize_missing_res_is_null() {
        let r: ApiReturn<Value> = serde_json::from_value(json!({"isSucc": true})).unwrap();
        assert_eq!(r, ApiReturn::Succ(Value::Null));
    }

    #[test]
    fn test_error_kind_defaults() {
        let err: ApiError = serde_json::from_value(json!({"message": "nope"})).unwrap();
        assert_eq!(err.kind, ErrorKind::Business);

        let err: ApiError =
            serde_json::from_value(json!({"type": "SomethingNew", "message": "x"})).unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn test_decode_mismatch_becomes_internal() {
        let raw: ApiReturn<Value> = ApiReturn::Succ(json!("not a number"));
        let typed: ApiReturn<u64> = raw.decode();
        let err = typed.err().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.code.as_deref(), Some("DECODE_RES"));
    }

    #[test]
    fn test_display() {
        let err = ApiError::timeout("Request timeout (100ms)");
        assert_eq!(err.to_string(), "timeout error: Request timeout (100ms)");
    }
}

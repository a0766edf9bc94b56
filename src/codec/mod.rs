//! Codec module - frame layout and payload encoding.
//!
//! Two encodings are supported, selected by the client's `json` switch:
//!
//! - [`Codec::Json`] - UTF-8 JSON, sent as WebSocket text frames
//! - [`Codec::MsgPack`] - MessagePack using `rmp-serde`, sent as binary
//!
//! MessagePack always goes through `to_vec_named` so structs are encoded as
//! maps; servers decode frames by field name, never by position.

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ClientConfig;
use crate::types::{ApiError, ApiReturn};

/// Payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    MsgPack,
}

impl Codec {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Codec::Json
        } else {
            Codec::MsgPack
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Codec::Json => "application/json",
            Codec::MsgPack => "application/msgpack",
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ApiError> {
        let encoded = match self {
            Codec::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            Codec::MsgPack => rmp_serde::to_vec_named(value).map_err(|e| e.to_string()),
        };
        encoded.map_err(|e| {
            ApiError::internal(format!("Failed to encode frame: {}", e)).with_code("ENCODE")
        })
    }

    pub fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, ApiError> {
        let decoded = match self {
            Codec::Json => serde_json::from_slice(buf).map_err(|e| e.to_string()),
            Codec::MsgPack => rmp_serde::from_slice(buf).map_err(|e| e.to_string()),
        };
        decoded.map_err(|e| {
            ApiError::internal(format!("Failed to decode frame: {}", e)).with_code("DECODE")
        })
    }
}

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Req {
        service: String,
        sn: u64,
        data: Value,
    },
    Msg {
        service: String,
        data: Value,
    },
}

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Res {
        sn: u64,
        #[serde(rename = "isSucc")]
        is_succ: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        res: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<ApiError>,
    },
    Msg {
        service: String,
        data: Value,
    },
}

impl ServerFrame {
    /// Build a response frame from a return value.
    pub fn response(sn: u64, ret: ApiReturn<Value>) -> Self {
        match ret {
            ApiReturn::Succ(res) => ServerFrame::Res {
                sn,
                is_succ: true,
                res: Some(res),
                err: None,
            },
            ApiReturn::Err(err) => ServerFrame::Res {
                sn,
                is_succ: false,
                res: None,
                err: Some(err),
            },
        }
    }
}

/// Convert the fields of a `res` frame into a return value.
pub(crate) fn frame_return(is_succ: bool, res: Option<Value>, err: Option<ApiError>) -> ApiReturn<Value> {
    if is_succ {
        return ApiReturn::Succ(res.unwrap_or(Value::Null));
    }
    match err {
        Some(err) => ApiReturn::Err(err),
        None => ApiReturn::Err(
            ApiError::internal("Invalid response frame: `isSucc` is false but `err` is missing")
                .with_code("DECODE"),
        ),
    }
}

/// Remove `null` object members recursively.
pub fn prune_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                prune_nulls(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                prune_nulls(v);
            }
        }
        _ => {}
    }
}

/// Encoding settings derived from a client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFormat {
    pub codec: Codec,
    pub json_prune: bool,
    pub debug_buf: bool,
}

impl WireFormat {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            codec: Codec::from_json_flag(config.json),
            json_prune: config.json_prune,
            debug_buf: config.debug_buf,
        }
    }

    /// Apply JSON pruning to an outgoing payload when enabled.
    pub fn prepare(&self, mut data: Value) -> Value {
        if self.codec == Codec::Json && self.json_prune {
            prune_nulls(&mut data);
        }
        data
    }

    pub fn encode_frame(&self, frame: &ClientFrame) -> Result<Vec<u8>, ApiError> {
        let buf = self.codec.encode(frame)?;
        if self.debug_buf {
            log_buf("send", &buf);
        }
        Ok(buf)
    }

    pub fn decode_frame(&self, buf: &[u8]) -> Result<ServerFrame, ApiError> {
        if self.debug_buf {
            log_buf("recv", buf);
        }
        self.codec.decode(buf)
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ApiError> {
        let buf = self.codec.encode(value)?;
        if self.debug_buf {
            log_buf("send", &buf);
        }
        Ok(buf)
    }

    pub fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, ApiError> {
        if self.debug_buf {
            log_buf("recv", buf);
        }
        self.codec.decode(buf)
    }
}

fn log_buf(direction: &'static str, buf: &[u8]) {
    tracing::debug!(
        direction,
        len = buf.len(),
        buf = %base64::engine::general_purpose::STANDARD.encode(buf),
        "wire buffer"
    );
}

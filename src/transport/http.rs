use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Proxy;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

use super::{ApiRequest, Transport};
use crate::client::ClientConfig;
use crate::codec::{frame_return, ClientFrame, Codec, ServerFrame, WireFormat};
use crate::protocol::ServiceDef;
use crate::types::{ApiError, ApiReturn};
use crate::{ErrorContext, Result};

/// Upper bound on how much of an unparseable body is kept in error details.
const MAX_DETAIL_BODY: usize = 512;

/// One POST per call.
///
/// - JSON mode: `POST {server}/{path}` with the params as body.
/// - Binary mode: `POST {server}/` with a MessagePack `req` frame as body.
pub struct HttpTransport {
    client: reqwest::Client,
    server: String,
    wire: WireFormat,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(
                env::var("RPCALL_HTTP_POOL_MAX_IDLE")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("RPCALL_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("RPCALL_PROXY_URL") {
            match Proxy::all(&proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => tracing::warn!(proxy = proxy_url.as_str(), "ignoring invalid proxy: {}", e),
            }
        }

        let client = builder.build().map_err(|e| {
            crate::Error::transport_with_context(
                e.to_string(),
                ErrorContext::new().with_source("http_transport"),
            )
        })?;

        Ok(Self {
            client,
            server: config.server.trim_end_matches('/').to_string(),
            wire: WireFormat::from_config(config),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.server, path.trim_start_matches('/'))
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> std::result::Result<(u16, bytes::Bytes), ApiError> {
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, self.wire.codec.content_type())
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(map_reqwest_error)?;
        Ok((status, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, req: ApiRequest) -> ApiReturn<Value> {
        let data = self.wire.prepare(req.params);
        let (url, body) = match self.wire.codec {
            Codec::Json => (self.url(req.service.path()), self.wire.encode(&data)),
            Codec::MsgPack => (
                self.url(""),
                self.wire.encode_frame(&ClientFrame::Req {
                    service: req.service.name.clone(),
                    sn: req.sn,
                    data,
                }),
            ),
        };
        let body = match body {
            Ok(b) => b,
            Err(e) => return ApiReturn::Err(e),
        };

        match self.post(&url, body).await {
            Ok((status, bytes)) => decode_response(&self.wire, req.sn, status, &bytes),
            Err(e) => ApiReturn::Err(e),
        }
    }

    async fn send_msg(&self, service: &ServiceDef, msg: Value) -> std::result::Result<(), ApiError> {
        let data = self.wire.prepare(msg);
        let (url, body) = match self.wire.codec {
            Codec::Json => (self.url(service.path()), self.wire.encode(&data)?),
            Codec::MsgPack => (
                self.url(""),
                self.wire.encode_frame(&ClientFrame::Msg {
                    service: service.name.clone(),
                    data,
                })?,
            ),
        };
        let (status, body) = self.post(&url, body).await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(http_status_error(status, &body))
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::timeout(e.to_string()).with_code("TIMEOUT")
    } else if e.is_connect() {
        ApiError::network(e.to_string()).with_code("CONNECT")
    } else {
        ApiError::network(e.to_string())
    }
}

fn http_status_error(status: u16, body: &[u8]) -> ApiError {
    let text = String::from_utf8_lossy(body);
    let text: String = text.chars().take(MAX_DETAIL_BODY).collect();
    ApiError::network(format!("HTTP {}", status))
        .with_code(format!("HTTP_{}", status))
        .with_detail(json!({ "status": status, "body": text }))
}

/// Turn an HTTP response into a return value.
///
/// A body that decodes as a return wins regardless of status: servers report
/// business errors with non-2xx statuses too. Otherwise a non-2xx status is a
/// network error and a 2xx status with garbage is an internal error.
pub(crate) fn decode_response(wire: &WireFormat, sn: u64, status: u16, body: &[u8]) -> ApiReturn<Value> {
    let decoded: std::result::Result<ApiReturn<Value>, ApiError> = match wire.codec {
        Codec::Json => wire.decode::<ApiReturn<Value>>(body),
        Codec::MsgPack => wire.decode_frame(body).and_then(|frame| match frame {
            ServerFrame::Res {
                sn: res_sn,
                is_succ,
                res,
                err,
            } => {
                if res_sn != sn {
                    return Err(ApiError::internal(format!(
                        "Response SN mismatch: sent {}, got {}",
                        sn, res_sn
                    ))
                    .with_code("SN_MISMATCH"));
                }
                Ok(frame_return(is_succ, res, err))
            }
            ServerFrame::Msg { service, .. } => Err(ApiError::internal(format!(
                "Unexpected message frame '{}' in HTTP response",
                service
            ))
            .with_code("DECODE")),
        }),
    };

    match decoded {
        Ok(ret) => ret,
        Err(_) if !(200..300).contains(&status) => ApiReturn::Err(http_status_error(status, body)),
        Err(e) => ApiReturn::Err(e),
    }
}

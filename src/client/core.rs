use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::client::config::ClientConfig;
use crate::client::pending::{CallOptions, CallOutcome, PendingCall};
use crate::client::signals::SignalsSnapshot;
use crate::interceptors::{CallContext, InterceptorPipeline};
use crate::logger::{CallEvent, LogSink, MsgDirection};
use crate::protocol::{ApiSpec, ServiceDef, ServiceProto};
use crate::registry::{AbortRegistry, AbortSignal, RegistrySnapshot};
use crate::transport::{ApiRequest, Transport};
use crate::types::{ApiError, ApiReturn};

/// RPC client over any [`Transport`].
///
/// Owns the SN counter and the abort registry. Every call runs as its own
/// Tokio task and settles exactly once, either with an [`ApiReturn`] or as
/// [`CallOutcome::Aborted`].
///
/// Dropping the client aborts everything still pending.
pub struct BaseClient<T: Transport> {
    pub(crate) proto: Arc<ServiceProto>,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) transport: Arc<T>,
    pub(crate) registry: Arc<AbortRegistry>,
    pub(crate) logger: Arc<dyn LogSink>,
    pub(crate) interceptors: Arc<InterceptorPipeline>,
    next_sn: AtomicU64,
    last_sn: AtomicU64,
}

impl<T: Transport> BaseClient<T> {
    pub(crate) fn from_parts(
        proto: ServiceProto,
        config: ClientConfig,
        transport: T,
        logger: Arc<dyn LogSink>,
        interceptors: InterceptorPipeline,
    ) -> Self {
        Self {
            proto: Arc::new(proto),
            config: Arc::new(config),
            transport: Arc::new(transport),
            registry: Arc::new(AbortRegistry::new()),
            logger,
            interceptors: Arc::new(interceptors),
            next_sn: AtomicU64::new(1),
            last_sn: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn proto(&self) -> &ServiceProto {
        &self.proto
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// SN of the most recently initiated call, `0` before the first one.
    pub fn last_sn(&self) -> u64 {
        self.last_sn.load(Ordering::SeqCst)
    }

    /// Start a call. The SN is assigned and registered before this returns.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn call_api<Req, Res>(&self, api: &str, params: &Req, options: CallOptions) -> PendingCall<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
    {
        let sn = self.next_sn.fetch_add(1, Ordering::SeqCst);
        self.last_sn.store(sn, Ordering::SeqCst);
        let abort = self.registry.register(sn, api, options.abort_key.clone());

        let prepared = self.prepare(api, params);
        let task = CallTask {
            ctx: CallContext {
                sn,
                api: api.to_string(),
                abort_key: options.abort_key,
            },
            prepared,
            // Zero means no timeout, same as the configured default.
            timeout: options
                .timeout
                .filter(|d| !d.is_zero())
                .or_else(|| self.config.timeout_duration()),
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            logger: self.logger.clone(),
            interceptors: self.interceptors.clone(),
        };

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = task.run::<Res>(abort).await;
            let _ = tx.send(outcome);
        });
        PendingCall::new(sn, rx)
    }

    /// Typed call through an [`ApiSpec`] descriptor.
    pub fn call<A: ApiSpec>(&self, req: &A::Req, options: CallOptions) -> PendingCall<A::Res> {
        self.call_api::<A::Req, A::Res>(A::NAME, req, options)
    }

    fn prepare<Req: Serialize + ?Sized>(&self, api: &str, params: &Req) -> Result<(ServiceDef, Value), ApiError> {
        let service = self.proto.api(api).cloned().ok_or_else(|| {
            ApiError::internal(format!("Invalid api name: {}", api)).with_code("INVALID_API_NAME")
        })?;
        let params = serde_json::to_value(params).map_err(|e| {
            ApiError::internal(format!("Failed to encode params of '{}': {}", api, e))
                .with_code("ENCODE_REQ")
        })?;
        Ok((service, params))
    }

    /// Send a one-way message declared as `msg` in the protocol.
    pub async fn send_msg<M: Serialize + ?Sized>(&self, name: &str, msg: &M) -> Result<(), ApiError> {
        let service = self.proto.msg(name).ok_or_else(|| {
            ApiError::internal(format!("Invalid msg name: {}", name)).with_code("INVALID_MSG_NAME")
        })?;
        let data = serde_json::to_value(msg).map_err(|e| {
            ApiError::internal(format!("Failed to encode msg '{}': {}", name, e)).with_code("ENCODE_MSG")
        })?;
        self.logger
            .report(CallEvent::Msg {
                direction: MsgDirection::Send,
                service: name.to_string(),
                data: data.clone(),
            })
            .await;
        self.transport.send_msg(service, data).await
    }

    /// Abort one pending call. Returns `false` if it already settled.
    pub fn abort(&self, sn: u64) -> bool {
        let aborted = self.registry.abort(sn);
        if aborted {
            debug!(sn, "call aborted");
        }
        aborted
    }

    /// Abort every pending call tagged with `key`. Returns the aborted SNs.
    pub fn abort_by_key(&self, key: &str) -> Vec<u64> {
        let aborted: Vec<u64> = self.registry.abort_by_key(key).into_iter().map(|c| c.sn).collect();
        if !aborted.is_empty() {
            debug!(abort_key = key, count = aborted.len(), "calls aborted by key");
        }
        aborted
    }

    /// Abort every pending call. Returns the aborted SNs.
    pub fn abort_all(&self) -> Vec<u64> {
        let aborted: Vec<u64> = self.registry.abort_all().into_iter().map(|c| c.sn).collect();
        if !aborted.is_empty() {
            info!(count = aborted.len(), "all pending calls aborted");
        }
        aborted
    }

    pub fn is_pending(&self, sn: u64) -> bool {
        self.registry.is_pending(sn)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    /// Snapshot current runtime signals (facts only).
    pub fn signals(&self) -> SignalsSnapshot {
        SignalsSnapshot {
            last_sn: self.last_sn(),
            registry: self.registry.snapshot(),
        }
    }
}

impl<T: Transport> Drop for BaseClient<T> {
    fn drop(&mut self) {
        let aborted = self.registry.abort_all();
        if !aborted.is_empty() {
            debug!(count = aborted.len(), "client dropped with pending calls");
        }
    }
}

/// Drops the registry entry if the call task goes away without settling,
/// e.g. when a transport or interceptor panics.
struct SettleGuard {
    registry: Arc<AbortRegistry>,
    sn: u64,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if self.registry.complete(self.sn) {
            tracing::warn!(sn = self.sn, "call task ended without settling");
        }
    }
}

/// Everything a spawned call needs, detached from the client.
struct CallTask<T: Transport> {
    ctx: CallContext,
    prepared: Result<(ServiceDef, Value), ApiError>,
    timeout: Option<Duration>,
    transport: Arc<T>,
    registry: Arc<AbortRegistry>,
    logger: Arc<dyn LogSink>,
    interceptors: Arc<InterceptorPipeline>,
}

impl<T: Transport> CallTask<T> {
    async fn run<Res: DeserializeOwned>(self, mut abort: AbortSignal) -> CallOutcome<Res> {
        let started = Instant::now();
        let sn = self.ctx.sn;
        let api = self.ctx.api.clone();
        let _settle = SettleGuard {
            registry: self.registry.clone(),
            sn,
        };

        let params = self
            .prepared
            .as_ref()
            .map(|(_, params)| params.clone())
            .unwrap_or(Value::Null);
        self.logger
            .report(CallEvent::ApiReq {
                sn,
                api: api.clone(),
                params,
            })
            .await;

        let finished = {
            let exec = self.execute();
            tokio::select! {
                biased;
                _ = &mut abort => None,
                ret = exec => Some(ret),
            }
        };

        // The registry decides: a call aborted while its result was in flight stays aborted.
        let ret = match finished {
            Some(ret) if self.registry.complete(sn) => ret,
            _ => {
                debug!(sn, api = api.as_str(), "discarding result of aborted call");
                self.logger.report(CallEvent::Abort { sn, api }).await;
                return CallOutcome::Aborted;
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let raw = match &ret {
            ApiReturn::Succ(res) => res.clone(),
            ApiReturn::Err(_) => Value::Null,
        };
        let ret = ret.decode::<Res>();
        let event = match &ret {
            ApiReturn::Succ(_) => {
                debug!(sn, api = api.as_str(), duration_ms, "call succeeded");
                CallEvent::ApiRes {
                    sn,
                    api,
                    res: raw,
                    duration_ms,
                }
            }
            ApiReturn::Err(err) => {
                debug!(sn, api = api.as_str(), duration_ms, kind = %err.kind, "call failed");
                CallEvent::ApiErr {
                    sn,
                    api,
                    err: err.clone(),
                    duration_ms,
                }
            }
        };
        self.logger.report(event).await;
        CallOutcome::Settled(ret)
    }

    /// Interceptors around the transport call, bounded by the timeout.
    async fn execute(&self) -> ApiReturn<Value> {
        let (service, params) = match &self.prepared {
            Ok((service, params)) => (service.clone(), params.clone()),
            Err(e) => return ApiReturn::Err(e.clone()),
        };
        let sn = self.ctx.sn;
        let transport = self.transport.clone();
        let timeout = self.timeout;

        self.interceptors
            .execute(&self.ctx, params, |params| async move {
                let call = transport.call(ApiRequest {
                    sn,
                    service,
                    params,
                });
                match timeout {
                    Some(limit) => match tokio::time::timeout(limit, call).await {
                        Ok(ret) => ret,
                        Err(_) => ApiReturn::Err(
                            ApiError::timeout(format!("Request timeout ({}ms)", limit.as_millis()))
                                .with_code("TIMEOUT"),
                        ),
                    },
                    None => call.await,
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::InMemoryLogSink;
    use crate::types::ErrorKind;
    use async_trait::async_trait;
    use serde_json::json;

    /// Echoes params back after `delay`.
    struct Echo {
        delay: Duration,
    }

    #[async_trait]
    impl Transport for Echo {
        async fn call(&self, req: ApiRequest) -> ApiReturn<Value> {
            tokio::time::sleep(self.delay).await;
            ApiReturn::Succ(req.params)
        }
    }

    fn client(delay_ms: u64, logger: Arc<dyn LogSink>) -> BaseClient<Echo> {
        BaseClient::from_parts(
            ServiceProto::new(vec![ServiceDef::api(0, "Echo"), ServiceDef::msg(1, "Ping")]),
            ClientConfig::new("http://127.0.0.1:1"),
            Echo {
                delay: Duration::from_millis(delay_ms),
            },
            logger,
            InterceptorPipeline::new(),
        )
    }

    #[tokio::test]
    async fn test_sn_starts_at_one_and_increases() {
        let c = client(0, crate::logger::noop_sink());
        assert_eq!(c.last_sn(), 0);
        let a = c.call_api::<_, Value>("Echo", &json!({}), CallOptions::new());
        let b = c.call_api::<_, Value>("Echo", &json!({}), CallOptions::new());
        assert_eq!(a.sn(), 1);
        assert_eq!(b.sn(), 2);
        assert_eq!(c.last_sn(), 2);
        let _ = a.await;
        let _ = b.await;
    }

    #[tokio::test]
    async fn test_success_decodes_and_logs() {
        let sink = Arc::new(InMemoryLogSink::new(16));
        let c = client(0, sink.clone());
        let call = c.call_api::<_, Value>("Echo", &json!({"x": 1}), CallOptions::new());
        let sn = call.sn();
        let outcome = call.await;
        assert_eq!(outcome, CallOutcome::Settled(ApiReturn::Succ(json!({"x": 1}))));
        assert_eq!(c.pending_count(), 0);

        let events = sink.events_for(sn);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CallEvent::ApiReq { .. }));
        assert!(matches!(events[1], CallEvent::ApiRes { .. }));
    }

    #[tokio::test]
    async fn test_unknown_api_settles_with_internal_error() {
        let c = client(0, crate::logger::noop_sink());
        let ret = c
            .call_api::<_, Value>("Nope", &json!({}), CallOptions::new())
            .await
            .into_return()
            .unwrap();
        let err = ret.err().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.code.as_deref(), Some("INVALID_API_NAME"));
    }

    #[tokio::test]
    async fn test_timeout_settles_with_timeout_error() {
        let c = client(200, crate::logger::noop_sink());
        let opts = CallOptions::new().timeout(Duration::from_millis(20));
        let ret = c
            .call_api::<_, Value>("Echo", &json!({}), opts)
            .await
            .into_return()
            .unwrap();
        let err = ret.err().cloned().unwrap();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.message, "Request timeout (20ms)");
    }

    #[tokio::test]
    async fn test_zero_call_timeout_means_none() {
        let c = client(20, crate::logger::noop_sink());
        let opts = CallOptions::new().timeout(Duration::ZERO);
        let outcome = c.call_api::<_, Value>("Echo", &json!(1), opts).await;
        assert_eq!(outcome, CallOutcome::Settled(ApiReturn::Succ(json!(1))));
    }

    #[tokio::test]
    async fn test_zero_call_timeout_falls_back_to_config() {
        let c = BaseClient::from_parts(
            ServiceProto::new(vec![ServiceDef::api(0, "Echo")]),
            ClientConfig::new("http://127.0.0.1:1").timeout_ms(10),
            Echo {
                delay: Duration::from_millis(200),
            },
            crate::logger::noop_sink(),
            InterceptorPipeline::new(),
        );
        let opts = CallOptions::new().timeout(Duration::ZERO);
        let ret = c
            .call_api::<_, Value>("Echo", &json!(1), opts)
            .await
            .into_return()
            .unwrap();
        assert_eq!(ret.err().map(|e| e.kind), Some(ErrorKind::Timeout));
    }

    struct Explode;

    #[async_trait]
    impl Transport for Explode {
        async fn call(&self, _req: ApiRequest) -> ApiReturn<Value> {
            panic!("transport blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_transport_leaves_nothing_pending() {
        let c = BaseClient::from_parts(
            ServiceProto::new(vec![ServiceDef::api(0, "Echo")]),
            ClientConfig::new("http://127.0.0.1:1"),
            Explode,
            crate::logger::noop_sink(),
            InterceptorPipeline::new(),
        );
        let call = c.call_api::<_, Value>("Echo", &json!({}), CallOptions::new());
        let sn = call.sn();
        let err = call.await.into_return().and_then(|r| r.err().cloned()).unwrap();
        assert_eq!(err.code.as_deref(), Some("TASK_LOST"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!c.is_pending(sn));
        assert!(!c.abort(sn));
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_is_internal() {
        let c = client(0, crate::logger::noop_sink());
        let ret = c
            .call_api::<_, u32>("Echo", &json!("not a number"), CallOptions::new())
            .await
            .into_return()
            .unwrap();
        assert_eq!(ret.err().map(|e| e.kind), Some(ErrorKind::Internal));
    }

    #[tokio::test]
    async fn test_abort_then_abort_again_is_noop() {
        let sink = Arc::new(InMemoryLogSink::new(16));
        let c = client(200, sink.clone());
        let call = c.call_api::<_, Value>("Echo", &json!({}), CallOptions::new());
        let sn = call.sn();
        assert!(c.abort(sn));
        assert!(!c.abort(sn));
        assert!(call.await.is_aborted());
        assert!(sink
            .events_for(sn)
            .iter()
            .any(|e| matches!(e, CallEvent::Abort { .. })));
    }

    #[tokio::test]
    async fn test_send_msg_unknown_name() {
        let c = client(0, crate::logger::noop_sink());
        let err = c.send_msg("Echo", &json!({})).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("INVALID_MSG_NAME"));
    }
}

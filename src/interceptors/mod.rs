//! Interceptor hooks around every call.
//!
//! Hooks run inside the call task, after the SN is registered:
//! - `before_call` may rewrite the outgoing params, or reject the call by
//!   returning an error (the transport is then never invoked);
//! - `after_return` observes the raw return before it is decoded.
//!
//! Aborted calls skip `after_return`.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{ApiError, ApiReturn};

/// Minimal call context passed to interceptors.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub sn: u64,
    pub api: String,
    pub abort_key: Option<String>,
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn before_call(&self, _ctx: &CallContext, _params: &mut Value) -> Option<ApiError> {
        None
    }

    async fn after_return(&self, _ctx: &CallContext, _ret: &ApiReturn<Value>) {}
}

/// Runs hooks in registration order.
pub struct InterceptorPipeline {
    pub(crate) interceptors: Vec<Box<dyn Interceptor>>,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    pub fn with<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run hooks around a provided async function that performs the actual call.
    ///
    /// The first `before_call` rejection wins; later hooks do not run.
    pub async fn execute<F, Fut>(&self, ctx: &CallContext, mut params: Value, f: F) -> ApiReturn<Value>
    where
        F: FnOnce(Value) -> Fut,
        Fut: std::future::Future<Output = ApiReturn<Value>>,
    {
        let mut rejected = None;
        for ic in &self.interceptors {
            if let Some(err) = ic.before_call(ctx, &mut params).await {
                rejected = Some(err);
                break;
            }
        }

        let ret = match rejected {
            Some(err) => ApiReturn::Err(err),
            None => f(params).await,
        };

        for ic in &self.interceptors {
            ic.after_return(ctx, &ret).await;
        }
        ret
    }
}

impl Default for InterceptorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct AddToken;

    #[async_trait]
    impl Interceptor for AddToken {
        async fn before_call(&self, _ctx: &CallContext, params: &mut Value) -> Option<ApiError> {
            if let Value::Object(map) = params {
                map.insert("token".into(), json!("t-1"));
            }
            None
        }
    }

    struct DenyAll;

    #[async_trait]
    impl Interceptor for DenyAll {
        async fn before_call(&self, _ctx: &CallContext, _params: &mut Value) -> Option<ApiError> {
            Some(ApiError::business("login required").with_code("NEED_LOGIN"))
        }
    }

    struct CountReturns(Arc<AtomicUsize>);

    #[async_trait]
    impl Interceptor for CountReturns {
        async fn after_return(&self, _ctx: &CallContext, _ret: &ApiReturn<Value>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ctx() -> CallContext {
        CallContext {
            sn: 1,
            api: "A".into(),
            abort_key: None,
        }
    }

    #[tokio::test]
    async fn test_before_call_rewrites_params() {
        let pipeline = InterceptorPipeline::new().with(AddToken);
        let ret = pipeline
            .execute(&ctx(), json!({"q": 1}), |p| async move { ApiReturn::Succ(p) })
            .await;
        assert_eq!(ret, ApiReturn::Succ(json!({"q": 1, "token": "t-1"})));
    }

    #[tokio::test]
    async fn test_rejection_skips_transport_but_not_after_return() {
        let count = Arc::new(AtomicUsize::new(0));
        let called = Arc::new(AtomicUsize::new(0));
        let pipeline = InterceptorPipeline::new()
            .with(DenyAll)
            .with(CountReturns(count.clone()));

        let called_in = called.clone();
        let ret = pipeline
            .execute(&ctx(), json!({}), |p| async move {
                called_in.fetch_add(1, Ordering::SeqCst);
                ApiReturn::Succ(p)
            })
            .await;

        assert_eq!(ret.err().and_then(|e| e.code.as_deref()), Some("NEED_LOGIN"));
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

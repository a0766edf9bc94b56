//! Handles returned by `call_api`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::types::{ApiError, ApiReturn};

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Group tag for [`abort_by_key`](crate::BaseClient::abort_by_key).
    pub abort_key: Option<String>,
    /// Overrides the client's default timeout for this call. Zero falls back to the default.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort_key(mut self, key: impl Into<String>) -> Self {
        self.abort_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// How a call ended.
#[must_use = "a settled call may carry an error that should be handled"]
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<Res> {
    /// The call ran to completion; exactly one of payload or error is present.
    Settled(ApiReturn<Res>),
    /// The call was aborted while pending. Any late response was discarded.
    Aborted,
}

impl<Res> CallOutcome<Res> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn settled(&self) -> Option<&ApiReturn<Res>> {
        match self {
            Self::Settled(ret) => Some(ret),
            Self::Aborted => None,
        }
    }

    pub fn into_return(self) -> Option<ApiReturn<Res>> {
        match self {
            Self::Settled(ret) => Some(ret),
            Self::Aborted => None,
        }
    }
}

/// An in-flight call.
///
/// The SN is available immediately; awaiting yields the [`CallOutcome`].
/// Dropping the handle does not abort the call.
#[derive(Debug)]
pub struct PendingCall<Res> {
    sn: u64,
    rx: oneshot::Receiver<CallOutcome<Res>>,
}

impl<Res> PendingCall<Res> {
    pub(crate) fn new(sn: u64, rx: oneshot::Receiver<CallOutcome<Res>>) -> Self {
        Self { sn, rx }
    }

    pub fn sn(&self) -> u64 {
        self.sn
    }
}

impl<Res> Future for PendingCall<Res> {
    type Output = CallOutcome<Res>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The call task was torn down (runtime shutdown or panic).
            Poll::Ready(Err(_)) => Poll::Ready(CallOutcome::Settled(ApiReturn::Err(
                ApiError::internal("Call task ended without settling").with_code("TASK_LOST"),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_call_resolves_outcome() {
        let (tx, rx) = oneshot::channel();
        let call = PendingCall::new(3, rx);
        assert_eq!(call.sn(), 3);
        tx.send(CallOutcome::Settled(ApiReturn::Succ(1u8))).unwrap();
        assert_eq!(call.await, CallOutcome::Settled(ApiReturn::Succ(1u8)));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_task_lost() {
        let (tx, rx) = oneshot::channel::<CallOutcome<u8>>();
        drop(tx);
        let outcome = PendingCall::new(1, rx).await;
        let err = outcome.into_return().and_then(|r| r.err().cloned()).unwrap();
        assert_eq!(err.code.as_deref(), Some("TASK_LOST"));
    }

    #[test]
    fn test_options_builder() {
        let opts = CallOptions::new()
            .abort_key("page")
            .timeout(Duration::from_millis(50));
        assert_eq!(opts.abort_key.as_deref(), Some("page"));
        assert_eq!(opts.timeout, Some(Duration::from_millis(50)));
    }
}

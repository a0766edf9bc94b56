//! Call event sinks.
//!
//! Every call reports its lifecycle to the client's [`LogSink`]: the request
//! as sent, then exactly one of response, error, or abort. Messages sent or
//! received over a transport are reported too. The default sink discards
//! everything; [`TracingLogSink`] forwards events to `tracing`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::types::ApiError;

/// Direction of a one-way message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgDirection {
    Send,
    Recv,
}

/// One observable step of a call or message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallEvent {
    ApiReq {
        sn: u64,
        api: String,
        params: Value,
    },
    ApiRes {
        sn: u64,
        api: String,
        res: Value,
        duration_ms: u64,
    },
    ApiErr {
        sn: u64,
        api: String,
        err: ApiError,
        duration_ms: u64,
    },
    Abort {
        sn: u64,
        api: String,
    },
    Msg {
        direction: MsgDirection,
        service: String,
        data: Value,
    },
}

impl CallEvent {
    pub fn sn(&self) -> Option<u64> {
        match self {
            CallEvent::ApiReq { sn, .. }
            | CallEvent::ApiRes { sn, .. }
            | CallEvent::ApiErr { sn, .. }
            | CallEvent::Abort { sn, .. } => Some(*sn),
            CallEvent::Msg { .. } => None,
        }
    }
}

/// Destination for call events.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn report(&self, event: CallEvent);
}

/// Sink that drops every event.
pub struct NoopLogSink;

#[async_trait]
impl LogSink for NoopLogSink {
    async fn report(&self, _event: CallEvent) {}
}

pub fn noop_sink() -> Arc<dyn LogSink> {
    Arc::new(NoopLogSink)
}

/// Sink that emits events through `tracing`.
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn report(&self, event: CallEvent) {
        match event {
            CallEvent::ApiReq { sn, api, params } => {
                tracing::info!(sn, api = api.as_str(), %params, "[ApiReq]");
            }
            CallEvent::ApiRes {
                sn,
                api,
                res,
                duration_ms,
            } => {
                tracing::info!(sn, api = api.as_str(), duration_ms, %res, "[ApiRes]");
            }
            CallEvent::ApiErr {
                sn,
                api,
                err,
                duration_ms,
            } => {
                tracing::warn!(
                    sn,
                    api = api.as_str(),
                    duration_ms,
                    kind = err.kind.as_str(),
                    code = err.code.as_deref().unwrap_or(""),
                    "[ApiErr] {}",
                    err.message
                );
            }
            CallEvent::Abort { sn, api } => {
                tracing::info!(sn, api = api.as_str(), "[ApiAbort]");
            }
            CallEvent::Msg {
                direction,
                service,
                data,
            } => {
                tracing::info!(?direction, service = service.as_str(), %data, "[Msg]");
            }
        }
    }
}

/// Bounded in-memory sink; keeps the most recent `max_events` events.
pub struct InMemoryLogSink {
    events: RwLock<VecDeque<CallEvent>>,
    max_events: usize,
}

impl InMemoryLogSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: max.max(1),
        }
    }

    pub fn events(&self) -> Vec<CallEvent> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        events.iter().cloned().collect()
    }

    pub fn events_for(&self, sn: u64) -> Vec<CallEvent> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        events
            .iter()
            .filter(|e| e.sn() == Some(sn))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogSink for InMemoryLogSink {
    async fn report(&self, event: CallEvent) {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryLogSink::new(2);
        for sn in 1..=3 {
            sink.report(CallEvent::Abort {
                sn,
                api: "A".into(),
            })
            .await;
        }
        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.events().iter().map(|e| e.sn()).collect::<Vec<_>>(),
            vec![Some(2), Some(3)]
        );
    }

    #[tokio::test]
    async fn test_events_for_filters_by_sn() {
        let sink = InMemoryLogSink::new(10);
        sink.report(CallEvent::ApiReq {
            sn: 1,
            api: "A".into(),
            params: json!({}),
        })
        .await;
        sink.report(CallEvent::Msg {
            direction: MsgDirection::Recv,
            service: "N".into(),
            data: json!(null),
        })
        .await;
        sink.report(CallEvent::Abort {
            sn: 1,
            api: "A".into(),
        })
        .await;
        assert_eq!(sink.events_for(1).len(), 2);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let v = serde_json::to_value(CallEvent::Abort {
            sn: 3,
            api: "A".into(),
        })
        .unwrap();
        assert_eq!(v, json!({"event": "abort", "sn": 3, "api": "A"}));
    }
}

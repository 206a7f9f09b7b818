use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use strata_core::spec::QuerySpec;

/// One forwarded query: the consumed spec plus whether a native row count
/// is wanted instead of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRequest {
    pub spec: QuerySpec,
    pub count: bool,
}

/// Raw reply of the remote query-executing service: the `{data, error}`
/// pair, plus the native count when one was requested and supported.
///
/// Nothing in this shape is trusted; the adapter normalizes every field
/// before it crosses into the rest of the system.
#[derive(Debug, Clone, Default)]
pub struct BackendReply {
    pub data: Option<Value>,
    pub error: Option<Value>,
    pub count: Option<u64>,
}

impl BackendReply {
    pub fn data(value: Value) -> Self {
        Self {
            data: Some(value),
            ..Default::default()
        }
    }

    pub fn error(value: Value) -> Self {
        Self {
            error: Some(value),
            ..Default::default()
        }
    }

    pub fn counted(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Default::default()
        }
    }
}

/// Injected transport to the remote backend.
///
/// Implementations own connection handling, serialization and the service's
/// wire protocol; this layer only relies on the reply shape above. A client
/// that cannot count answers with `count: None` and callers fall back to
/// fetching.
#[async_trait]
pub trait BackendClient: Send + Sync + 'static {
    async fn execute(&self, request: BackendRequest) -> BackendReply;
}

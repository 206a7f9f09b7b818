use crate::client::{BackendClient, BackendRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use strata_core::query::{Datastore, QueryBackend};
use strata_core::response::{normalize, ErrorCode, ErrorInfo, RawError};
use strata_core::spec::{QuerySpec, Row};

/// Live adapter: forwards each consumed spec 1:1 to the injected client and
/// funnels the raw `{data, error}` outcome through the normalizer exactly
/// once. Failures never escape as panics; every one surfaces as a
/// normalized error tagged with the originating table and operation in the
/// logs.
pub struct RemoteBackend {
    client: Arc<dyn BackendClient>,
}

impl RemoteBackend {
    pub fn new(client: Arc<dyn BackendClient>) -> Self {
        Self { client }
    }

    /// Handle usable as the query entry point for this backend.
    pub fn datastore(client: Arc<dyn BackendClient>) -> Datastore {
        Datastore::new(Arc::new(Self::new(client)))
    }

    fn rows_from(data: Value) -> Result<Vec<Row>, ErrorInfo> {
        match data {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(ErrorInfo::new(
                        ErrorCode::Unknown,
                        format!("Backend returned a non-object row: {other}"),
                    )),
                })
                .collect(),
            // Some endpoints answer a bare object for single-row writes.
            Value::Object(row) => Ok(vec![row]),
            Value::Null => Ok(Vec::new()),
            other => Err(ErrorInfo::new(
                ErrorCode::Unknown,
                format!("Backend returned an unexpected data shape: {other}"),
            )),
        }
    }
}

fn log_failure(spec: &QuerySpec, info: &ErrorInfo) {
    tracing::error!(
        table = %spec.table,
        op = ?spec.op.kind(),
        code = %info.code,
        message = %info.message,
        "backend query failed"
    );
}

#[async_trait]
impl QueryBackend for RemoteBackend {
    async fn run(&self, spec: QuerySpec) -> Result<Vec<Row>, ErrorInfo> {
        let request = BackendRequest {
            spec: spec.clone(),
            count: false,
        };
        let reply = self.client.execute(request).await;
        let result = if let Some(payload) = reply.error {
            Err(normalize(RawError::Payload(payload)))
        } else {
            match reply.data {
                Some(data) => Self::rows_from(data),
                None => Err(ErrorInfo::new(
                    ErrorCode::Unknown,
                    "Backend returned no data",
                )),
            }
        };
        if let Err(info) = &result {
            log_failure(&spec, info);
        }
        result
    }

    async fn count(&self, spec: QuerySpec) -> Result<Option<u64>, ErrorInfo> {
        let request = BackendRequest {
            spec: spec.clone(),
            count: true,
        };
        let reply = self.client.execute(request).await;
        if let Some(payload) = reply.error {
            let info = normalize(RawError::Payload(payload));
            log_failure(&spec, &info);
            return Err(info);
        }
        Ok(reply.count)
    }
}

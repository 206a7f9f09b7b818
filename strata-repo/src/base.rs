use serde_json::Value;
use std::future::Future;
use std::time::Instant;
use strata_core::query::{Datastore, Query};
use strata_core::response::{ErrorInfo, Response};
use strata_core::spec::Row;

/// Table-scoped repository built directly on the query contract.
///
/// Works identically against any backend behind the [`Datastore`]. Every
/// call is timed and failures are logged tagged with the repository name and
/// table; the responses themselves pass through unchanged.
///
/// # Example
///
/// ```ignore
/// let repo = BaseRepository::new(store, "profiles")
///     .with_default_select("id, display_name, location")
///     .with_soft_delete(true);
/// let profile = repo.get_by_id("p-1").await;
/// ```
#[derive(Clone)]
pub struct BaseRepository {
    store: Datastore,
    table: String,
    name: String,
    id_field: String,
    default_select: String,
    soft_delete: bool,
}

impl BaseRepository {
    pub fn new(store: Datastore, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            name: format!("{table}.repository"),
            store,
            table,
            id_field: "id".to_string(),
            default_select: "*".to_string(),
            soft_delete: false,
        }
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_default_select(mut self, columns: impl Into<String>) -> Self {
        self.default_select = columns.into();
        self
    }

    /// Policy flag consumed by the entity layer: deletes become an update of
    /// `deleted_at` instead of row removal.
    pub fn with_soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete = enabled;
        self
    }

    /// Override the tag used in log entries.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn soft_delete(&self) -> bool {
        self.soft_delete
    }

    pub fn store(&self) -> &Datastore {
        &self.store
    }

    /// Fresh chain against this repository's table with the default
    /// projection applied.
    pub fn query(&self) -> Query {
        self.store.from(&self.table).select(&self.default_select)
    }

    pub async fn get_by_id(&self, id: impl Into<Value>) -> Response<Option<Row>> {
        let call = self.query().eq(&self.id_field, id.into()).maybe_single();
        self.timed("get_by_id", call).await
    }

    pub async fn get_all(&self) -> Response<Vec<Row>> {
        self.timed("get_all", self.query().execute()).await
    }

    pub(crate) async fn timed<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Response<T>>,
    ) -> Response<T> {
        let started = Instant::now();
        let resp = call.await;
        tracing::debug!(
            repository = %self.name,
            table = %self.table,
            op,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "repository call finished"
        );
        if let Some(err) = resp.error() {
            self.log_error(op, err);
        }
        resp
    }

    pub(crate) fn log_error(&self, op: &'static str, err: &ErrorInfo) {
        tracing::error!(
            repository = %self.name,
            table = %self.table,
            op,
            code = %err.code,
            message = %err.message,
            "repository call failed"
        );
    }
}

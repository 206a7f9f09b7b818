use serde_json::Value;
use strata_core::query::Datastore;
use strata_core::response::{fail, ok, ErrorCode, ErrorInfo, Response};
use strata_core::spec::Row;

/// Generic CRUD facade over untyped tables.
///
/// Built directly on the query contract so it stays reusable where no
/// entity mapping exists. Failures are logged with full detail internally;
/// the caller-facing response only ever carries the generic, entity-scoped
/// message ("Failed to retrieve organization").
#[derive(Clone)]
pub struct StandardOps {
    store: Datastore,
    table: String,
    entity_name: String,
    id_field: String,
}

impl StandardOps {
    pub fn new(
        store: Datastore,
        table: impl Into<String>,
        entity_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            entity_name: entity_name.into(),
            id_field: "id".to_string(),
        }
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    fn failure<T>(&self, verb: &'static str, code: ErrorCode, err: ErrorInfo) -> Response<T> {
        tracing::error!(
            entity = %self.entity_name,
            table = %self.table,
            verb,
            code = %err.code,
            message = %err.message,
            "operation failed"
        );
        fail(ErrorInfo::new(
            code,
            format!("Failed to {verb} {}", self.entity_name),
        ))
    }

    pub async fn get_by_id(&self, id: impl Into<Value>) -> Response<Option<Row>> {
        let call = self
            .store
            .from(&self.table)
            .eq(&self.id_field, id.into())
            .maybe_single();
        match call.await.into_result() {
            Ok(row) => ok(row),
            Err(err) => self.failure("retrieve", ErrorCode::Repository, err),
        }
    }

    pub async fn get_all(&self) -> Response<Vec<Row>> {
        match self.store.from(&self.table).execute().await.into_result() {
            Ok(rows) => ok(rows),
            Err(err) => self.failure("retrieve", ErrorCode::Repository, err),
        }
    }

    pub async fn get_by_ids(&self, ids: Vec<Value>) -> Response<Vec<Row>> {
        let call = self.store.from(&self.table).in_list(&self.id_field, ids).execute();
        match call.await.into_result() {
            Ok(rows) => ok(rows),
            Err(err) => self.failure("retrieve", ErrorCode::Repository, err),
        }
    }

    pub async fn create(&self, record: Row) -> Response<Row> {
        let call = self.store.from(&self.table).insert(record).single();
        match call.await.into_result() {
            Ok(row) => ok(row),
            Err(err) => self.failure("create", ErrorCode::Create, err),
        }
    }

    pub async fn update(&self, id: impl Into<Value>, patch: Row) -> Response<Row> {
        let call = self
            .store
            .from(&self.table)
            .update(patch)
            .eq(&self.id_field, id.into())
            .single();
        match call.await.into_result() {
            Ok(row) => ok(row),
            Err(err) => self.failure("update", ErrorCode::Update, err),
        }
    }

    pub async fn delete(&self, id: impl Into<Value>) -> Response<()> {
        let call = self
            .store
            .from(&self.table)
            .delete()
            .eq(&self.id_field, id.into())
            .execute();
        match call.await.into_result() {
            Ok(_) => ok(()),
            Err(err) => self.failure("delete", ErrorCode::Delete, err),
        }
    }

    pub async fn exists(&self, id: impl Into<Value>) -> Response<bool> {
        let call = self
            .store
            .from(&self.table)
            .select(&self.id_field)
            .eq(&self.id_field, id.into())
            .limit(1)
            .execute();
        match call.await.into_result() {
            Ok(rows) => ok(!rows.is_empty()),
            Err(err) => self.failure("check", ErrorCode::Repository, err),
        }
    }

    /// Row count for the table; backends without native counting are
    /// handled by the terminal's fetch-and-measure fallback.
    pub async fn count(&self) -> Response<u64> {
        match self.store.from(&self.table).count().await.into_result() {
            Ok(count) => ok(count),
            Err(err) => self.failure("count", ErrorCode::Repository, err),
        }
    }
}

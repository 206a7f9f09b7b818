use crate::response::{fail, ok, ErrorCode, ErrorInfo, Response};
use crate::spec::{is_valid_table_name, Filter, FilterOp, Operation, OrderKey, QuerySpec, Row, Selection};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Backend seam: executes one consumed [`QuerySpec`] snapshot.
///
/// Implementations return plain row sets; cardinality rules for
/// `single`/`maybe_single` are applied by [`Query`] itself so every backend
/// exposes identical observable behavior.
#[async_trait]
pub trait QueryBackend: Send + Sync + 'static {
    async fn run(&self, spec: QuerySpec) -> Result<Vec<Row>, ErrorInfo>;

    /// Native row count for the spec's filters. `Ok(None)` means counting is
    /// not supported and the caller falls back to fetching and measuring.
    async fn count(&self, _spec: QuerySpec) -> Result<Option<u64>, ErrorInfo> {
        Ok(None)
    }
}

/// Entry point for query chains, cheap to clone and share.
#[derive(Clone)]
pub struct Datastore {
    backend: Arc<dyn QueryBackend>,
}

impl Datastore {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }

    /// Start a fluent chain against `table`.
    ///
    /// An invalid table reference yields a poisoned chain: chain calls are
    /// no-ops and every terminal call returns the same normalized error.
    pub fn from(&self, table: &str) -> Query {
        let poison = if is_valid_table_name(table) {
            None
        } else {
            Some(ErrorInfo::new(
                ErrorCode::Query,
                format!("Invalid table reference: {table}"),
            ))
        };
        Query {
            backend: self.backend.clone(),
            spec: QuerySpec::new(table),
            poison,
        }
    }
}

/// A fluent query chain.
///
/// Every chain call consumes the builder and returns a new one carrying the
/// grown [`QuerySpec`]; the terminal call consumes the final snapshot. Two
/// chains never share accumulated state, even when they came from the same
/// [`Datastore`].
///
/// # Example
///
/// ```ignore
/// let rows = store
///     .from("posts")
///     .eq("status", "published")
///     .order("created_at", false)
///     .limit(10)
///     .execute()
///     .await;
/// ```
pub struct Query {
    backend: Arc<dyn QueryBackend>,
    spec: QuerySpec,
    poison: Option<ErrorInfo>,
}

impl Query {
    fn push_filter(mut self, field: &str, op: FilterOp, value: Value) -> Self {
        if self.poison.is_none() {
            self.spec.filters.push(Filter {
                field: field.to_string(),
                op,
                value,
            });
        }
        self
    }

    /// Restrict returned fields, `"*"` for all. Relation selections are
    /// carried through for backends that support embedding.
    pub fn select(mut self, columns: &str) -> Self {
        if self.poison.is_none() {
            self.spec.select = Selection::parse(columns);
        }
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_filter(field, FilterOp::Eq, value.into())
    }

    pub fn neq(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_filter(field, FilterOp::Neq, value.into())
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_filter(field, FilterOp::Gt, value.into())
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_filter(field, FilterOp::Gte, value.into())
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_filter(field, FilterOp::Lt, value.into())
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_filter(field, FilterOp::Lte, value.into())
    }

    pub fn like(self, field: &str, pattern: &str) -> Self {
        self.push_filter(field, FilterOp::Like, Value::String(pattern.to_string()))
    }

    pub fn ilike(self, field: &str, pattern: &str) -> Self {
        self.push_filter(field, FilterOp::Ilike, Value::String(pattern.to_string()))
    }

    pub fn in_list<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let list = values.into_iter().map(Into::into).collect();
        self.push_filter(field, FilterOp::In, Value::Array(list))
    }

    /// Match `null` / `true` / `false` exactly; `is(field, Value::Null)`
    /// also matches a missing field.
    pub fn is(self, field: &str, value: impl Into<Value>) -> Self {
        self.push_filter(field, FilterOp::Is, value.into())
    }

    /// Raw disjunction escape, e.g. `"status.eq.active,role.eq.admin"`.
    /// AND-ed with the other filters.
    pub fn or(mut self, expr: &str) -> Self {
        if self.poison.is_none() {
            self.spec.or_filters.push(expr.to_string());
        }
        self
    }

    pub fn order(mut self, field: &str, ascending: bool) -> Self {
        if self.poison.is_none() {
            self.spec.order.push(OrderKey {
                field: field.to_string(),
                ascending,
            });
        }
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        if self.poison.is_none() {
            self.spec.limit = Some(count);
        }
        self
    }

    pub fn offset(mut self, count: usize) -> Self {
        if self.poison.is_none() {
            self.spec.offset = Some(count);
        }
        self
    }

    /// Inclusive row window: `range(from, to)` is
    /// `offset(from).limit(to - from + 1)`.
    pub fn range(self, from: usize, to: usize) -> Self {
        let limit = if to < from { 0 } else { to - from + 1 };
        self.offset(from).limit(limit)
    }

    pub fn insert(self, row: Row) -> Self {
        self.insert_many(vec![row])
    }

    pub fn insert_many(mut self, rows: Vec<Row>) -> Self {
        if self.poison.is_none() {
            self.spec.op = Operation::Insert(rows);
        }
        self
    }

    /// Merge `patch` into every row matching the chain's filters.
    pub fn update(mut self, patch: Row) -> Self {
        if self.poison.is_none() {
            self.spec.op = Operation::Update(patch);
        }
        self
    }

    /// Remove every row matching the chain's filters.
    pub fn delete(mut self) -> Self {
        if self.poison.is_none() {
            self.spec.op = Operation::Delete;
        }
        self
    }

    /// Snapshot of the accumulated spec.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    async fn run(self) -> Result<Vec<Row>, ErrorInfo> {
        match self.poison {
            Some(err) => Err(err),
            None => self.backend.run(self.spec).await,
        }
    }

    /// Run the chain and return every matching row; an empty list is
    /// success, only execution failures are errors.
    pub async fn execute(self) -> Response<Vec<Row>> {
        match self.run().await {
            Ok(rows) => ok(rows),
            Err(err) => fail(err),
        }
    }

    /// Succeeds iff exactly one row matches.
    pub async fn single(self) -> Response<Row> {
        match self.run().await {
            Ok(mut rows) => {
                if rows.len() > 1 {
                    fail(ErrorInfo::new(ErrorCode::Query, "Multiple rows returned"))
                } else if let Some(row) = rows.pop() {
                    ok(row)
                } else {
                    fail(ErrorInfo::new(ErrorCode::NotFound, "No rows found"))
                }
            }
            Err(err) => fail(err),
        }
    }

    /// Zero rows is success with `None`; more than one row is the same
    /// error `single()` produces, so no row is ever picked silently.
    pub async fn maybe_single(self) -> Response<Option<Row>> {
        match self.run().await {
            Ok(mut rows) => {
                if rows.len() > 1 {
                    fail(ErrorInfo::new(ErrorCode::Query, "Multiple rows returned"))
                } else {
                    ok(rows.pop())
                }
            }
            Err(err) => fail(err),
        }
    }

    /// Count matching rows, preferring the backend's native count and
    /// falling back to fetching the result set and measuring it.
    pub async fn count(self) -> Response<u64> {
        let Query {
            backend,
            spec,
            poison,
        } = self;
        if let Some(err) = poison {
            return fail(err);
        }
        match backend.count(spec.clone()).await {
            Ok(Some(n)) => ok(n),
            Ok(None) => match backend.run(spec).await {
                Ok(rows) => ok(rows.len() as u64),
                Err(err) => fail(err),
            },
            Err(err) => fail(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedRows(Vec<Row>);

    fn row(value: serde_json::Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[async_trait]
    impl QueryBackend for FixedRows {
        async fn run(&self, _spec: QuerySpec) -> Result<Vec<Row>, ErrorInfo> {
            Ok(self.0.clone())
        }
    }

    fn store_with(rows: Vec<Row>) -> Datastore {
        Datastore::new(Arc::new(FixedRows(rows)))
    }

    #[tokio::test]
    async fn single_errors_on_zero_rows() {
        let resp = store_with(vec![]).from("users").single().await;
        let err = resp.error().cloned().unwrap();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "No rows found");
    }

    #[tokio::test]
    async fn single_errors_on_multiple_rows() {
        let rows = vec![row(json!({"id": 1})), row(json!({"id": 2}))];
        let resp = store_with(rows).from("users").single().await;
        assert_eq!(resp.error_message(), Some("Multiple rows returned"));
    }

    #[tokio::test]
    async fn single_returns_the_only_row() {
        let resp = store_with(vec![row(json!({"id": 7}))])
            .from("users")
            .single()
            .await;
        assert_eq!(resp.data().and_then(|r| r.get("id")), Some(&json!(7)));
    }

    #[tokio::test]
    async fn maybe_single_zero_rows_is_success_with_none() {
        let resp = store_with(vec![]).from("users").maybe_single().await;
        assert!(resp.is_success());
        assert_eq!(resp.data(), Some(&None));
    }

    #[tokio::test]
    async fn maybe_single_multiple_rows_errors() {
        let rows = vec![row(json!({"id": 1})), row(json!({"id": 2}))];
        let resp = store_with(rows).from("users").maybe_single().await;
        assert_eq!(resp.error_message(), Some("Multiple rows returned"));
    }

    #[tokio::test]
    async fn invalid_table_poisons_the_whole_chain() {
        let store = store_with(vec![row(json!({"id": 1}))]);
        let resp = store
            .from("users;drop")
            .eq("id", 1)
            .order("id", true)
            .execute()
            .await;
        let err = resp.error().cloned().unwrap();
        assert_eq!(err.code, ErrorCode::Query);
        assert!(err.message.contains("Invalid table reference"));

        // Chain calls on a poisoned builder leave the spec untouched.
        let query = store.from("users;drop").eq("id", 1).limit(5);
        assert!(query.spec().filters.is_empty());
        assert_eq!(query.spec().limit, None);
    }

    #[test]
    fn range_is_inclusive() {
        let store = store_with(vec![]);
        let query = store.from("users").range(2, 5);
        assert_eq!(query.spec().offset, Some(2));
        assert_eq!(query.spec().limit, Some(4));

        let query = store.from("users").range(4, 10);
        assert_eq!(query.spec().offset, Some(4));
        assert_eq!(query.spec().limit, Some(7));
    }

    #[test]
    fn chain_accumulates_in_call_order() {
        let store = store_with(vec![]);
        let query = store
            .from("users")
            .select("id, name")
            .eq("status", "active")
            .gte("age", 18)
            .order("name", true)
            .limit(10)
            .offset(20);
        let spec = query.spec();
        assert_eq!(spec.filters.len(), 2);
        assert_eq!(spec.filters[0].op, FilterOp::Eq);
        assert_eq!(spec.filters[1].op, FilterOp::Gte);
        assert_eq!(spec.order.len(), 1);
        assert_eq!(spec.limit, Some(10));
        assert_eq!(spec.offset, Some(20));
    }

    #[tokio::test]
    async fn count_falls_back_to_result_length() {
        let rows = vec![row(json!({"id": 1})), row(json!({"id": 2}))];
        let resp = store_with(rows).from("users").count().await;
        assert_eq!(resp.data(), Some(&2));
    }
}

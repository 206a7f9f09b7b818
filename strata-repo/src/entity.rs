use crate::base::BaseRepository;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use strata_core::response::{fail, ok, ErrorCode, ErrorInfo, Response};
use strata_core::spec::Row;

/// Failure to turn a raw record into a typed entity.
#[derive(Debug)]
pub enum MapError {
    MissingField(&'static str),
    Invalid(String),
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::MissingField(field) => write!(f, "missing field `{field}`"),
            MapError::Invalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for MapError {}

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Mapping boundary between raw records and typed entities.
///
/// The two conversions isolate every field-name and nested-join shape
/// difference from domain code; `validate` holds the local invariants
/// checked before any write reaches a backend. Fields that only one
/// direction defines must be documented on the implementation, never
/// silently dropped.
pub trait EntityMapper: Send + Sync + 'static {
    type Entity: Send + Sync;

    /// Discriminator tag, also handed to tag lookups.
    fn entity_type() -> &'static str;

    fn to_entity(row: &Row) -> Result<Self::Entity, MapError>;

    fn from_entity(entity: &Self::Entity) -> Row;

    fn validate(_entity: &Self::Entity) -> Result<(), Vec<FieldError>> {
        Ok(())
    }
}

/// Tag lookup collaborator. Tags are enrichment: a failing source degrades
/// a read to an empty tag list instead of failing it.
#[async_trait]
pub trait TagSource: Send + Sync + 'static {
    async fn tags_for(&self, entity_type: &str, id: &str) -> Result<Vec<String>, ErrorInfo>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedEntity<E> {
    pub entity: E,
    pub tags: Vec<String>,
}

/// Typed repository composed from a [`BaseRepository`] and an
/// [`EntityMapper`]: no inheritance, one mapper per table.
pub struct EntityRepository<M: EntityMapper> {
    base: BaseRepository,
    tags: Option<Arc<dyn TagSource>>,
    _marker: PhantomData<M>,
}

impl<M: EntityMapper> Clone for EntityRepository<M> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            tags: self.tags.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: EntityMapper> EntityRepository<M> {
    pub fn new(base: BaseRepository) -> Self {
        Self {
            base,
            tags: None,
            _marker: PhantomData,
        }
    }

    pub fn with_tag_source(mut self, tags: Arc<dyn TagSource>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn base(&self) -> &BaseRepository {
        &self.base
    }

    fn map_row(row: &Row) -> Result<M::Entity, ErrorInfo> {
        M::to_entity(row).map_err(|err| {
            ErrorInfo::new(
                ErrorCode::Repository,
                format!("Invalid {} record: {err}", M::entity_type()),
            )
        })
    }

    fn validation_failure(errors: Vec<FieldError>) -> ErrorInfo {
        let mut details = serde_json::Map::new();
        for err in errors {
            details.insert(err.field, Value::String(err.message));
        }
        ErrorInfo::new(ErrorCode::Validation, "Validation failed")
            .with_details(Value::Object(details))
    }

    pub async fn get_entity(&self, id: impl Into<Value>) -> Response<Option<M::Entity>> {
        match self.base.get_by_id(id).await.into_result() {
            Ok(Some(row)) => match Self::map_row(&row) {
                Ok(entity) => ok(Some(entity)),
                Err(err) => fail(err),
            },
            Ok(None) => ok(None),
            Err(err) => fail(err),
        }
    }

    pub async fn list_entities(&self) -> Response<Vec<M::Entity>> {
        match self.base.get_all().await.into_result() {
            Ok(rows) => {
                let mut entities = Vec::with_capacity(rows.len());
                for row in &rows {
                    match Self::map_row(row) {
                        Ok(entity) => entities.push(entity),
                        Err(err) => return fail(err),
                    }
                }
                ok(entities)
            }
            Err(err) => fail(err),
        }
    }

    /// Validate, then insert. A validation failure returns before any
    /// backend call is made.
    pub async fn create_entity(&self, entity: &M::Entity) -> Response<M::Entity> {
        if let Err(errors) = M::validate(entity) {
            let info = Self::validation_failure(errors);
            self.base.log_error("create_entity", &info);
            return fail(info);
        }
        let row = M::from_entity(entity);
        let call = self.base.query().insert(row).single();
        match self.base.timed("create_entity", call).await.into_result() {
            Ok(row) => match Self::map_row(&row) {
                Ok(entity) => ok(entity),
                Err(err) => fail(err),
            },
            Err(err) => fail(err),
        }
    }

    /// Re-read, merge the patch, validate the merged record, then write it.
    /// The re-read guarantees the validated union satisfies the entity's
    /// invariants, not just the patch; a missing current row fails with
    /// `not_found` before any write is attempted.
    pub async fn update_entity(&self, id: impl Into<Value>, patch: Row) -> Response<M::Entity> {
        let id = id.into();
        let mut merged = match self.base.get_by_id(id.clone()).await.into_result() {
            Ok(Some(row)) => row,
            Ok(None) => {
                return fail(ErrorInfo::new(
                    ErrorCode::NotFound,
                    format!("{} not found", M::entity_type()),
                ))
            }
            Err(err) => return fail(err),
        };
        for (key, value) in &patch {
            merged.insert(key.clone(), value.clone());
        }

        let entity = match Self::map_row(&merged) {
            Ok(entity) => entity,
            Err(err) => return fail(err),
        };
        if let Err(errors) = M::validate(&entity) {
            let info = Self::validation_failure(errors);
            self.base.log_error("update_entity", &info);
            return fail(info);
        }

        let call = self
            .base
            .query()
            .update(merged)
            .eq(self.base.id_field(), id)
            .single();
        match self.base.timed("update_entity", call).await.into_result() {
            Ok(row) => match Self::map_row(&row) {
                Ok(entity) => ok(entity),
                Err(err) => fail(err),
            },
            Err(err) => fail(err),
        }
    }

    /// Remove the row, or stamp `deleted_at` when the base repository runs
    /// with soft deletes. Returns whether a row was affected.
    pub async fn delete_entity(&self, id: impl Into<Value>) -> Response<bool> {
        let id = id.into();
        let call = if self.base.soft_delete() {
            let mut patch = Row::new();
            patch.insert(
                "deleted_at".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
            self.base
                .query()
                .update(patch)
                .eq(self.base.id_field(), id)
                .execute()
        } else {
            self.base
                .query()
                .delete()
                .eq(self.base.id_field(), id)
                .execute()
        };
        match self.base.timed("delete_entity", call).await.into_result() {
            Ok(rows) => ok(!rows.is_empty()),
            Err(err) => fail(err),
        }
    }

    /// Read an entity together with its tags. A failing base read
    /// short-circuits untouched; a failing tag lookup degrades to an empty
    /// list.
    pub async fn get_with_tags(
        &self,
        id: impl Into<Value>,
    ) -> Response<Option<TaggedEntity<M::Entity>>> {
        let id = id.into();
        let entity = match self.get_entity(id.clone()).await.into_result() {
            Ok(Some(entity)) => entity,
            Ok(None) => return ok(None),
            Err(err) => return fail(err),
        };
        let tags = match &self.tags {
            Some(source) => match source.tags_for(M::entity_type(), &id_key(&id)).await {
                Ok(tags) => tags,
                Err(err) => {
                    tracing::warn!(
                        entity = M::entity_type(),
                        code = %err.code,
                        message = %err.message,
                        "tag lookup failed, returning empty tags"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        ok(Some(TaggedEntity { entity, tags }))
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

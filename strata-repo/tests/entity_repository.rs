use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use strata_core::response::{ErrorCode, ErrorInfo};
use strata_core::spec::{OpKind, Row};
use strata_mem::{record, MemoryBackend};
use strata_repo::{BaseRepository, EntityMapper, EntityRepository, FieldError, MapError, TagSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Location {
    city: String,
    country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    id: String,
    display_name: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
}

struct ProfileMapper;

impl EntityMapper for ProfileMapper {
    type Entity = Profile;

    fn entity_type() -> &'static str {
        "profile"
    }

    fn to_entity(row: &Row) -> Result<Profile, MapError> {
        serde_json::from_value(Value::Object(row.clone()))
            .map_err(|err| MapError::Invalid(err.to_string()))
    }

    fn from_entity(entity: &Profile) -> Row {
        match serde_json::to_value(entity) {
            Ok(Value::Object(map)) => map,
            _ => Row::new(),
        }
    }

    fn validate(entity: &Profile) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if entity.display_name.trim().is_empty() {
            errors.push(FieldError::new("display_name", "must not be empty"));
        }
        if !entity.email.contains('@') {
            errors.push(FieldError::new("email", "must be an email address"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn profile(id: &str, name: &str, email: &str) -> Profile {
    Profile {
        id: id.to_string(),
        display_name: name.to_string(),
        email: email.to_string(),
        location: None,
    }
}

fn repo(backend: &MemoryBackend) -> EntityRepository<ProfileMapper> {
    EntityRepository::new(BaseRepository::new(backend.datastore(), "profiles"))
}

#[tokio::test]
async fn create_then_read_back() {
    let backend = MemoryBackend::new();
    let repo = repo(&backend);

    let created = repo
        .create_entity(&profile("p-1", "Ada", "ada@example.com"))
        .await
        .into_data()
        .unwrap();
    assert_eq!(created.display_name, "Ada");

    let fetched = repo.get_entity("p-1").await.into_data().unwrap().unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn invalid_entity_never_reaches_the_backend() {
    let backend = MemoryBackend::new();
    let repo = repo(&backend);

    let resp = repo.create_entity(&profile("p-1", "", "not-an-email")).await;
    let err = resp.error().cloned().unwrap();
    assert_eq!(err.code, ErrorCode::Validation);
    let details = err.details.unwrap();
    assert_eq!(details["display_name"], json!("must not be empty"));
    assert_eq!(details["email"], json!("must be an email address"));

    // The collection saw zero write calls.
    assert!(backend.is_empty("profiles"));
}

#[tokio::test]
async fn update_missing_entity_fails_before_any_write() {
    let backend = MemoryBackend::new();
    let repo = repo(&backend);

    let mut patch = Row::new();
    patch.insert("display_name".to_string(), json!("Renamed"));
    let resp = repo.update_entity("p-404", patch).await;
    let err = resp.error().cloned().unwrap();
    assert_eq!(err.code, ErrorCode::NotFound);
    assert!(backend.is_empty("profiles"));
}

#[tokio::test]
async fn update_merges_the_patch_into_the_current_row() {
    let backend = MemoryBackend::new();
    backend.add_items(
        "profiles",
        vec![record(json!({
            "id": "p-1",
            "display_name": "Ada",
            "email": "ada@example.com",
            "location": {"city": "London", "country": "UK"}
        }))],
    );
    let repo = repo(&backend);

    let mut patch = Row::new();
    patch.insert("display_name".to_string(), json!("Ada L."));
    let updated = repo.update_entity("p-1", patch).await.into_data().unwrap();

    assert_eq!(updated.display_name, "Ada L.");
    assert_eq!(updated.email, "ada@example.com");
    assert_eq!(
        updated.location,
        Some(Location {
            city: "London".to_string(),
            country: "UK".to_string()
        })
    );
}

#[tokio::test]
async fn update_validates_the_merged_record_not_the_patch() {
    let backend = MemoryBackend::new();
    backend.add_items(
        "profiles",
        vec![record(json!({"id": "p-1", "display_name": "Ada", "email": "ada@example.com"}))],
    );
    let repo = repo(&backend);

    let mut patch = Row::new();
    patch.insert("email".to_string(), json!("broken"));
    let resp = repo.update_entity("p-1", patch).await;
    assert_eq!(resp.error().map(|e| e.code), Some(ErrorCode::Validation));

    // The stored row is untouched.
    let stored = backend.find_by_id("profiles", "p-1").unwrap();
    assert_eq!(stored["email"], json!("ada@example.com"));
}

#[test]
fn round_trip_preserves_all_mapped_fields() {
    let row = record(json!({
        "id": "p-1",
        "display_name": "Ada",
        "email": "ada@example.com",
        "location": {"city": "London", "country": "UK"}
    }));
    let entity = ProfileMapper::to_entity(&row).unwrap();
    let back = ProfileMapper::from_entity(&entity);
    assert_eq!(back, row);
}

#[tokio::test]
async fn hard_delete_removes_the_row() {
    let backend = MemoryBackend::new();
    backend.add_items(
        "profiles",
        vec![record(json!({"id": "p-1", "display_name": "Ada", "email": "ada@example.com"}))],
    );
    let repo = repo(&backend);

    let deleted = repo.delete_entity("p-1").await.into_data().unwrap();
    assert!(deleted);
    assert!(backend.is_empty("profiles"));
}

#[tokio::test]
async fn soft_delete_stamps_instead_of_removing() {
    let backend = MemoryBackend::new();
    backend.add_items(
        "profiles",
        vec![record(json!({"id": "p-1", "display_name": "Ada", "email": "ada@example.com"}))],
    );
    let base = BaseRepository::new(backend.datastore(), "profiles").with_soft_delete(true);
    let repo: EntityRepository<ProfileMapper> = EntityRepository::new(base);

    let deleted = repo.delete_entity("p-1").await.into_data().unwrap();
    assert!(deleted);

    let stored = backend.find_by_id("profiles", "p-1").unwrap();
    assert!(stored.get("deleted_at").is_some());
}

struct FixedTags(Vec<String>);

#[async_trait]
impl TagSource for FixedTags {
    async fn tags_for(&self, _entity_type: &str, _id: &str) -> Result<Vec<String>, ErrorInfo> {
        Ok(self.0.clone())
    }
}

struct BrokenTags;

#[async_trait]
impl TagSource for BrokenTags {
    async fn tags_for(&self, _entity_type: &str, _id: &str) -> Result<Vec<String>, ErrorInfo> {
        Err(ErrorInfo::new(ErrorCode::Query, "tag service down"))
    }
}

#[tokio::test]
async fn tags_are_merged_into_the_read() {
    let backend = MemoryBackend::new();
    backend.add_items(
        "profiles",
        vec![record(json!({"id": "p-1", "display_name": "Ada", "email": "ada@example.com"}))],
    );
    let repo = repo(&backend)
        .with_tag_source(Arc::new(FixedTags(vec!["admin".to_string(), "early".to_string()])));

    let tagged = repo.get_with_tags("p-1").await.into_data().unwrap().unwrap();
    assert_eq!(tagged.entity.display_name, "Ada");
    assert_eq!(tagged.tags, vec!["admin", "early"]);
}

#[tokio::test]
async fn failing_tag_lookup_degrades_to_empty_tags() {
    let backend = MemoryBackend::new();
    backend.add_items(
        "profiles",
        vec![record(json!({"id": "p-1", "display_name": "Ada", "email": "ada@example.com"}))],
    );
    let repo = repo(&backend).with_tag_source(Arc::new(BrokenTags));

    let tagged = repo.get_with_tags("p-1").await.into_data().unwrap().unwrap();
    assert!(tagged.tags.is_empty());
}

#[tokio::test]
async fn failing_base_read_short_circuits_untouched() {
    let backend = MemoryBackend::new();
    backend.mock_error(
        "profiles",
        OpKind::Select,
        ErrorInfo::new(ErrorCode::Query, "connection reset"),
    );
    let repo = repo(&backend).with_tag_source(Arc::new(FixedTags(vec!["ignored".to_string()])));

    let resp = repo.get_with_tags("p-1").await;
    let err = resp.error().cloned().unwrap();
    assert_eq!(err.message, "connection reset");
}

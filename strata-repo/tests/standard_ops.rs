use serde_json::{json, Value};
use strata_core::response::{ErrorCode, ErrorInfo};
use strata_core::spec::OpKind;
use strata_mem::{record, MemoryBackend};
use strata_repo::StandardOps;

fn seeded() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.add_items(
        "widgets",
        vec![
            record(json!({"id": 1, "name": "bolt"})),
            record(json!({"id": 2, "name": "nut"})),
            record(json!({"id": 3, "name": "gear"})),
        ],
    );
    backend
}

fn ops(backend: &MemoryBackend) -> StandardOps {
    StandardOps::new(backend.datastore(), "widgets", "widget")
}

#[tokio::test]
async fn get_by_id_returns_the_row() {
    let backend = seeded();
    let row = ops(&backend).get_by_id(2).await.into_data().unwrap().unwrap();
    assert_eq!(row["name"], json!("nut"));
}

#[tokio::test]
async fn read_failures_return_only_the_generic_message() {
    let backend = seeded();
    backend.mock_error(
        "widgets",
        OpKind::Select,
        ErrorInfo::new(ErrorCode::Query, "permission denied for relation widgets"),
    );
    let resp = ops(&backend).get_all().await;
    let err = resp.error().cloned().unwrap();
    assert_eq!(err.code, ErrorCode::Repository);
    assert_eq!(err.message, "Failed to retrieve widget");
    // Internal detail is logged, never surfaced.
    assert!(!err.message.contains("permission denied"));
    assert!(err.details.is_none());
}

#[tokio::test]
async fn create_returns_the_stored_row() {
    let backend = MemoryBackend::new();
    let row = ops(&backend)
        .create(record(json!({"name": "washer"})))
        .await
        .into_data()
        .unwrap();
    assert!(row["id"].is_string());
    assert_eq!(backend.len("widgets"), 1);
}

#[tokio::test]
async fn create_failure_is_verb_scoped() {
    let backend = MemoryBackend::new();
    backend.mock_error(
        "widgets",
        OpKind::Insert,
        ErrorInfo::new(ErrorCode::Query, "duplicate key"),
    );
    let resp = ops(&backend).create(record(json!({"name": "washer"}))).await;
    let err = resp.error().cloned().unwrap();
    assert_eq!(err.code, ErrorCode::Create);
    assert_eq!(err.message, "Failed to create widget");
}

#[tokio::test]
async fn update_patches_one_row() {
    let backend = seeded();
    let row = ops(&backend)
        .update(3, record(json!({"name": "cog"})))
        .await
        .into_data()
        .unwrap();
    assert_eq!(row["name"], json!("cog"));
    assert_eq!(
        backend.find_by_id("widgets", 3).unwrap()["name"],
        json!("cog")
    );
}

#[tokio::test]
async fn update_of_a_missing_row_is_a_generic_failure() {
    let backend = seeded();
    let resp = ops(&backend).update(99, record(json!({"name": "x"}))).await;
    let err = resp.error().cloned().unwrap();
    assert_eq!(err.code, ErrorCode::Update);
    assert_eq!(err.message, "Failed to update widget");
}

#[tokio::test]
async fn delete_removes_the_row() {
    let backend = seeded();
    let resp = ops(&backend).delete(1).await;
    assert!(resp.is_success());
    assert_eq!(backend.len("widgets"), 2);
}

#[tokio::test]
async fn get_by_ids_filters_by_membership() {
    let backend = seeded();
    let rows = ops(&backend)
        .get_by_ids(vec![Value::from(1), Value::from(3)])
        .await
        .into_data()
        .unwrap();
    let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("bolt"), json!("gear")]);
}

#[tokio::test]
async fn exists_checks_presence() {
    let backend = seeded();
    assert_eq!(ops(&backend).exists(2).await.into_data(), Some(true));
    assert_eq!(ops(&backend).exists(42).await.into_data(), Some(false));
}

#[tokio::test]
async fn count_uses_native_support() {
    let backend = seeded();
    assert_eq!(ops(&backend).count().await.into_data(), Some(3));
}

#[tokio::test]
async fn count_falls_back_to_fetching() {
    let backend = MemoryBackend::new().without_native_count();
    backend.add_items(
        "widgets",
        vec![record(json!({"id": 1})), record(json!({"id": 2}))],
    );
    assert_eq!(ops(&backend).count().await.into_data(), Some(2));
}

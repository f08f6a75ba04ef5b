//! Integration tests for the EAV metadata table

mod helpers;

use helpers::open_temp_tables;
use specdb_store::metadata::{FIELD_FORMAT, FIELD_INSERT_TIMESTAMP};
use specdb_store::{FieldType, FieldValue, MetadataRecord};

#[tokio::test]
async fn test_store_and_load_typed_fields() {
    let (_dir, _db, tables) = open_temp_tables().await;

    let record = MetadataRecord::new()
        .with("moisture", 12.5)
        .with("instrument", "DA7250")
        .with("dummy", false);
    tables.metadata.store("S-001", &record).await.unwrap();

    let loaded = tables.metadata.load("S-001").await.unwrap();
    assert_eq!(loaded.get("moisture"), Some(&FieldValue::Number(12.5)));
    assert_eq!(loaded.get("instrument"), Some(&FieldValue::Text("DA7250".to_string())));
    assert_eq!(loaded.get("dummy"), Some(&FieldValue::Boolean(false)));
    assert!(loaded.contains(FIELD_INSERT_TIMESTAMP), "insert timestamp should be injected");
}

#[tokio::test]
async fn test_reserved_fields_not_persisted() {
    let (_dir, _db, tables) = open_temp_tables().await;

    let record = MetadataRecord::new().with("moisture", 3.0).with(FIELD_FORMAT, "NIR");
    tables.metadata.store("S-002", &record).await.unwrap();

    assert!(!tables.metadata.has_field("S-002", FIELD_FORMAT).await.unwrap());
    assert!(tables.metadata.has_field("S-002", "moisture").await.unwrap());
}

#[tokio::test]
async fn test_store_merges_with_existing_fields() {
    let (_dir, _db, tables) = open_temp_tables().await;

    let first = MetadataRecord::new()
        .with("moisture", 10.0)
        .with("protein", 11.0)
        .with(FIELD_INSERT_TIMESTAMP, "2024-01-01 08:00:00");
    tables.metadata.store("S-003", &first).await.unwrap();

    let second = MetadataRecord::new().with("moisture", 14.0).with("oil", 2.0);
    tables.metadata.store("S-003", &second).await.unwrap();

    let loaded = tables.metadata.load("S-003").await.unwrap();
    assert_eq!(loaded.get("moisture"), Some(&FieldValue::Number(14.0)));
    assert_eq!(loaded.get("protein"), Some(&FieldValue::Number(11.0)));
    assert_eq!(loaded.get("oil"), Some(&FieldValue::Number(2.0)));
    // Existing timestamp is kept, not re-stamped
    assert_eq!(
        loaded.get(FIELD_INSERT_TIMESTAMP),
        Some(&FieldValue::Text("2024-01-01 08:00:00".to_string()))
    );
}

#[tokio::test]
async fn test_store_can_change_field_type() {
    let (_dir, _db, tables) = open_temp_tables().await;

    tables
        .metadata
        .store("S-004", &MetadataRecord::new().with("grade", 2.0))
        .await
        .unwrap();
    tables
        .metadata
        .store("S-004", &MetadataRecord::new().with("grade", "premium"))
        .await
        .unwrap();

    let value = tables.metadata.get_field("S-004", "grade").await.unwrap();
    assert_eq!(value, Some(FieldValue::Text("premium".to_string())));
}

#[tokio::test]
async fn test_mismatched_value_loaded_as_text() {
    let (_dir, db, tables) = open_temp_tables().await;

    sqlx::query("INSERT INTO metadata (owner, field, type, value) VALUES (?, ?, ?, ?)")
        .bind("S-005")
        .bind("moisture")
        .bind("N")
        .bind("wet")
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO metadata (owner, field, type, value) VALUES (?, ?, ?, ?)")
        .bind("S-005")
        .bind("colour")
        .bind("X")
        .bind("amber")
        .execute(db.pool())
        .await
        .unwrap();

    let loaded = tables.metadata.load("S-005").await.unwrap();
    assert_eq!(loaded.get("moisture"), Some(&FieldValue::Text("wet".to_string())));
    assert_eq!(loaded.get("colour"), Some(&FieldValue::Text("amber".to_string())));
}

#[tokio::test]
async fn test_load_unknown_owner_is_empty() {
    let (_dir, _db, tables) = open_temp_tables().await;

    let loaded = tables.metadata.load("missing").await.unwrap();
    assert!(loaded.is_empty());
    assert!(!tables.metadata.exists("missing").await.unwrap());
}

#[tokio::test]
async fn test_field_catalogue_and_deletes() {
    let (_dir, _db, tables) = open_temp_tables().await;

    tables
        .metadata
        .store("A", &MetadataRecord::new().with("moisture", 9.0).with("site", "north"))
        .await
        .unwrap();
    tables
        .metadata
        .store("B", &MetadataRecord::new().with("moisture", 12.0).with("site", "south"))
        .await
        .unwrap();

    let names = tables.metadata.field_names().await.unwrap();
    assert!(names.contains(&("moisture".to_string(), FieldType::Number)));
    assert!(names.contains(&("site".to_string(), FieldType::Text)));

    let sites = tables.metadata.field_values("site").await.unwrap();
    assert_eq!(sites, vec!["north".to_string(), "south".to_string()]);

    assert_eq!(tables.metadata.owners().await.unwrap(), vec!["A".to_string(), "B".to_string()]);

    assert!(tables.metadata.delete_field("A", "site").await.unwrap());
    assert!(!tables.metadata.delete_field("A", "site").await.unwrap());

    // moisture + insert_timestamp remain for A
    assert_eq!(tables.metadata.delete("A").await.unwrap(), 2);
    assert!(!tables.metadata.exists("A").await.unwrap());
    assert!(tables.metadata.exists("B").await.unwrap());
}

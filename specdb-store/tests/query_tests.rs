//! Filter queries executed against a populated store

mod helpers;

use chrono::NaiveDate;
use helpers::{numbered_readings, open_temp_tables, sample_reading};
use specdb_store::metadata::{FIELD_DUMMY, FIELD_INSERT_TIMESTAMP};
use specdb_store::{Error, FieldRange, Filter, MetadataRecord, SortKey, Tables};

async fn populate(tables: &Tables, n: usize) -> Vec<i64> {
    let mut ids = Vec::new();
    for reading in numbered_readings(n) {
        ids.push(tables.readings.insert(&reading).await.unwrap());
    }
    ids
}

fn external_ids(readings: &[specdb_store::Reading]) -> Vec<String> {
    readings.iter().map(|r| r.external_id.clone()).collect()
}

#[tokio::test]
async fn test_empty_filter_returns_everything_in_id_order() {
    let (_dir, _db, tables) = open_temp_tables().await;
    let ids = populate(&tables, 4).await;

    let readings = tables.readings.query(&Filter::new()).await.unwrap();
    let found: Vec<i64> = readings.iter().filter_map(|r| r.id).collect();
    assert_eq!(found, ids);
}

#[tokio::test]
async fn test_range_filter_and_latest() {
    let (_dir, _db, tables) = open_temp_tables().await;
    populate(&tables, 10).await;

    let filter = Filter::new().with_range(FieldRange::new("moisture", Some(5.0), Some(10.0)));
    let ascending = tables.readings.query(&filter).await.unwrap();
    assert_eq!(external_ids(&ascending), vec!["r05", "r06", "r07", "r08", "r09", "r10"]);

    let descending = tables.readings.query(&filter.clone().latest(true)).await.unwrap();
    assert_eq!(external_ids(&descending), vec!["r10", "r09", "r08", "r07", "r06", "r05"]);
}

#[tokio::test]
async fn test_range_compares_numerically() {
    let (_dir, _db, tables) = open_temp_tables().await;
    populate(&tables, 10).await;

    // Text comparison would place "10" below "9"
    let filter = Filter::new().with_range(FieldRange::new("moisture", Some(9.0), None));
    let readings = tables.readings.query(&filter).await.unwrap();
    assert_eq!(external_ids(&readings), vec!["r09", "r10"]);
}

#[tokio::test]
async fn test_unbounded_range_is_ignored() {
    let (_dir, _db, tables) = open_temp_tables().await;
    populate(&tables, 3).await;

    let filter = Filter::new().with_range(FieldRange::from_raw("moisture", -1.0, -1.0));
    assert_eq!(tables.readings.query(&filter).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_limit_caps_results() {
    let (_dir, _db, tables) = open_temp_tables().await;
    populate(&tables, 10).await;

    let readings = tables.readings.query(&Filter::new().with_limit(3)).await.unwrap();
    assert_eq!(external_ids(&readings), vec!["r01", "r02", "r03"]);

    let unlimited = tables.readings.query(&Filter::new().with_limit(0)).await.unwrap();
    assert_eq!(unlimited.len(), 10);
}

#[tokio::test]
async fn test_dummy_filters() {
    let (_dir, _db, tables) = open_temp_tables().await;
    populate(&tables, 5).await;

    for (owner, dummy) in [("r01", true), ("r02", true), ("r03", false)] {
        tables
            .metadata
            .store(owner, &MetadataRecord::new().with(FIELD_DUMMY, dummy))
            .await
            .unwrap();
    }

    let only = tables.readings.query(&Filter::new().only_dummies(true)).await.unwrap();
    assert_eq!(external_ids(&only), vec!["r01", "r02"]);
    assert!(only.iter().all(|r| r.metadata.is_dummy()));

    // Readings with no dummy field at all are not dummies
    let excluded = tables.readings.query(&Filter::new().exclude_dummies(true)).await.unwrap();
    assert_eq!(external_ids(&excluded), vec!["r03", "r04", "r05"]);
}

#[tokio::test]
async fn test_invalid_filter_fails_before_query() {
    let (_dir, _db, tables) = open_temp_tables().await;

    let filter = Filter::new().only_dummies(true).exclude_dummies(true);
    let result = tables.readings.query(&filter).await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let result = tables.readings.stream(&filter, false).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_regex_filters() {
    let (_dir, _db, tables) = open_temp_tables().await;
    populate(&tables, 10).await;
    tables
        .readings
        .insert(
            &sample_reading("x-01", 4.0)
                .with_tag("barley")
                .with_format("MIR")
                .with_metadata(MetadataRecord::new().with("instrument", "DA7250").with("moisture", 4.0)),
        )
        .await
        .unwrap();

    let by_id = Filter::new().with_external_id_regex("^r0[1-3]$");
    assert_eq!(external_ids(&tables.readings.query(&by_id).await.unwrap()), vec!["r01", "r02", "r03"]);

    let by_tag = Filter::new().with_tag_regex("^bar");
    assert_eq!(external_ids(&tables.readings.query(&by_tag).await.unwrap()), vec!["x-01"]);

    let by_format = Filter::new().with_format_regex("^MIR$");
    assert_eq!(external_ids(&tables.readings.query(&by_format).await.unwrap()), vec!["x-01"]);

    let by_instrument = Filter::new().with_instrument_regex("7250");
    assert_eq!(external_ids(&tables.readings.query(&by_instrument).await.unwrap()), vec!["x-01"]);
}

#[tokio::test]
async fn test_field_regex_combined_with_range_on_same_field() {
    let (_dir, _db, tables) = open_temp_tables().await;
    for (id, site, moisture) in [("a", "north", 5.0), ("b", "north", 12.0), ("c", "south", 6.0)] {
        let reading = sample_reading(id, moisture)
            .with_metadata(MetadataRecord::new().with("site", site).with("moisture", moisture));
        tables.readings.insert(&reading).await.unwrap();
    }

    let filter = Filter::new()
        .with_field_regex("site", "^north$")
        .with_range(FieldRange::new("moisture", Some(4.0), Some(8.0)))
        .with_range(FieldRange::new("moisture", None, Some(7.0)));
    let readings = tables.readings.query(&filter).await.unwrap();
    assert_eq!(external_ids(&readings), vec!["a"]);
}

#[tokio::test]
async fn test_required_field() {
    let (_dir, _db, tables) = open_temp_tables().await;
    populate(&tables, 3).await;
    tables
        .metadata
        .store("r02", &MetadataRecord::new().with("protein", 13.1))
        .await
        .unwrap();

    let filter = Filter::new().with_required_field("protein");
    assert_eq!(external_ids(&tables.readings.query(&filter).await.unwrap()), vec!["r02"]);
}

#[tokio::test]
async fn test_insert_date_bounds_and_sort() {
    let (_dir, _db, tables) = open_temp_tables().await;
    let stamps = [
        ("early", "2023-03-01 09:00:00"),
        ("middle", "2023-06-15 12:30:00"),
        ("late", "2023-12-24 18:45:00"),
    ];
    // Insert out of chronological order so id order differs from time order
    for (owner, stamp) in [stamps[2], stamps[0], stamps[1]] {
        let reading = sample_reading(owner, 1.0)
            .with_metadata(MetadataRecord::new().with(FIELD_INSERT_TIMESTAMP, stamp));
        tables.readings.insert(&reading).await.unwrap();
    }

    let after = NaiveDate::from_ymd_opt(2023, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let before = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let filter = Filter::new()
        .inserted_between(Some(after), Some(before))
        .sorted_by(SortKey::InsertTimestamp);
    assert_eq!(external_ids(&tables.readings.query(&filter).await.unwrap()), vec!["middle", "late"]);

    let all_by_time = Filter::new().sorted_by(SortKey::InsertTimestamp).latest(true);
    assert_eq!(
        external_ids(&tables.readings.query(&all_by_time).await.unwrap()),
        vec!["late", "middle", "early"]
    );
}

#[tokio::test]
async fn test_sort_by_external_id() {
    let (_dir, _db, tables) = open_temp_tables().await;
    for owner in ["m", "z", "a"] {
        tables.readings.insert(&sample_reading(owner, 1.0)).await.unwrap();
    }

    let filter = Filter::new().sorted_by(SortKey::ExternalId);
    assert_eq!(external_ids(&tables.readings.query(&filter).await.unwrap()), vec!["a", "m", "z"]);
}

#[tokio::test]
async fn test_query_ids_matches_query() {
    let (_dir, _db, tables) = open_temp_tables().await;
    populate(&tables, 6).await;

    let filter = Filter::new()
        .with_range(FieldRange::new("moisture", Some(2.0), Some(4.0)))
        .latest(true);
    let readings = tables.readings.query(&filter).await.unwrap();
    let ids = tables.readings.query_ids(&filter).await.unwrap();

    let expected: Vec<i64> = readings.iter().filter_map(|r| r.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(ids.len(), 3);
}

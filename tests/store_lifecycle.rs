//! Store lifecycle tests
//!
//! Build on first use, order preservation, idempotence, lookups, and
//! rebuilding after the artifact is removed from outside.

mod common;

use std::fs;

use common::*;
use irstore::{Lookup, Record, StoreErrorCode, StoreState};
use tempfile::TempDir;

// =============================================================================
// Scenario: d1, d2, d3
// =============================================================================

#[test]
fn test_three_document_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let (store, calls) = counting_store(temp_dir.path(), corpus());

    store.build().unwrap();
    assert_eq!(store.count().unwrap(), 3);

    match store.get_by_key("doc_id", "d2").unwrap() {
        Lookup::Unique(Some(found)) => assert_eq!(found, corpus()[1]),
        other => panic!("expected d2, got {:?}", other),
    }

    let listed: Vec<Doc> = (&store).into_iter().map(Result::unwrap).collect();
    assert_eq!(listed, corpus());

    // Remove the artifact from outside; the next scan rebuilds it
    fs::remove_file(artifact_path(temp_dir.path())).unwrap();
    assert!(!store.built());
    assert_eq!(store.count().unwrap_err().code(), StoreErrorCode::NotBuilt);

    let rebuilt: Vec<Doc> = store.iterate().unwrap().map(Result::unwrap).collect();
    assert_eq!(rebuilt, corpus());
    assert_eq!(store.count().unwrap(), 3);
    assert_eq!(calls.get(), 2);
}

// =============================================================================
// Order and idempotence
// =============================================================================

#[test]
fn test_iteration_preserves_producer_order() {
    let temp_dir = TempDir::new().unwrap();
    let records = large_corpus(2_500);
    let (store, _) = counting_store(temp_dir.path(), records.clone());

    let first: Vec<Doc> = store.iterate().unwrap().map(Result::unwrap).collect();
    let second: Vec<Doc> = store.iterate().unwrap().map(Result::unwrap).collect();

    assert_eq!(first, records);
    assert_eq!(second, records);
}

#[test]
fn test_second_build_never_runs_producer() {
    let temp_dir = TempDir::new().unwrap();
    let (store, calls) = counting_store(temp_dir.path(), corpus());

    store.build().unwrap();
    store.build().unwrap();
    let _ = store.iterate().unwrap().count();
    let _ = store.get("d3").unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn test_new_store_on_existing_artifact_reuses_it() {
    let temp_dir = TempDir::new().unwrap();
    {
        let (store, _) = counting_store(temp_dir.path(), corpus());
        store.build().unwrap();
    }

    // Same path, fresh instance: as if a new process opened it
    let (store, calls) = counting_store(temp_dir.path(), corpus());
    assert!(store.built());
    let listed: Vec<Doc> = store.iterate().unwrap().map(Result::unwrap).collect();
    assert_eq!(listed, corpus());
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_streaming_build_yields_before_completion() {
    let temp_dir = TempDir::new().unwrap();
    let (store, _) = counting_store(temp_dir.path(), corpus());

    let mut iter = store.iterate().unwrap();
    assert!(iter.is_building());

    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.doc_id, "d1");
    assert!(!store.built());
    assert!(tmp_path(temp_dir.path()).exists());

    assert_eq!(iter.by_ref().count(), 2);
    drop(iter);

    assert!(store.built());
    assert!(!tmp_path(temp_dir.path()).exists());
    assert_eq!(store.state().unwrap(), StoreState::Complete);
}

// =============================================================================
// Lookups
// =============================================================================

#[test]
fn test_unique_lookup_returns_every_record() {
    let temp_dir = TempDir::new().unwrap();
    let records = large_corpus(300);
    let (store, _) = counting_store(temp_dir.path(), records.clone());

    for record in &records {
        assert_eq!(store.get(&record.doc_id).unwrap().as_ref(), Some(record));
    }
    assert_eq!(store.get("doc99999").unwrap(), None);
    assert_eq!(store.get_by_key("doc_id", "nope").unwrap(), Lookup::Unique(None));
}

#[test]
fn test_non_unique_lookup_in_log_order() {
    let temp_dir = TempDir::new().unwrap();
    let records = large_corpus(30);
    let (store, _) = counting_store(temp_dir.path(), records.clone());

    let expected: Vec<Doc> = records.iter().filter(|d| d.venue == "APS").cloned().collect();
    assert_eq!(store.get_by_key("venue", "APS").unwrap(), Lookup::Many(expected));
    assert_eq!(store.get_by_key("venue", "Nature").unwrap(), Lookup::Many(Vec::new()));
}

#[test]
fn test_unindexed_field_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (store, calls) = counting_store(temp_dir.path(), corpus());

    assert!(Doc::has_field("title"));
    let err = store.get_by_key("title", "Spin glasses").unwrap_err();
    assert_eq!(err.code(), StoreErrorCode::UnknownIndex);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_get_many_and_positions() {
    let temp_dir = TempDir::new().unwrap();
    let (store, _) = counting_store(temp_dir.path(), corpus());

    let found = store.get_many(vec!["d3".to_string(), "d1".to_string(), "d7".to_string()]).unwrap();
    assert_eq!(ids(&found), vec!["d1", "d3"]);

    assert_eq!(store.get_at(1).unwrap(), Some(corpus()[1].clone()));
    let slice: Vec<Doc> = store.iter_range(1..3).unwrap().map(Result::unwrap).collect();
    assert_eq!(ids(&slice), vec!["d2", "d3"]);
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_count_never_builds() {
    let temp_dir = TempDir::new().unwrap();
    let (store, calls) = counting_store(temp_dir.path(), corpus());

    assert_eq!(store.count().unwrap_err().code(), StoreErrorCode::NotBuilt);
    assert_eq!(store.count_if_built().unwrap(), None);
    assert_eq!(store.state().unwrap(), StoreState::Absent);
    assert_eq!(calls.get(), 0);
    assert!(!artifact_path(temp_dir.path()).exists());
}

#[test]
fn test_info_and_verify() {
    let temp_dir = TempDir::new().unwrap();
    let (store, _) = counting_store(temp_dir.path(), corpus());
    store.build().unwrap();

    let info = store.info().unwrap();
    assert_eq!(info.record_count, 3);
    assert!(info.built_at.is_some());
    assert_eq!(info.indexed_fields, vec!["doc_id".to_string(), "venue".to_string()]);
    assert_eq!(info.size_bytes, fs::metadata(artifact_path(temp_dir.path())).unwrap().len());

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["record_count"], 3);

    let report = store.verify().unwrap();
    assert_eq!(report.records, 3);
    assert_eq!(report.indexes, 2);
}

#[test]
fn test_empty_producer_builds_empty_store() {
    let temp_dir = TempDir::new().unwrap();
    let (store, calls) = counting_store(temp_dir.path(), Vec::new());

    assert_eq!(store.iterate().unwrap().count(), 0);
    assert!(store.built());
    assert_eq!(store.count().unwrap(), 0);
    assert_eq!(store.get("d1").unwrap(), None);
    assert_eq!(calls.get(), 1);
}

//! Shared fixtures for store integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use irstore::artifact::IndexSpec;
use irstore::{ProducerError, Store, StoreConfig, StoreSettings};

irstore::define_record! {
    pub struct Doc {
        pub doc_id: String,
        pub title: String,
        pub venue: String,
    }
}

pub type Records = Vec<Result<Doc, ProducerError>>;

pub fn doc(id: &str, title: &str, venue: &str) -> Doc {
    Doc {
        doc_id: id.to_string(),
        title: title.to_string(),
        venue: venue.to_string(),
    }
}

/// The three-document corpus
pub fn corpus() -> Vec<Doc> {
    vec![
        doc("d1", "Bose-Einstein condensates", "arXiv"),
        doc("d2", "Dark matter halos", "PhilPapers"),
        doc("d3", "Spin glasses", "arXiv"),
    ]
}

/// A larger corpus with repeating venues
pub fn large_corpus(n: usize) -> Vec<Doc> {
    (0..n)
        .map(|i| {
            doc(
                &format!("doc{:05}", i),
                &format!("Title number {}", i),
                ["arXiv", "PhilPapers", "APS"][i % 3],
            )
        })
        .collect()
}

pub fn artifact_path(dir: &Path) -> PathBuf {
    dir.join("docs.irs")
}

pub fn tmp_path(dir: &Path) -> PathBuf {
    dir.join("docs.irs.tmp")
}

pub fn config(dir: &Path) -> StoreConfig {
    StoreConfig::new(artifact_path(dir), "doc_id")
        .with_index(IndexSpec::multi("venue"))
        .with_count_hint(Some(3))
}

/// Counts producer invocations
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store over `records` that counts how often its producer runs.
pub fn counting_store(dir: &Path, records: Vec<Doc>) -> (Store<Doc>, Calls) {
    counting_store_with(config(dir), records, Duration::ZERO)
}

/// Like [`counting_store`], pausing `delay` before each record.
pub fn counting_store_with(config: StoreConfig, records: Vec<Doc>, delay: Duration) -> (Store<Doc>, Calls) {
    let calls = Calls::default();
    let counter = calls.clone();
    let store = Store::new(config, move || -> Result<_, ProducerError> {
        counter.bump();
        let records = records.clone();
        Ok(records.into_iter().map(move |d| {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            Ok::<_, ProducerError>(d)
        }))
    })
    .expect("valid store config");
    (store, calls)
}

/// Store whose producer yields `records` and then fails.
pub fn failing_store(dir: &Path, records: Vec<Doc>) -> Store<Doc> {
    Store::new(config(dir), move || -> Result<Records, ProducerError> {
        let mut items: Records = records.clone().into_iter().map(Ok).collect();
        items.push(Err("archive truncated".into()));
        Ok(items)
    })
    .expect("valid store config")
}

pub fn settings_with_timeout(ms: u64) -> StoreSettings {
    StoreSettings {
        lock_timeout_ms: Some(ms),
        ..StoreSettings::default()
    }
}

pub fn ids(docs: &[Doc]) -> Vec<&str> {
    docs.iter().map(|d| d.doc_id.as_str()).collect()
}

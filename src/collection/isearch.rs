//! iSearch test collection
//!
//! Physics documents (book records, articles, metadata), search tasks with
//! structured information-need descriptions, and graded judgements. The
//! document store lives at `<base>/docs.irs`, keyed by `doc_id`.
//!
//! Parsing the raw distribution (nested tarballs of XML, TREC topic and
//! qrel files) is up to the producers handed to [`dataset`].

use std::path::{Path, PathBuf};

use super::{qrel_defs, Dataset, Docs};
use crate::errors::StoreResult;
use crate::store::{CountHints, Producer, Store, StoreConfig, StoreSettings};

/// Collection name, also the count-hint key
pub const NAME: &str = "isearch";

/// Language of documents and queries
pub const LANG: &str = "en";

/// What the relevance levels in qrels mean
pub const QREL_DEFS: &[(i64, &str)] = &[
    (2, "highly relevant"),
    (1, "relevant"),
    (0, "not relevant"),
];

/// Topic file tags and the query fields they fill
pub const QUERY_TAGS: &[(&str, &str)] = &[
    ("<num>", "query_id"),
    ("<infoneed>", "infoneed"),
    ("<task>", "task"),
    ("<background>", "background"),
    ("<ideal>", "ideal"),
    ("<keywords>", "keywords"),
];

/// Query field filled by a topic file tag.
pub fn query_field_for_tag(tag: &str) -> Option<&'static str> {
    QUERY_TAGS
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, field)| *field)
}

crate::define_record! {
    /// One iSearch document
    pub struct IsearchDoc {
        pub doc_id: String,
        pub document_link: String,
        pub category: String,
        pub title: String,
        pub author: String,
        pub subject: String,
        pub description: String,
        pub venue: String,
        pub fulltext: String,
        pub document_type: String,
    }
}

impl IsearchDoc {
    /// Title followed by the document link
    pub fn default_text(&self) -> String {
        format!("{} {}", self.title, self.document_link)
    }
}

crate::define_record! {
    /// One search task
    pub struct IsearchQuery {
        pub query_id: String,
        pub infoneed: String,
        pub keywords: String,
        pub task: String,
        pub background: String,
        pub ideal: String,
    }
}

impl IsearchQuery {
    pub fn default_text(&self) -> &str {
        &self.keywords
    }
}

crate::define_record! {
    /// A TREC-style relevance judgement
    pub struct TrecQrel {
        pub query_id: String,
        pub doc_id: String,
        pub relevance: i64,
        pub iteration: String,
    }
}

/// The iSearch dataset type
pub type IsearchDataset = Dataset<IsearchDoc, IsearchQuery, TrecQrel>;

/// Producers for each part of the collection
pub struct Sources {
    docs: Box<dyn Producer<IsearchDoc>>,
    queries: Option<Box<dyn Producer<IsearchQuery>>>,
    qrels: Option<Box<dyn Producer<TrecQrel>>>,
}

impl Sources {
    pub fn new<P>(docs: P) -> Self
    where
        P: Producer<IsearchDoc> + 'static,
    {
        Self {
            docs: Box::new(docs),
            queries: None,
            qrels: None,
        }
    }

    pub fn with_queries<P>(mut self, queries: P) -> Self
    where
        P: Producer<IsearchQuery> + 'static,
    {
        self.queries = Some(Box::new(queries));
        self
    }

    pub fn with_qrels<P>(mut self, qrels: P) -> Self
    where
        P: Producer<TrecQrel> + 'static,
    {
        self.qrels = Some(Box::new(qrels));
        self
    }
}

/// Where the document store is kept under `base_path`
pub fn docs_path(base_path: &Path) -> PathBuf {
    base_path.join("docs.irs")
}

/// Assembles the iSearch dataset rooted at `base_path`.
///
/// Nothing is read or built here; the document store is built on first use.
pub fn dataset(
    base_path: &Path,
    sources: Sources,
    settings: &StoreSettings,
    hints: &CountHints,
) -> StoreResult<IsearchDataset> {
    let config = StoreConfig::new(docs_path(base_path), "doc_id")
        .with_count_hint(hints.get(NAME))
        .with_settings(settings.clone());
    let store = Store::new(config, sources.docs)?;

    let mut dataset = Dataset::new(NAME).with_docs(Docs::new(store, NAME, Some(LANG)));
    if let Some(queries) = sources.queries {
        dataset = dataset.with_queries(queries, Some(LANG));
    }
    if let Some(qrels) = sources.qrels {
        dataset = dataset.with_qrels(qrels, qrel_defs(QREL_DEFS));
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_tags() {
        assert_eq!(query_field_for_tag("<num>"), Some("query_id"));
        assert_eq!(query_field_for_tag("<keywords>"), Some("keywords"));
        assert_eq!(query_field_for_tag("<title>"), None);
        assert_eq!(QUERY_TAGS.len(), 6);
    }

    #[test]
    fn test_qrel_defs() {
        let defs = qrel_defs(QREL_DEFS);
        assert_eq!(defs.get(&2).map(String::as_str), Some("highly relevant"));
        assert_eq!(defs.get(&0).map(String::as_str), Some("not relevant"));
    }

    #[test]
    fn test_record_shapes() {
        use crate::record::Record;

        assert_eq!(IsearchDoc::FIELDS.len(), 10);
        assert_eq!(IsearchQuery::FIELDS.len(), 6);
        assert!(TrecQrel::has_field("relevance"));
    }

    #[test]
    fn test_default_text() {
        let doc = IsearchDoc {
            doc_id: "PN000001".to_string(),
            document_link: "http://example.org/PN000001".to_string(),
            category: "physics".to_string(),
            title: "Quantum dots".to_string(),
            author: String::new(),
            subject: String::new(),
            description: String::new(),
            venue: String::new(),
            fulltext: String::new(),
            document_type: "article".to_string(),
        };
        assert_eq!(doc.default_text(), "Quantum dots http://example.org/PN000001");
    }
}

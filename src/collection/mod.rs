//! Test collections built on stores
//!
//! A collection bundles a document store with query and qrel producers and
//! the meaning of its relevance levels. Collections are composed by
//! factory functions (see [`isearch::dataset`]) and gathered into an
//! explicit [`Catalog`]; there is no global registry.

pub mod isearch;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::artifact::VerifyReport;
use crate::errors::{StoreError, StoreErrorCode, StoreResult};
use crate::record::Record;
use crate::store::{Producer, RecordIter, Store};

/// Records pulled from a producer, with failures as store errors
pub type Items<'a, T> = Box<dyn Iterator<Item = StoreResult<T>> + 'a>;

/// Relevance level → meaning
pub type QrelDefs = BTreeMap<i64, String>;

/// Builds [`QrelDefs`] from a static table.
pub fn qrel_defs(table: &[(i64, &str)]) -> QrelDefs {
    table
        .iter()
        .map(|(level, meaning)| (*level, meaning.to_string()))
        .collect()
}

/// The document side of a collection
pub struct Docs<R: Record> {
    store: Store<R>,
    namespace: String,
    lang: Option<String>,
}

impl<R: Record> Docs<R> {
    pub fn new(store: Store<R>, namespace: impl Into<String>, lang: Option<&str>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            lang: lang.map(str::to_string),
        }
    }

    /// Documents in corpus order, building the store on first use.
    pub fn docs_iter(&self) -> StoreResult<RecordIter<'_, R>> {
        self.store.iterate()
    }

    pub fn docs_store(&self) -> &Store<R> {
        &self.store
    }

    /// Document count, known only once the store is built.
    pub fn docs_count(&self) -> StoreResult<Option<u64>> {
        self.store.count_if_built()
    }

    pub fn docs_lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn docs_namespace(&self) -> &str {
        &self.namespace
    }

    pub fn docs_path(&self) -> &Path {
        self.store.path()
    }
}

impl<R: Record> fmt::Debug for Docs<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Docs")
            .field("namespace", &self.namespace)
            .field("path", &self.store.path())
            .finish()
    }
}

fn drain<'a, T: 'static>(producer: &'a dyn Producer<T>) -> StoreResult<Items<'a, T>> {
    let records = producer.produce().map_err(StoreError::producer)?;
    Ok(Box::new(records.map(|item| item.map_err(StoreError::producer))))
}

/// Documents, queries and qrels of one collection.
pub struct Dataset<D: Record, Q, Qr> {
    name: String,
    docs: Option<Docs<D>>,
    queries: Option<Box<dyn Producer<Q>>>,
    queries_lang: Option<String>,
    qrels: Option<Box<dyn Producer<Qr>>>,
    qrel_defs: QrelDefs,
}

impl<D, Q, Qr> Dataset<D, Q, Qr>
where
    D: Record,
    Q: 'static,
    Qr: 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: None,
            queries: None,
            queries_lang: None,
            qrels: None,
            qrel_defs: QrelDefs::new(),
        }
    }

    pub fn with_docs(mut self, docs: Docs<D>) -> Self {
        self.docs = Some(docs);
        self
    }

    pub fn with_queries<P>(mut self, producer: P, lang: Option<&str>) -> Self
    where
        P: Producer<Q> + 'static,
    {
        self.queries = Some(Box::new(producer));
        self.queries_lang = lang.map(str::to_string);
        self
    }

    pub fn with_qrels<P>(mut self, producer: P, defs: QrelDefs) -> Self
    where
        P: Producer<Qr> + 'static,
    {
        self.qrels = Some(Box::new(producer));
        self.qrel_defs = defs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn docs(&self) -> Option<&Docs<D>> {
        self.docs.as_ref()
    }

    fn require_docs(&self) -> StoreResult<&Docs<D>> {
        self.docs
            .as_ref()
            .ok_or_else(|| StoreError::config_invalid(format!("Dataset '{}' has no documents", self.name)))
    }

    /// Documents in corpus order, building the store on first use.
    pub fn docs_iter(&self) -> StoreResult<RecordIter<'_, D>> {
        self.require_docs()?.docs_iter()
    }

    pub fn docs_store(&self) -> StoreResult<&Store<D>> {
        Ok(self.require_docs()?.docs_store())
    }

    /// A fresh pass over the queries.
    pub fn queries_iter(&self) -> StoreResult<Items<'_, Q>> {
        let producer = self
            .queries
            .as_deref()
            .ok_or_else(|| StoreError::config_invalid(format!("Dataset '{}' has no queries", self.name)))?;
        drain(producer)
    }

    pub fn queries_lang(&self) -> Option<&str> {
        self.queries_lang.as_deref()
    }

    /// A fresh pass over the relevance judgements.
    pub fn qrels_iter(&self) -> StoreResult<Items<'_, Qr>> {
        let producer = self
            .qrels
            .as_deref()
            .ok_or_else(|| StoreError::config_invalid(format!("Dataset '{}' has no qrels", self.name)))?;
        drain(producer)
    }

    pub fn qrel_defs(&self) -> &QrelDefs {
        &self.qrel_defs
    }
}

impl<D: Record, Q, Qr> fmt::Debug for Dataset<D, Q, Qr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("docs", &self.docs)
            .field("queries", &self.queries.is_some())
            .field("qrels", &self.qrels.is_some())
            .finish()
    }
}

/// Type-erased view of a dataset held by a [`Catalog`]
pub trait CatalogEntry: Send + Sync {
    fn name(&self) -> &str;

    fn has_docs(&self) -> bool;

    fn has_queries(&self) -> bool;

    fn has_qrels(&self) -> bool;

    /// Whether the document store is complete; false without documents
    fn docs_built(&self) -> bool;

    fn docs_count(&self) -> StoreResult<Option<u64>>;

    fn docs_lang(&self) -> Option<&str>;

    /// Builds the document store if needed
    fn build_docs(&self) -> StoreResult<()>;

    /// Full scan of a complete document store; `None` when not built
    fn verify_docs(&self) -> StoreResult<Option<VerifyReport>>;

    fn qrel_defs(&self) -> &QrelDefs;

    fn as_any(&self) -> &dyn Any;
}

impl<D, Q, Qr> CatalogEntry for Dataset<D, Q, Qr>
where
    D: Record + 'static,
    Q: 'static,
    Qr: 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn has_docs(&self) -> bool {
        self.docs.is_some()
    }

    fn has_queries(&self) -> bool {
        self.queries.is_some()
    }

    fn has_qrels(&self) -> bool {
        self.qrels.is_some()
    }

    fn docs_built(&self) -> bool {
        self.docs.as_ref().map(|d| d.docs_store().built()).unwrap_or(false)
    }

    fn docs_count(&self) -> StoreResult<Option<u64>> {
        match &self.docs {
            Some(docs) => docs.docs_count(),
            None => Ok(None),
        }
    }

    fn docs_lang(&self) -> Option<&str> {
        self.docs.as_ref().and_then(|d| d.docs_lang())
    }

    fn build_docs(&self) -> StoreResult<()> {
        self.require_docs()?.docs_store().build()
    }

    fn verify_docs(&self) -> StoreResult<Option<VerifyReport>> {
        let store = self.require_docs()?.docs_store();
        match store.verify() {
            Ok(report) => Ok(Some(report)),
            Err(e) if e.code() == StoreErrorCode::NotBuilt => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn qrel_defs(&self) -> &QrelDefs {
        &self.qrel_defs
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Named collections, assembled explicitly by the caller
#[derive(Default, Clone)]
pub struct Catalog {
    entries: BTreeMap<String, Arc<dyn CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. Names are unique.
    pub fn register(&mut self, entry: Arc<dyn CatalogEntry>) -> StoreResult<()> {
        let name = entry.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(StoreError::config_invalid(format!(
                "Dataset '{}' is already registered",
                name
            )));
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CatalogEntry>> {
        self.entries.get(name).cloned()
    }

    /// Typed access to a registered dataset.
    pub fn dataset<D, Q, Qr>(&self, name: &str) -> Option<&Dataset<D, Q, Qr>>
    where
        D: Record + 'static,
        Q: 'static,
        Qr: 'static,
    {
        self.entries.get(name)?.as_any().downcast_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn CatalogEntry>)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

/// Builds a catalog from entries, rejecting duplicate names.
pub fn assemble<I>(entries: I) -> StoreResult<Catalog>
where
    I: IntoIterator<Item = Arc<dyn CatalogEntry>>,
{
    let mut catalog = Catalog::new();
    for entry in entries {
        catalog.register(entry)?;
    }
    Ok(catalog)
}

//! Transactional dataset of named graphs
//!
//! A `Dataset` publishes immutable [`Snapshot`]s. Read transactions work on the snapshot that was
//! current when they began. Write transactions are serialized by a writer lock and collect their
//! changes in a per-graph overlay; commit replays the change log onto the committed graphs, which
//! are only copied when an older snapshot is still held elsewhere.

use super::store::Graph;
use super::types::{NamedNode, Quad, RdfObject, RdfPredicate, RdfSubject, Triple, TriplePattern};
use crate::persistence::{QuadChange, QuadStorage, StorageError};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Triple-store gateway errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Write attempted in a read transaction
    #[error("Transaction is read-only")]
    ReadOnly,

    /// Durable storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Immutable view of every named graph at one point in time
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    graphs: IndexMap<String, Arc<Graph>>,
}

impl Snapshot {
    /// Get a named graph
    pub fn graph(&self, name: &str) -> Option<&Graph> {
        self.graphs.get(name).map(|g| g.as_ref())
    }

    /// All named graphs in creation order
    pub fn graphs(&self) -> impl Iterator<Item = (&str, &Graph)> {
        self.graphs.iter().map(|(name, g)| (name.as_str(), g.as_ref()))
    }

    /// Total number of triples across graphs
    pub fn len(&self) -> usize {
        self.graphs.values().map(|g| g.len()).sum()
    }

    /// Whether every graph is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn graph_mut(&mut self, name: &str) -> &mut Graph {
        let graph = self.graphs.entry(name.to_string()).or_default();
        Arc::make_mut(graph)
    }

    fn apply(&mut self, change: &QuadChange) {
        match change {
            QuadChange::Insert(quad) => {
                self.graph_mut(quad.graph.as_str()).insert(quad.triple.clone());
            }
            QuadChange::Remove(quad) => {
                self.graph_mut(quad.graph.as_str()).remove(&quad.triple);
            }
        }
    }
}

/// Uncommitted changes of one graph
#[derive(Debug, Default)]
struct GraphDelta {
    /// Triples asserted by the transaction, in insertion order
    added: Graph,
    /// Committed triples retracted by the transaction
    removed: HashSet<Triple>,
}

/// One named graph as a transaction sees it: the committed triples without the ones it retracted,
/// followed by the ones it asserted
#[derive(Clone, Copy)]
pub struct GraphView<'a> {
    base: Option<&'a Graph>,
    delta: Option<&'a GraphDelta>,
}

impl<'a> GraphView<'a> {
    fn visible(&self, triple: &Triple) -> bool {
        self.delta.map_or(true, |d| !d.removed.contains(triple))
    }

    /// Triples matching a pattern, in store order
    pub fn query(&self, pattern: &TriplePattern) -> Vec<&'a Triple> {
        let mut found: Vec<&'a Triple> = match self.base {
            Some(base) => base
                .query(pattern)
                .into_iter()
                .filter(|t| self.visible(t))
                .collect(),
            None => Vec::new(),
        };
        if let Some(delta) = self.delta {
            found.extend(delta.added.query(pattern));
        }
        found
    }

    /// Check if a triple is visible
    pub fn contains(&self, triple: &Triple) -> bool {
        (self.base.map_or(false, |g| g.contains(triple)) && self.visible(triple))
            || self.delta.map_or(false, |d| d.added.contains(triple))
    }

    /// Check if the subject has at least one visible triple
    pub fn contains_subject(&self, subject: &RdfSubject) -> bool {
        if self.delta.map_or(false, |d| d.added.contains_subject(subject)) {
            return true;
        }
        let pattern = TriplePattern::new(Some(subject.clone()), None, None);
        self.base
            .map_or(false, |g| g.query(&pattern).into_iter().any(|t| self.visible(t)))
    }

    /// Number of visible triples
    pub fn len(&self) -> usize {
        let base = self.base.map_or(0, |g| g.len());
        match self.delta {
            Some(delta) => base - delta.removed.len() + delta.added.len(),
            None => base,
        }
    }

    /// Whether no triple is visible
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visible triples in store order
    pub fn iter(&self) -> impl Iterator<Item = &'a Triple> + 'a {
        let removed = self.delta.map(|d| &d.removed);
        let base = self
            .base
            .into_iter()
            .flat_map(|g| g.iter())
            .filter(move |t| removed.map_or(true, |r| !r.contains(*t)));
        let added = self.delta.into_iter().flat_map(|d| d.added.iter());
        base.chain(added)
    }

    /// All distinct subjects and objects, in order of first appearance
    pub fn nodes(&self) -> Vec<RdfObject> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for triple in self.iter() {
            let subject = RdfObject::from(triple.subject.clone());
            if seen.insert(subject.clone()) {
                nodes.push(subject);
            }
            if seen.insert(triple.object.clone()) {
                nodes.push(triple.object.clone());
            }
        }
        nodes
    }
}

/// Transaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Snapshot read
    Read,
    /// Serialized write
    Write,
}

/// Scoped unit of work against the dataset
///
/// Reads observe the snapshot the transaction started from plus its own writes.
pub struct Transaction {
    mode: TxMode,
    snapshot: Arc<Snapshot>,
    delta: IndexMap<String, GraphDelta>,
    changes: Vec<QuadChange>,
}

impl Transaction {
    fn new(mode: TxMode, snapshot: Arc<Snapshot>) -> Self {
        Self {
            mode,
            snapshot,
            delta: IndexMap::new(),
            changes: Vec::new(),
        }
    }

    /// Transaction mode
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// The committed snapshot this transaction started from, without its own writes
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Get a named graph
    pub fn graph(&self, name: &NamedNode) -> Option<GraphView<'_>> {
        let base = self.snapshot.graph(name.as_str());
        let delta = self.delta.get(name.as_str());
        if base.is_none() && delta.is_none() {
            return None;
        }
        Some(GraphView { base, delta })
    }

    /// Every named graph, committed graphs first
    pub fn graphs(&self) -> Vec<(&str, GraphView<'_>)> {
        let mut graphs: Vec<(&str, GraphView<'_>)> = self
            .snapshot
            .graphs()
            .map(|(name, base)| {
                let view = GraphView {
                    base: Some(base),
                    delta: self.delta.get(name),
                };
                (name, view)
            })
            .collect();
        graphs.extend(
            self.delta
                .iter()
                .filter(|(name, _)| self.snapshot.graph(name).is_none())
                .map(|(name, delta)| {
                    let view = GraphView {
                        base: None,
                        delta: Some(delta),
                    };
                    (name.as_str(), view)
                }),
        );
        graphs
    }

    /// All triples of `subject` in the given graph
    pub fn triples_for_subject(&self, graph: &NamedNode, subject: &RdfSubject) -> Vec<Triple> {
        let pattern = TriplePattern::new(Some(subject.clone()), None, None);
        self.graph(graph)
            .map(|g| g.query(&pattern).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Objects of `subject predicate ?o` in the given graph
    pub fn objects_for(
        &self,
        graph: &NamedNode,
        subject: &RdfSubject,
        predicate: &RdfPredicate,
    ) -> Vec<RdfObject> {
        let pattern = TriplePattern::new(Some(subject.clone()), Some(predicate.clone()), None);
        self.graph(graph)
            .map(|g| g.query(&pattern).into_iter().map(|t| t.object.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether `subject` has any triple in the given graph
    pub fn contains_subject(&self, graph: &NamedNode, subject: &RdfSubject) -> bool {
        self.graph(graph)
            .map(|g| g.contains_subject(subject))
            .unwrap_or(false)
    }

    fn check_writable(&self) -> StoreResult<()> {
        match self.mode {
            TxMode::Write => Ok(()),
            TxMode::Read => Err(StoreError::ReadOnly),
        }
    }

    fn delta_mut(&mut self, graph: &NamedNode) -> &mut GraphDelta {
        self.delta.entry(graph.as_str().to_string()).or_default()
    }

    /// Assert a triple. Returns false if it was already present.
    pub fn insert(&mut self, graph: &NamedNode, triple: Triple) -> StoreResult<bool> {
        self.check_writable()?;
        if self.graph(graph).map_or(false, |g| g.contains(&triple)) {
            return Ok(false);
        }
        self.delta_mut(graph).added.insert(triple.clone());
        self.changes
            .push(QuadChange::Insert(Quad::new(graph.clone(), triple)));
        Ok(true)
    }

    /// Retract a triple. Returns false if it was not present.
    pub fn remove(&mut self, graph: &NamedNode, triple: &Triple) -> StoreResult<bool> {
        self.check_writable()?;
        if !self.graph(graph).map_or(false, |g| g.contains(triple)) {
            return Ok(false);
        }
        let delta = self.delta_mut(graph);
        // A committed triple asserted again lives in `added`; retracting that copy suffices
        if !delta.added.remove(triple) {
            delta.removed.insert(triple.clone());
        }
        self.changes
            .push(QuadChange::Remove(Quad::new(graph.clone(), triple.clone())));
        Ok(true)
    }

    /// Retract every triple with the given subject, returning how many were removed
    pub fn remove_subject(&mut self, graph: &NamedNode, subject: &RdfSubject) -> StoreResult<usize> {
        self.check_writable()?;
        let triples = self.triples_for_subject(graph, subject);
        for triple in &triples {
            self.remove(graph, triple)?;
        }
        Ok(triples.len())
    }

    /// Number of changes recorded so far
    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }
}

struct DatasetInner {
    committed: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    storage: Option<QuadStorage>,
}

/// Transactional, shareable dataset of named graphs
#[derive(Clone)]
pub struct Dataset {
    inner: Arc<DatasetInner>,
}

impl Dataset {
    /// Create an empty in-memory dataset
    pub fn in_memory() -> Self {
        Self::with_state(Snapshot::default(), None)
    }

    /// Open a durable dataset, replaying whatever the storage holds
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let storage = QuadStorage::open(path)?;
        let mut snapshot = Snapshot::default();
        let quads = storage.load_all()?;
        let count = quads.len();
        for quad in quads {
            snapshot.graph_mut(quad.graph.as_str()).insert(quad.triple);
        }
        info!(
            "Dataset opened at {} with {} quads in {} graphs",
            storage.path(),
            count,
            snapshot.graphs.len()
        );
        Ok(Self::with_state(snapshot, Some(storage)))
    }

    fn with_state(snapshot: Snapshot, storage: Option<QuadStorage>) -> Self {
        Self {
            inner: Arc::new(DatasetInner {
                committed: RwLock::new(Arc::new(snapshot)),
                writer: Mutex::new(()),
                storage,
            }),
        }
    }

    /// Whether committed writes reach durable storage
    pub fn is_persistent(&self) -> bool {
        self.inner.storage.is_some()
    }

    /// The currently committed snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.committed.read().unwrap().clone()
    }

    /// Run `f` in a read transaction
    pub fn read<R, E>(&self, f: impl FnOnce(&mut Transaction) -> Result<R, E>) -> Result<R, E>
    where
        E: std::fmt::Display,
    {
        let mut tx = Transaction::new(TxMode::Read, self.snapshot());
        f(&mut tx).map_err(|e| {
            debug!("Read transaction failed: {}", e);
            e
        })
    }

    /// Run `f` in a write transaction, committing when it returns `Ok`
    ///
    /// Any error aborts the transaction and nothing it wrote becomes visible.
    pub fn write<R, E>(&self, f: impl FnOnce(&mut Transaction) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError> + std::fmt::Display,
    {
        // A transaction that panicked never committed, so the committed state is intact
        let _writer = self.inner.writer.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering writer lock after a panicked write transaction");
            PoisonError::into_inner(poisoned)
        });
        let mut tx = Transaction::new(TxMode::Write, self.snapshot());

        let result = match f(&mut tx) {
            Ok(result) => result,
            Err(e) => {
                debug!("Write transaction aborted: {}", e);
                return Err(e);
            }
        };

        let Transaction { snapshot, changes, .. } = tx;
        drop(snapshot);
        if let Some(storage) = &self.inner.storage {
            storage.apply(&changes).map_err(StoreError::from)?;
        }

        let mut committed = self.inner.committed.write().unwrap();
        let state = Arc::make_mut(&mut committed);
        for change in &changes {
            state.apply(change);
        }
        debug!("Committed write transaction with {} changes", changes.len());
        Ok(result)
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::Literal;

    fn graph() -> NamedNode {
        NamedNode::new("http://imeji.org/item").unwrap()
    }

    fn triple(subject: &str, name: &str) -> Triple {
        Triple::new(
            RdfSubject::iri(subject).unwrap(),
            RdfPredicate::new("http://imeji.org/terms/filename").unwrap(),
            Literal::new_simple_literal(name).into(),
        )
    }

    #[test]
    fn test_commit_publishes() {
        let dataset = Dataset::in_memory();
        dataset
            .write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/1", "a.png"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        assert_eq!(dataset.snapshot().len(), 1);
    }

    #[test]
    fn test_abort_discards() {
        #[derive(Debug)]
        struct Boom;
        impl std::fmt::Display for Boom {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "boom")
            }
        }
        impl From<StoreError> for Boom {
            fn from(_: StoreError) -> Self {
                Boom
            }
        }

        let dataset = Dataset::in_memory();
        let result: Result<(), Boom> = dataset.write(|tx| {
            tx.insert(&graph(), triple("http://example.org/i/1", "a.png"))?;
            Err(Boom)
        });
        assert!(result.is_err());
        assert!(dataset.snapshot().is_empty());
    }

    #[test]
    fn test_read_transaction_is_read_only() {
        let dataset = Dataset::in_memory();
        let result = dataset.read(|tx| tx.insert(&graph(), triple("http://example.org/i/1", "a")));
        assert!(matches!(result, Err(StoreError::ReadOnly)));
    }

    #[test]
    fn test_snapshot_isolation() {
        let dataset = Dataset::in_memory();
        let before = dataset.snapshot();
        dataset
            .write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/1", "a.png"))?;
                // Own writes are visible inside the transaction
                assert!(tx.contains_subject(&graph(), &RdfSubject::iri("http://example.org/i/1").unwrap()));
                Ok::<_, StoreError>(())
            })
            .unwrap();

        assert!(before.is_empty());
        assert_eq!(dataset.snapshot().len(), 1);
    }

    #[test]
    fn test_remove_subject_records_changes() {
        let dataset = Dataset::in_memory();
        dataset
            .write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/1", "a.png"))?;
                tx.insert(&graph(), triple("http://example.org/i/1", "b.png"))?;
                tx.insert(&graph(), triple("http://example.org/i/2", "c.png"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let removed = dataset
            .write(|tx| {
                let n = tx.remove_subject(&graph(), &RdfSubject::iri("http://example.org/i/1").unwrap())?;
                assert_eq!(tx.pending_changes(), 2);
                Ok::<_, StoreError>(n)
            })
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(dataset.snapshot().len(), 1);
    }

    #[test]
    fn test_commit_reuses_unshared_graph() {
        let dataset = Dataset::in_memory();
        let graph_address = |dataset: &Dataset| {
            dataset.snapshot().graph(graph().as_str()).map(|g| g as *const Graph)
        };
        dataset
            .write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/1", "a.png"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        let before = graph_address(&dataset);

        dataset
            .write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/2", "b.png"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert_eq!(graph_address(&dataset), before);

        // A reader still holding the old snapshot forces a copy
        let held = dataset.snapshot();
        dataset
            .write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/3", "c.png"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert_ne!(graph_address(&dataset), before);
        assert_eq!(held.len(), 2);
        assert_eq!(dataset.snapshot().len(), 3);
    }

    #[test]
    fn test_overlay_reads_follow_store_order() {
        let dataset = Dataset::in_memory();
        let subject = RdfSubject::iri("http://example.org/i/1").unwrap();
        let a = triple("http://example.org/i/1", "a.png");
        let b = triple("http://example.org/i/1", "b.png");
        dataset
            .write(|tx| {
                tx.insert(&graph(), a.clone())?;
                tx.insert(&graph(), b.clone())?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        dataset
            .write(|tx| {
                assert!(tx.remove(&graph(), &a)?);
                assert!(!tx.remove(&graph(), &a)?);
                assert!(tx.insert(&graph(), a.clone())?);
                assert!(!tx.insert(&graph(), a.clone())?);
                assert_eq!(tx.triples_for_subject(&graph(), &subject), vec![b.clone(), a.clone()]);
                assert_eq!(tx.graph(&graph()).map(|g| g.len()), Some(2));
                // The committed snapshot is untouched until commit
                assert_eq!(tx.snapshot().len(), 2);
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let found = dataset
            .read(|tx| Ok::<_, StoreError>(tx.triples_for_subject(&graph(), &subject)))
            .unwrap();
        assert_eq!(found, vec![b, a]);
    }

    #[test]
    fn test_graphs_include_uncommitted() {
        let dataset = Dataset::in_memory();
        let other = NamedNode::new("http://imeji.org/collection").unwrap();
        dataset
            .write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/1", "a.png"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        dataset
            .write(|tx| {
                tx.insert(&other, triple("http://example.org/c/1", "c"))?;
                let names: Vec<&str> = tx.graphs().into_iter().map(|(name, _)| name).collect();
                assert_eq!(names, vec![graph().as_str(), other.as_str()]);
                let nodes = tx.graph(&other).map(|g| g.nodes()).unwrap_or_default();
                assert_eq!(nodes.len(), 2);
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_panicked_write_releases_writer() {
        let dataset = Dataset::in_memory();
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = dataset.write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/1", "a.png"))?;
                if tx.pending_changes() > 0 {
                    panic!("write closure failed");
                }
                Ok::<_, StoreError>(())
            });
        }));
        assert!(panicked.is_err());
        assert!(dataset.snapshot().is_empty());

        dataset
            .write(|tx| {
                tx.insert(&graph(), triple("http://example.org/i/2", "b.png"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert_eq!(dataset.snapshot().len(), 1);
    }
}

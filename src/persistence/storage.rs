//! RocksDB storage layer implementation
//!
//! Quads live in the `quads` column family. The key is the bincode encoding of the quad, the
//! value is its big-endian insertion sequence so that replay restores store order.

use crate::rdf::{BlankNode, Literal, NamedNode, Quad, RdfObject, RdfPredicate, RdfSubject, Triple};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

const QUADS_CF: &str = "quads";
const META_CF: &str = "meta";
const NEXT_SEQ_KEY: &[u8] = b"next_seq";

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Column family error
    #[error("Column family error: {0}")]
    ColumnFamily(String),

    /// Stored data could not be turned back into RDF terms
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Storage path is not valid UTF-8
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Serialized RDF term
#[derive(Debug, Clone, Serialize, Deserialize)]
enum StoredTerm {
    Iri(String),
    Blank(String),
    Literal {
        value: String,
        datatype: String,
        language: Option<String>,
    },
}

/// Serialized quad, used as the RocksDB key
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredQuad {
    graph: String,
    subject: StoredTerm,
    predicate: String,
    object: StoredTerm,
}

impl StoredQuad {
    fn from_quad(quad: &Quad) -> Self {
        let subject = match &quad.triple.subject {
            RdfSubject::NamedNode(n) => StoredTerm::Iri(n.as_str().to_string()),
            RdfSubject::BlankNode(b) => StoredTerm::Blank(b.as_str().to_string()),
        };
        let object = match &quad.triple.object {
            RdfObject::NamedNode(n) => StoredTerm::Iri(n.as_str().to_string()),
            RdfObject::BlankNode(b) => StoredTerm::Blank(b.as_str().to_string()),
            RdfObject::Literal(l) => StoredTerm::Literal {
                value: l.value().to_string(),
                datatype: l.datatype().as_str().to_string(),
                language: l.language().map(str::to_string),
            },
        };
        Self {
            graph: quad.graph.as_str().to_string(),
            subject,
            predicate: quad.triple.predicate.as_str().to_string(),
            object,
        }
    }

    fn into_quad(self) -> StorageResult<Quad> {
        let corrupt = |e: crate::rdf::RdfError| StorageError::Corrupt(e.to_string());

        let graph = NamedNode::new(&self.graph).map_err(corrupt)?;
        let subject = match self.subject {
            StoredTerm::Iri(iri) => RdfSubject::NamedNode(NamedNode::new(&iri).map_err(corrupt)?),
            StoredTerm::Blank(id) => RdfSubject::BlankNode(BlankNode::from_id(&id).map_err(corrupt)?),
            StoredTerm::Literal { value, .. } => {
                return Err(StorageError::Corrupt(format!(
                    "literal \"{value}\" in subject position"
                )))
            }
        };
        let predicate = RdfPredicate::new(&self.predicate).map_err(corrupt)?;
        let object = match self.object {
            StoredTerm::Iri(iri) => RdfObject::NamedNode(NamedNode::new(&iri).map_err(corrupt)?),
            StoredTerm::Blank(id) => RdfObject::BlankNode(BlankNode::from_id(&id).map_err(corrupt)?),
            StoredTerm::Literal {
                value,
                datatype,
                language,
            } => {
                let literal = match language {
                    Some(lang) => {
                        Literal::new_language_tagged_literal(value, lang).map_err(corrupt)?
                    }
                    None => {
                        Literal::new_typed_literal(value, NamedNode::new(&datatype).map_err(corrupt)?)
                    }
                };
                RdfObject::Literal(literal)
            }
        };
        Ok(Quad::new(graph, Triple::new(subject, predicate, object)))
    }
}

/// One change of a committed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuadChange {
    /// Quad asserted
    Insert(Quad),
    /// Quad retracted
    Remove(Quad),
}

/// RocksDB-based persistent quad storage
pub struct QuadStorage {
    /// RocksDB instance
    db: Arc<DB>,
    /// Next insertion sequence number
    next_seq: AtomicU64,
    /// Storage path
    path: String,
}

impl QuadStorage {
    /// Open or create a new persistent storage
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or_else(|| StorageError::InvalidPath(path.as_ref().display().to_string()))?
            .to_string();

        info!("Opening quad storage at: {}", path_str);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_wal_recovery_mode(rocksdb::DBRecoveryMode::PointInTime);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(QUADS_CF, Self::quad_cf_options()),
            ColumnFamilyDescriptor::new(META_CF, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, &path_str, cf_descriptors)?;

        let storage = Self {
            db: Arc::new(db),
            next_seq: AtomicU64::new(0),
            path: path_str,
        };
        let next = storage.read_next_seq()?;
        storage.next_seq.store(next, Ordering::SeqCst);

        info!("Quad storage opened (next sequence {})", next);
        Ok(storage)
    }

    /// Column family options for quads
    fn quad_cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    /// Storage path
    pub fn path(&self) -> &str {
        &self.path
    }

    fn cf(&self, name: &str) -> StorageResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamily(name.to_string()))
    }

    fn read_next_seq(&self) -> StorageResult<u64> {
        let meta = self.cf(META_CF)?;
        match self.db.get_cf(meta, NEXT_SEQ_KEY)? {
            Some(bytes) => decode_seq(&bytes),
            None => Ok(0),
        }
    }

    /// Apply the changes of one committed transaction atomically
    pub fn apply(&self, changes: &[QuadChange]) -> StorageResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let quads = self.cf(QUADS_CF)?;
        let meta = self.cf(META_CF)?;
        let mut batch = WriteBatch::default();
        let mut seq = self.next_seq.load(Ordering::SeqCst);

        for change in changes {
            match change {
                QuadChange::Insert(quad) => {
                    let key = bincode::serialize(&StoredQuad::from_quad(quad))?;
                    batch.put_cf(quads, key, seq.to_be_bytes());
                    seq += 1;
                }
                QuadChange::Remove(quad) => {
                    let key = bincode::serialize(&StoredQuad::from_quad(quad))?;
                    batch.delete_cf(quads, key);
                }
            }
        }
        batch.put_cf(meta, NEXT_SEQ_KEY, seq.to_be_bytes());

        self.db.write(batch)?;
        self.next_seq.store(seq, Ordering::SeqCst);

        debug!("Persisted {} quad changes", changes.len());
        Ok(())
    }

    /// Load every stored quad in insertion order
    pub fn load_all(&self) -> StorageResult<Vec<Quad>> {
        let quads = self.cf(QUADS_CF)?;
        let mut entries = Vec::new();

        for item in self.db.iterator_cf(quads, IteratorMode::Start) {
            let (key, value) = item?;
            let seq = decode_seq(&value)?;
            let stored: StoredQuad = bincode::deserialize(&key)?;
            match stored.into_quad() {
                Ok(quad) => entries.push((seq, quad)),
                Err(e) => warn!("Skipping unreadable quad record: {}", e),
            }
        }

        entries.sort_by_key(|(seq, _)| *seq);
        info!("Loaded {} quads from storage", entries.len());
        Ok(entries.into_iter().map(|(_, quad)| quad).collect())
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_seq(bytes: &[u8]) -> StorageResult<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("sequence of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quad(subject: &str, value: &str) -> Quad {
        Quad::new(
            NamedNode::new("http://imeji.org/item").unwrap(),
            Triple::new(
                RdfSubject::iri(subject).unwrap(),
                RdfPredicate::new("http://imeji.org/terms/filename").unwrap(),
                Literal::new_simple_literal(value).into(),
            ),
        )
    }

    #[test]
    fn test_storage_open() {
        let temp_dir = TempDir::new().unwrap();
        let storage = QuadStorage::open(temp_dir.path());
        assert!(storage.is_ok());
        assert!(storage.unwrap().load_all().unwrap().is_empty());
    }

    #[test]
    fn test_apply_and_reload_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let first = quad("http://example.org/i/2", "b.png");
        let second = quad("http://example.org/i/1", "a.png");
        let dropped = quad("http://example.org/i/3", "c.png");

        {
            let storage = QuadStorage::open(temp_dir.path()).unwrap();
            storage
                .apply(&[
                    QuadChange::Insert(first.clone()),
                    QuadChange::Insert(second.clone()),
                    QuadChange::Insert(dropped.clone()),
                ])
                .unwrap();
            storage.apply(&[QuadChange::Remove(dropped)]).unwrap();
            storage.flush().unwrap();
        }

        let storage = QuadStorage::open(temp_dir.path()).unwrap();
        assert_eq!(storage.load_all().unwrap(), vec![first, second]);
    }

    #[test]
    fn test_typed_and_tagged_literals_survive() {
        let temp_dir = TempDir::new().unwrap();
        let graph = NamedNode::new("http://imeji.org/collection").unwrap();
        let subject = RdfSubject::iri("http://example.org/c/1").unwrap();
        let typed = Quad::new(
            graph.clone(),
            Triple::new(
                subject.clone(),
                RdfPredicate::new("http://imeji.org/terms/fileSize").unwrap(),
                Literal::new_typed_literal(
                    "42",
                    NamedNode::new("http://www.w3.org/2001/XMLSchema#long").unwrap(),
                )
                .into(),
            ),
        );
        let tagged = Quad::new(
            graph,
            Triple::new(
                subject,
                RdfPredicate::new("http://purl.org/dc/terms/title").unwrap(),
                Literal::new_language_tagged_literal("Titel", "de").unwrap().into(),
            ),
        );

        let storage = QuadStorage::open(temp_dir.path()).unwrap();
        storage
            .apply(&[
                QuadChange::Insert(typed.clone()),
                QuadChange::Insert(tagged.clone()),
            ])
            .unwrap();
        assert_eq!(storage.load_all().unwrap(), vec![typed, tagged]);
    }
}

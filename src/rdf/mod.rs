//! RDF support: terms, named graphs and the transactional dataset
//!
//! The repository keeps every domain type in its own named graph ("model"). All reads and
//! writes of one request go through a single [`Transaction`] so that object loading and
//! hierarchy resolution observe the same snapshot.
//!
//! # Example
//!
//! ```rust
//! use repograph::rdf::{Dataset, Literal, NamedNode, RdfPredicate, RdfSubject, StoreError, Triple};
//!
//! let dataset = Dataset::in_memory();
//! let model = NamedNode::new("http://imeji.org/item").unwrap();
//! let subject = RdfSubject::iri("http://example.org/item/1").unwrap();
//! let predicate = RdfPredicate::new("http://imeji.org/terms/filename").unwrap();
//!
//! dataset
//!     .write(|tx| {
//!         let triple = Triple::new(subject.clone(), predicate.clone(), Literal::new_simple_literal("a.png").into());
//!         tx.insert(&model, triple)?;
//!         Ok::<_, StoreError>(())
//!     })
//!     .unwrap();
//!
//! let found = dataset.read(|tx| Ok::<_, StoreError>(tx.triples_for_subject(&model, &subject))).unwrap();
//! assert_eq!(found.len(), 1);
//! ```

mod dataset;
mod namespace;
mod store;
mod types;

pub use types::{
    BlankNode, Literal, NamedNode, Quad, RdfError, RdfObject, RdfPredicate, RdfResult, RdfSubject,
    Triple, TriplePattern,
};

pub use store::Graph;

pub use dataset::{Dataset, GraphView, Snapshot, StoreError, StoreResult, Transaction, TxMode};

pub use namespace::{vocab, Namespace, NamespaceManager, PrefixError, PrefixResult};

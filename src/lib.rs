//! Repograph
//!
//! Authorization-aware object/graph mapping for repositories of collections and items stored
//! in an RDF dataset.
//!
//! # Architecture
//!
//! - `rdf`: terms, named graphs and a transactional dataset with snapshot reads
//! - `persistence`: optional RocksDB durability for committed quads
//! - `sparql`: single-variable SELECT execution used for hierarchy lookups
//! - `mapping`: declarative field-to-predicate descriptors and their registry
//! - `model`: the repository's domain types
//! - `db`: graph reader and writer plus the authorization-checking facades
//! - `auth`: grants, hierarchy resolution and the authorization engine
//!
//! ## Example Usage
//!
//! ```rust
//! use repograph::auth::system_user;
//! use repograph::model::{Collection, Item};
//! use repograph::Repository;
//!
//! let repo = Repository::in_memory().unwrap();
//! let admin = Some(system_user());
//!
//! let collection = Collection { title: "Field photos".into(), ..Default::default() };
//! let collection = repo.writer().create_batch(vec![collection], admin).unwrap().remove(0);
//!
//! let item = Item {
//!     collection: collection.id.clone(),
//!     filename: "dune.jpg".into(),
//!     ..Default::default()
//! };
//! let item = repo.writer().create_batch(vec![item], admin).unwrap().remove(0);
//!
//! let uri = item.id.clone().unwrap();
//! let found: Vec<Item> = repo.reader().retrieve_batch(&[uri], admin).unwrap();
//! assert_eq!(found[0].filename, "dune.jpg");
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mapping;
pub mod model;
pub mod persistence;
pub mod rdf;
pub mod sparql;

// Re-export main types for convenience
pub use auth::{
    system_user, Authorization, Grant, HierarchyIndex, HierarchyResolver, Principal, Protected,
    Role, SecurityTarget, TransactionalHierarchy,
};

pub use config::{ConfigError, ConfigResult, RepoConfig};

pub use db::{ElementChange, Reader, ReaderFacade, Repository, Writer, WriterFacade};

pub use error::{RepoError, RepoResult};

pub use mapping::{FieldKind, Mapped, MappingBuilder, MappingError, MappingRegistry, Value};

pub use rdf::{Dataset, NamedNode, StoreError, Transaction};

pub use sparql::{QueryError, QueryOptions};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

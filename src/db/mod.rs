//! Object persistence
//!
//! [`Reader`] and [`Writer`] move mapped objects in and out of the triple store inside a caller's
//! transaction. [`ReaderFacade`] and [`WriterFacade`] add authorization and own the transaction.
//! [`Repository`] wires everything up from a [`RepoConfig`].

mod facade;
mod reader;
mod writer;

pub use facade::{ReaderFacade, WriterFacade};
pub use reader::Reader;
pub use writer::{ElementChange, Writer};

use crate::auth::{Authorization, TransactionalHierarchy};
use crate::config::RepoConfig;
use crate::error::RepoResult;
use crate::mapping::MappingRegistry;
use crate::model::{Collection, Item, User, UserGroup};
use crate::rdf::{Dataset, NamedNode};
use crate::sparql::{self, QueryOptions};
use std::sync::Arc;
use tracing::info;

/// A configured repository
pub struct Repository {
    config: RepoConfig,
    dataset: Dataset,
    registry: Arc<MappingRegistry>,
    authorization: Arc<Authorization>,
    reader: ReaderFacade,
    writer: WriterFacade,
}

impl Repository {
    /// Open the dataset and register every domain type.
    ///
    /// Configuration and mapping declaration errors surface here rather than on first use.
    pub fn open(config: RepoConfig) -> RepoResult<Self> {
        config.validate()?;
        let dataset = match &config.data_path {
            Some(path) => Dataset::open(path)?,
            None => Dataset::in_memory(),
        };

        let registry = Arc::new(MappingRegistry::new(config.base_uri.clone()));
        registry.register::<Item>()?;
        registry.register::<Collection>()?;
        registry.register::<User>()?;
        registry.register::<UserGroup>()?;

        let authorization = Arc::new(Authorization::new(
            TransactionalHierarchy::new(&registry),
            config.base_uri.clone(),
            config.private_mode,
        ));
        let reader = Reader::new(registry.clone());
        let writer = Writer::new(registry.clone());

        info!(
            "Repository opened at {} ({}, {} mapped types)",
            config.base_uri,
            if dataset.is_persistent() { "persistent" } else { "in-memory" },
            registry.len()
        );

        Ok(Self {
            reader: ReaderFacade::new(dataset.clone(), reader.clone(), authorization.clone()),
            writer: WriterFacade::new(dataset.clone(), reader, writer, authorization.clone()),
            config,
            dataset,
            registry,
            authorization,
        })
    }

    /// In-memory repository with default configuration
    pub fn in_memory() -> RepoResult<Self> {
        Self::open(RepoConfig::default())
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    pub fn authorization(&self) -> &Arc<Authorization> {
        &self.authorization
    }

    pub fn reader(&self) -> &ReaderFacade {
        &self.reader
    }

    pub fn writer(&self) -> &WriterFacade {
        &self.writer
    }

    /// Run a single-variable SELECT against the committed state with the configured time limit
    pub fn query(&self, query: &str, named_graph: Option<&NamedNode>) -> RepoResult<Vec<String>> {
        let options = QueryOptions {
            timeout: self.config.query_timeout(),
            ..QueryOptions::default()
        };
        self.dataset
            .read(|tx| sparql::execute(tx, query, named_graph, &options))
            .map_err(Into::into)
    }
}

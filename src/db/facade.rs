//! Authorization-checking facades over the reader and writer
//!
//! Every batch runs in one transaction. The acting user is re-read inside that transaction
//! together with its groups, so grant changes take effect on the next call.

use super::reader::Reader;
use super::writer::{ElementChange, Writer};
use crate::auth::{
    system_user, Authorization, HierarchyResolver, Principal, Protected, TransactionalHierarchy,
};
use crate::error::{RepoError, RepoResult};
use crate::model::{User, UserGroup};
use crate::rdf::{vocab, Dataset, Transaction};
use crate::sparql::{self, QueryOptions};
use std::sync::Arc;
use tracing::{debug, warn};

/// Effective principal of `user` as stored in `tx`
fn resolve_principal(
    reader: &Reader,
    tx: &Transaction,
    user: Option<&User>,
) -> RepoResult<Option<Principal>> {
    let Some(user) = user else {
        return Ok(None);
    };
    if std::ptr::eq(user, system_user()) {
        return Ok(Some(Principal::system()));
    }

    let uri = user.id.as_deref().ok_or(RepoError::AuthenticationRequired)?;
    let stored: User = match reader.read_lazy(tx, uri) {
        Ok(stored) => stored,
        Err(RepoError::NotFound(_)) => {
            debug!("User {} no longer exists", uri);
            return Err(RepoError::AuthenticationRequired);
        }
        Err(e) => return Err(e),
    };

    let group_graph = reader.registry().describe::<UserGroup>().mapping().graph.clone();
    let query = format!("SELECT ?s WHERE {{ ?s <{}> <{}> }}", vocab::FOAF_MEMBER, uri);
    let mut groups = Vec::new();
    for group in sparql::execute(tx, &query, Some(&group_graph), &QueryOptions::default())? {
        match reader.read_lazy::<UserGroup>(tx, &group) {
            Ok(group) => groups.push(group),
            Err(RepoError::NotFound(reason)) => warn!("Skipping group of {}: {}", uri, reason),
            Err(e) => return Err(e),
        }
    }
    Ok(Some(Principal::from_user(&stored, &groups)))
}

fn identifier<T: Protected>(object: &T) -> RepoResult<&str> {
    object
        .uri()
        .ok_or_else(|| RepoError::NotFound("object without identifier".to_string()))
}

/// Reads that never return an object the caller may not see
pub struct ReaderFacade<R = TransactionalHierarchy> {
    dataset: Dataset,
    reader: Reader,
    authorization: Arc<Authorization<R>>,
}

impl<R: HierarchyResolver> ReaderFacade<R> {
    pub fn new(dataset: Dataset, reader: Reader, authorization: Arc<Authorization<R>>) -> Self {
        Self {
            dataset,
            reader,
            authorization,
        }
    }

    /// Read every field of each object, checking READ per object
    pub fn retrieve_batch<T: Protected>(
        &self,
        uris: &[String],
        user: Option<&User>,
    ) -> RepoResult<Vec<T>> {
        self.retrieve(uris, user, false)
    }

    /// Read each object without its lazy fields, checking READ per object
    pub fn retrieve_batch_lazy<T: Protected>(
        &self,
        uris: &[String],
        user: Option<&User>,
    ) -> RepoResult<Vec<T>> {
        self.retrieve(uris, user, true)
    }

    fn retrieve<T: Protected>(
        &self,
        uris: &[String],
        user: Option<&User>,
        lazy: bool,
    ) -> RepoResult<Vec<T>> {
        self.dataset.read(|tx| {
            let principal = resolve_principal(&self.reader, tx, user)?;
            let mut objects = Vec::with_capacity(uris.len());
            for uri in uris {
                let object: T = if lazy {
                    self.reader.read_lazy(tx, uri)?
                } else {
                    self.reader.read(tx, uri)?
                };
                self.authorization
                    .require_read(tx, principal.as_ref(), &object)?;
                objects.push(object);
            }
            Ok::<_, RepoError>(objects)
        })
    }
}

/// Writes that are authorized object by object before anything is mutated
pub struct WriterFacade<R = TransactionalHierarchy> {
    dataset: Dataset,
    reader: Reader,
    writer: Writer,
    authorization: Arc<Authorization<R>>,
}

impl<R: HierarchyResolver> WriterFacade<R> {
    pub fn new(
        dataset: Dataset,
        reader: Reader,
        writer: Writer,
        authorization: Arc<Authorization<R>>,
    ) -> Self {
        Self {
            dataset,
            reader,
            writer,
            authorization,
        }
    }

    fn reread<T: Protected>(&self, tx: &Transaction, objects: &[T]) -> RepoResult<Vec<T>> {
        objects
            .iter()
            .map(|object| self.reader.read(tx, identifier(object)?))
            .collect()
    }

    /// Create objects and return them as stored
    pub fn create_batch<T: Protected>(
        &self,
        mut objects: Vec<T>,
        user: Option<&User>,
    ) -> RepoResult<Vec<T>> {
        self.dataset.write(|tx| {
            let principal = resolve_principal(&self.reader, tx, user)?;
            for object in &objects {
                self.authorization
                    .require_create(tx, principal.as_ref(), object)?;
            }
            self.writer.create(tx, &mut objects)?;
            self.reread(tx, &objects)
        })
    }

    /// Update objects and return them as stored.
    ///
    /// UPDATE is checked on the stored state; moving an object to another parent also needs
    /// the create permission below the new parent.
    pub fn update_batch<T: Protected>(
        &self,
        mut objects: Vec<T>,
        user: Option<&User>,
        merge_lazy: bool,
    ) -> RepoResult<Vec<T>> {
        self.dataset.write(|tx| {
            let principal = resolve_principal(&self.reader, tx, user)?;
            for object in &objects {
                let stored: T = self.reader.read_lazy(tx, identifier(object)?)?;
                self.authorization
                    .require_update(tx, principal.as_ref(), &stored)?;
                if object.parent() != stored.parent() {
                    self.authorization
                        .require_create(tx, principal.as_ref(), object)?;
                }
            }
            self.writer.update(tx, &mut objects, merge_lazy)?;
            self.reread(tx, &objects)
        })
    }

    /// Delete objects. Children are not deleted.
    pub fn delete_batch<T: Protected>(&self, objects: &[T], user: Option<&User>) -> RepoResult<()> {
        self.dataset.write(|tx| {
            let principal = resolve_principal(&self.reader, tx, user)?;
            for object in objects {
                let stored: T = self.reader.read_lazy(tx, identifier(object)?)?;
                self.authorization
                    .require_delete(tx, principal.as_ref(), &stored)?;
            }
            self.writer.delete(tx, objects)
        })
    }

    /// Apply a targeted change to a multi-valued field of the stored `T` at `owner`
    pub fn change_element<T: Protected>(
        &self,
        owner: &str,
        field: &str,
        change: ElementChange,
        user: Option<&User>,
    ) -> RepoResult<Option<String>> {
        self.dataset.write(|tx| {
            let principal = resolve_principal(&self.reader, tx, user)?;
            let stored: T = self.reader.read_lazy(tx, owner)?;
            self.authorization
                .require_update(tx, principal.as_ref(), &stored)?;
            self.writer.change_element::<T>(tx, owner, field, change)
        })
    }
}

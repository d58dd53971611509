//! Authorization
//!
//! [`Authorization`] decides whether a [`Principal`] may act on an object. Grants on an object's
//! own IRI are checked first, then grants on its top-level container as found by a pluggable
//! [`HierarchyResolver`].

mod authorization;
mod grant;
mod hierarchy;

pub use authorization::{system_user, Authorization};
pub use grant::{Grant, GrantError, Principal, Role};
pub use hierarchy::{HierarchyIndex, HierarchyResolver, TransactionalHierarchy};

use crate::error::{RepoError, RepoResult};
use crate::mapping::Mapped;
use crate::model::Status;

/// Position of a type in the containment hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Item,
    Collection,
    /// Not contained in anything
    Other,
}

/// A mapped type whose instances are subject to authorization
pub trait Protected: Mapped {
    const KIND: ResourceKind;

    fn uri(&self) -> Option<&str>;

    /// Containing collection
    fn parent(&self) -> Option<&str> {
        None
    }

    fn status(&self) -> Option<Status> {
        None
    }
}

/// What an authorization decision looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityTarget {
    pub uri: String,
    pub kind: ResourceKind,
    pub parent: Option<String>,
    pub status: Option<Status>,
}

impl SecurityTarget {
    /// Target of a protected object; objects without an identifier are not found
    pub fn of<T: Protected>(object: &T) -> RepoResult<Self> {
        let uri = object
            .uri()
            .ok_or_else(|| RepoError::NotFound("object without identifier".to_string()))?;
        Ok(Self {
            uri: uri.to_string(),
            kind: T::KIND,
            parent: object.parent().map(str::to_string),
            status: object.status(),
        })
    }

    /// A stored collection known only by IRI
    pub fn collection(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: ResourceKind::Collection,
            parent: None,
            status: None,
        }
    }

    fn is_public(&self) -> bool {
        self.status.map(Status::is_public).unwrap_or(false)
    }
}

use super::grant::{Principal, Role};
use super::hierarchy::{HierarchyResolver, TransactionalHierarchy};
use super::{Protected, ResourceKind, SecurityTarget};
use crate::error::{RepoError, RepoResult};
use crate::model::User;
use crate::rdf::Transaction;
use std::sync::OnceLock;
use tracing::debug;

/// Unrestricted user for internal operations. Facades recognise it by address, never by
/// content, so it cannot be impersonated with a stored user.
pub fn system_user() -> &'static User {
    static SYSTEM: OnceLock<User> = OnceLock::new();
    SYSTEM.get_or_init(|| User {
        name: "system".to_string(),
        ..Default::default()
    })
}

/// Authorization engine
#[derive(Debug, Clone)]
pub struct Authorization<R = TransactionalHierarchy> {
    resolver: R,
    global_uri: String,
    private_mode: bool,
}

impl<R: HierarchyResolver> Authorization<R> {
    /// `global_uri` is the repository base IRI; grants on it are repository-wide roles
    pub fn new(resolver: R, global_uri: impl Into<String>, private_mode: bool) -> Self {
        Self {
            resolver,
            global_uri: global_uri.into(),
            private_mode,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn global_uri(&self) -> &str {
        &self.global_uri
    }

    /// System user or ADMIN on the global IRI
    pub fn is_sysadmin(&self, principal: &Principal) -> bool {
        principal.is_system() || principal.has(&self.global_uri, Role::Admin, &self.global_uri)
    }

    /// Whether `principal` holds `role` on `target`
    pub fn check(
        &self,
        tx: &Transaction,
        principal: Option<&Principal>,
        target: &SecurityTarget,
        role: Role,
    ) -> RepoResult<bool> {
        if principal.is_some_and(|p| self.is_sysadmin(p)) {
            return Ok(true);
        }
        if role == Role::Read && target.is_public() && !(self.private_mode && principal.is_none()) {
            return Ok(true);
        }
        let Some(principal) = principal else {
            return Ok(false);
        };
        if principal.has(&target.uri, role, &self.global_uri) {
            return Ok(true);
        }

        let top = self.resolver.top_level_parent(tx, target)?;
        let allowed = top != target.uri && principal.has(&top, role, &self.global_uri);
        debug!(
            "{} {} on {} via {}: {}",
            principal.uri().unwrap_or("anonymous"),
            role,
            target.uri,
            top,
            allowed
        );
        Ok(allowed)
    }

    /// Like [`Authorization::check`], failing with `AuthenticationRequired` or `NotAllowed`
    pub fn require(
        &self,
        tx: &Transaction,
        principal: Option<&Principal>,
        target: &SecurityTarget,
        role: Role,
    ) -> RepoResult<()> {
        if self.check(tx, principal, target, role)? {
            return Ok(());
        }
        Err(denied(principal, role, &target.uri))
    }

    /// Create rules: items and sub-collections need UPDATE on their parent, top-level
    /// collections an UPDATE grant on the global IRI, everything else a system administrator
    pub fn can_create<T: Protected>(
        &self,
        tx: &Transaction,
        principal: Option<&Principal>,
        object: &T,
    ) -> RepoResult<bool> {
        let Some(principal) = principal else {
            return Ok(false);
        };
        if self.is_sysadmin(principal) {
            return Ok(true);
        }
        match (T::KIND, object.parent()) {
            (ResourceKind::Item | ResourceKind::Collection, Some(parent)) => self.check(
                tx,
                Some(principal),
                &SecurityTarget::collection(parent),
                Role::Update,
            ),
            (ResourceKind::Collection, None) => {
                Ok(principal.has(&self.global_uri, Role::Update, &self.global_uri))
            }
            _ => Ok(false),
        }
    }

    pub fn require_create<T: Protected>(
        &self,
        tx: &Transaction,
        principal: Option<&Principal>,
        object: &T,
    ) -> RepoResult<()> {
        if self.can_create(tx, principal, object)? {
            return Ok(());
        }
        let target = object
            .parent()
            .or(object.uri())
            .unwrap_or(self.global_uri.as_str());
        Err(denied(principal, Role::Update, target))
    }

    pub fn require_read<T: Protected>(
        &self,
        tx: &Transaction,
        principal: Option<&Principal>,
        object: &T,
    ) -> RepoResult<()> {
        self.require(tx, principal, &SecurityTarget::of(object)?, Role::Read)
    }

    pub fn require_update<T: Protected>(
        &self,
        tx: &Transaction,
        principal: Option<&Principal>,
        object: &T,
    ) -> RepoResult<()> {
        self.require(tx, principal, &SecurityTarget::of(object)?, Role::Update)
    }

    pub fn require_delete<T: Protected>(
        &self,
        tx: &Transaction,
        principal: Option<&Principal>,
        object: &T,
    ) -> RepoResult<()> {
        self.require(tx, principal, &SecurityTarget::of(object)?, Role::Delete)
    }
}

fn denied(principal: Option<&Principal>, role: Role, uri: &str) -> RepoError {
    match principal {
        None => RepoError::AuthenticationRequired,
        Some(p) => RepoError::NotAllowed(format!(
            "{} lacks {} on {}",
            p.uri().unwrap_or("user"),
            role,
            uri
        )),
    }
}

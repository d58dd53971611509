//! Grants and principals
//!
//! Grants are stored on users and groups as `"ROLE,target"` strings. A grant covers the target
//! IRI and everything below it on a path-segment boundary.

use crate::model::{User, UserGroup};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Grant parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error("Malformed grant: {0}")]
    Malformed(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

/// Role, ordered so that a higher role implies the lower ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Read,
    Update,
    Delete,
    Admin,
}

impl FromStr for Role {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(Role::Read),
            // legacy name
            "UPDATE" | "EDIT" => Ok(Role::Update),
            "DELETE" => Ok(Role::Delete),
            "ADMIN" => Ok(Role::Admin),
            other => Err(GrantError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Read => "READ",
            Role::Update => "UPDATE",
            Role::Delete => "DELETE",
            Role::Admin => "ADMIN",
        };
        f.write_str(name)
    }
}

/// Permission on an object-IRI prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grant {
    pub role: Role,
    pub target: String,
}

impl Grant {
    pub fn new(role: Role, target: impl Into<String>) -> Self {
        Self {
            role,
            target: target.into(),
        }
    }

    /// Whether the grant gives `role` on `uri`.
    ///
    /// A grant on `global_uri` only covers `global_uri` itself.
    pub fn covers(&self, uri: &str, role: Role, global_uri: &str) -> bool {
        if self.role < role {
            return false;
        }
        if self.target == global_uri {
            return uri == global_uri;
        }
        match uri.strip_prefix(self.target.as_str()) {
            Some("") => true,
            Some(rest) => self.target.ends_with('/') || rest.starts_with('/'),
            None => false,
        }
    }
}

impl FromStr for Grant {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (role, target) = s
            .split_once(',')
            .ok_or_else(|| GrantError::Malformed(s.to_string()))?;
        let target = target.trim();
        if target.is_empty() {
            return Err(GrantError::Malformed(s.to_string()));
        }
        Ok(Grant::new(role.parse()?, target))
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.role, self.target)
    }
}

/// The acting party of one request with its effective grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    uri: Option<String>,
    grants: Vec<Grant>,
    system: bool,
}

impl Principal {
    /// Unrestricted principal for internal operations
    pub fn system() -> Self {
        Self {
            uri: None,
            grants: Vec::new(),
            system: true,
        }
    }

    /// User grants merged with the grants of its groups. Unparseable grants are skipped.
    pub fn from_user(user: &User, groups: &[UserGroup]) -> Self {
        let grants = user
            .grants
            .iter()
            .chain(groups.iter().flat_map(|g| g.grants.iter()))
            .filter_map(|s| match s.parse::<Grant>() {
                Ok(grant) => Some(grant),
                Err(e) => {
                    warn!("Ignoring grant of {:?}: {}", user.id, e);
                    None
                }
            })
            .collect();
        Self {
            uri: user.id.clone(),
            grants,
            system: false,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Whether any grant gives `role` on `uri`
    pub fn has(&self, uri: &str, role: Role, global_uri: &str) -> bool {
        self.grants.iter().any(|g| g.covers(uri, role, global_uri))
    }
}

use crate::auth::{Protected, ResourceKind};
use crate::mapping::{Mapped, MappingBuilder};
use crate::rdf::vocab;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered account
///
/// Grants are stored as `"ROLE,target"` strings and parsed when a principal is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    /// Distinct `ROLE,uri` grants; a repeated grant is stored once
    pub grants: Vec<String>,
    pub created: Option<DateTime<Utc>>,
}

impl Mapped for User {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::IMEJI, "user", "user")
            .identity(|u| &u.id, |u| &mut u.id)
            .literal("email", "foaf:email", |u| &u.email, |u| &mut u.email)
            .literal("name", "foaf:name", |u| &u.name, |u| &mut u.name)
            .literal("grants", "grant", |u| &u.grants, |u| &mut u.grants)
            .literal("created", "dcterms:created", |u| &u.created, |u| &mut u.created)
    }
}

impl Protected for User {
    const KIND: ResourceKind = ResourceKind::Other;

    fn uri(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Named set of users sharing grants
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: Option<String>,
    pub name: String,
    /// Distinct `ROLE,uri` grants; a repeated grant is stored once
    pub grants: Vec<String>,
    /// Member user IRIs
    pub users: Vec<String>,
    pub modified: Option<DateTime<Utc>>,
}

impl Mapped for UserGroup {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::IMEJI, "userGroup", "userGroup")
            .identity(|g| &g.id, |g| &mut g.id)
            .literal("name", "foaf:name", |g| &g.name, |g| &mut g.name)
            .literal("grants", "grant", |g| &g.grants, |g| &mut g.grants)
            .iri("users", vocab::FOAF_MEMBER, |g| &g.users, |g| &mut g.users)
            .literal("modified", "dcterms:modified", |g| &g.modified, |g| &mut g.modified)
    }
}

impl Protected for UserGroup {
    const KIND: ResourceKind = ResourceKind::Other;

    fn uri(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

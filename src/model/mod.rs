//! Domain types of the repository
//!
//! Every type declares its graph representation through [`Mapped`]. Items and collections carry
//! an embedded [`Properties`] block with provenance and publication [`Status`].

mod collection;
mod item;
mod user;

pub use collection::{Collection, LinkedCollection, Organization, Person};
pub use item::{Item, License, Metadata};
pub use user::{User, UserGroup};

use crate::mapping::{FieldValue, Mapped, MappingBuilder, Value};
use crate::rdf::vocab;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publication status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Visible to grant holders only
    #[default]
    Pending,
    /// Public
    Released,
    /// Public, but no longer maintained
    Withdrawn,
}

const STATUS_NAMESPACE: &str = "http://imeji.org/status/";

impl Status {
    /// Status resource IRI, e.g. `http://imeji.org/status/RELEASED`
    pub fn iri(self) -> String {
        let name = match self {
            Status::Pending => "PENDING",
            Status::Released => "RELEASED",
            Status::Withdrawn => "WITHDRAWN",
        };
        format!("{}{}", STATUS_NAMESPACE, name)
    }

    /// Parse a status IRI or bare status name
    pub fn parse(s: &str) -> Option<Self> {
        let name = s.strip_prefix(STATUS_NAMESPACE).unwrap_or(s);
        match name.to_ascii_uppercase().as_str() {
            "PENDING" => Some(Status::Pending),
            "RELEASED" => Some(Status::Released),
            "WITHDRAWN" => Some(Status::Withdrawn),
            _ => None,
        }
    }

    /// Released and withdrawn objects are readable by everyone
    pub fn is_public(self) -> bool {
        matches!(self, Status::Released | Status::Withdrawn)
    }
}

impl FieldValue for Status {
    fn to_values(&self) -> Vec<Value> {
        vec![Value::Iri(self.iri())]
    }

    fn from_values(values: Vec<Value>) -> Self {
        values
            .into_iter()
            .find_map(|v| match v {
                Value::Iri(s) | Value::String(s) => Status::parse(&s),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// Provenance block embedded in items and collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub status: Status,
}

impl Mapped for Properties {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::IMEJI, "imeji:properties", "properties")
            .iri("created_by", "createdBy", |p| &p.created_by, |p| &mut p.created_by)
            .iri("modified_by", "modifiedBy", |p| &p.modified_by, |p| &mut p.modified_by)
            .literal("created", "dcterms:created", |p| &p.created, |p| &mut p.created)
            .literal("modified", "dcterms:modified", |p| &p.modified, |p| &mut p.modified)
            .literal("status", "status", |p| &p.status, |p| &mut p.status)
    }
}

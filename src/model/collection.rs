use super::{Properties, Status};
use crate::auth::{Protected, ResourceKind};
use crate::mapping::{Mapped, MappingBuilder};
use crate::rdf::vocab;
use serde::{Deserialize, Serialize};

const ESCIDOC_TERMS: &str = "http://purl.org/escidoc/metadata/terms/0.1/";

/// Container of items and sub-collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Option<String>,
    /// Parent collection IRI, absent for top-level collections
    pub collection: Option<String>,
    pub title: String,
    pub description: String,
    pub doi: Option<String>,
    pub logo_url: Option<String>,
    /// Distinct type labels; repeated labels are stored once
    pub types: Vec<String>,
    pub properties: Properties,
    pub persons: Vec<Person>,
    pub linked_collections: Vec<LinkedCollection>,
}

impl Mapped for Collection {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::IMEJI, "collection", "collection")
            .identity(|c| &c.id, |c| &mut c.id)
            .iri("collection", "collection", |c| &c.collection, |c| &mut c.collection)
            .literal("title", "dc:title", |c| &c.title, |c| &mut c.title)
            .literal("description", "dc:description", |c| &c.description, |c| &mut c.description)
            .literal("doi", "doi", |c| &c.doi, |c| &mut c.doi)
            .iri("logo_url", "logoUrl", |c| &c.logo_url, |c| &mut c.logo_url)
            .literal("types", "dcterms:type", |c| &c.types, |c| &mut c.types)
            .embedded("properties", |c| &c.properties, |c| &mut c.properties)
            .objects("persons", "foaf:person", |c| &c.persons, |c| &mut c.persons)
            .objects(
                "linked_collections",
                "http://imeji.org/linkedCollection",
                |c| &c.linked_collections,
                |c| &mut c.linked_collections,
            )
    }
}

impl Protected for Collection {
    const KIND: ResourceKind = ResourceKind::Collection;

    fn uri(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn parent(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    fn status(&self) -> Option<Status> {
        Some(self.properties.status)
    }
}

/// Author or contributor of a collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Option<String>,
    pub family_name: String,
    pub given_name: String,
    pub identifier: String,
    pub position: i64,
    pub organizations: Vec<Organization>,
}

impl Mapped for Person {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::FOAF, "foaf:person", "person")
            .identity(|p| &p.id, |p| &mut p.id)
            .literal(
                "family_name",
                "http://purl.org/escidoc/metadata/terms/0.1/family-name",
                |p| &p.family_name,
                |p| &mut p.family_name,
            )
            .literal(
                "given_name",
                "http://purl.org/escidoc/metadata/terms/0.1/given-name",
                |p| &p.given_name,
                |p| &mut p.given_name,
            )
            .literal("identifier", "dc:identifier", |p| &p.identifier, |p| &mut p.identifier)
            .literal("position", "imeji:position", |p| &p.position, |p| &mut p.position)
            .objects(
                "organizations",
                "http://purl.org/escidoc/metadata/profiles/0.1/organizationalunit",
                |p| &p.organizations,
                |p| &mut p.organizations,
            )
    }
}

/// Affiliation of a person
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Option<String>,
    pub name: String,
    pub identifier: String,
    pub city: String,
    pub country: String,
}

impl Mapped for Organization {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(
            ESCIDOC_TERMS,
            "http://purl.org/escidoc/metadata/profiles/0.1/organizationalunit",
            "organization",
        )
        .identity(|o| &o.id, |o| &mut o.id)
        .literal("name", "dc:title", |o| &o.name, |o| &mut o.name)
        .literal("identifier", "dc:identifier", |o| &o.identifier, |o| &mut o.identifier)
        .literal("city", "city", |o| &o.city, |o| &mut o.city)
        .literal("country", "country", |o| &o.country, |o| &mut o.country)
    }
}

/// Link from a collection to another internal or external collection.
///
/// `internal_collection_name` is never stored; it is read from the title of the linked
/// internal collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkedCollection {
    pub id: Option<String>,
    pub link_type: String,
    pub description: String,
    pub internal_collection_uri: Option<String>,
    pub internal_collection_name: String,
    pub external_collection_uri: Option<String>,
    pub external_collection_name: String,
}

impl Mapped for LinkedCollection {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::IMEJI, "http://imeji.org/linkedCollection", "collection")
            .identity(|l| &l.id, |l| &mut l.id)
            .literal("link_type", "dcterms:type", |l| &l.link_type, |l| &mut l.link_type)
            .literal("description", "dc:description", |l| &l.description, |l| &mut l.description)
            .iri(
                "internal_collection_uri",
                "uri",
                |l| &l.internal_collection_uri,
                |l| &mut l.internal_collection_uri,
            )
            .referenced::<Collection, _, _>(
                "internal_collection_name",
                "internal_collection_uri",
                "title",
                |l| &mut l.internal_collection_name,
            )
            .literal(
                "external_collection_uri",
                "url",
                |l| &l.external_collection_uri,
                |l| &mut l.external_collection_uri,
            )
            .literal(
                "external_collection_name",
                "dc:title",
                |l| &l.external_collection_name,
                |l| &mut l.external_collection_name,
            )
    }
}

use super::{Properties, Status};
use crate::auth::{Protected, ResourceKind};
use crate::mapping::{Mapped, MappingBuilder};
use crate::rdf::vocab;
use serde::{Deserialize, Serialize};

/// A file in a collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Option<String>,
    /// Parent collection IRI
    pub collection: Option<String>,
    pub filename: String,
    pub filetype: String,
    pub file_size: i64,
    pub properties: Properties,
    pub licenses: Vec<License>,
    pub metadata: Vec<Metadata>,
}

impl Mapped for Item {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::IMEJI, "item", "item")
            .identity(|i| &i.id, |i| &mut i.id)
            .iri("collection", "collection", |i| &i.collection, |i| &mut i.collection)
            .literal("filename", "filename", |i| &i.filename, |i| &mut i.filename)
            .literal("filetype", "filetype", |i| &i.filetype, |i| &mut i.filetype)
            .literal("file_size", "fileSize", |i| &i.file_size, |i| &mut i.file_size)
            .embedded("properties", |i| &i.properties, |i| &mut i.properties)
            .lazy_objects("licenses", "license", |i| &i.licenses, |i| &mut i.licenses)
            .lazy_objects("metadata", "metadata", |i| &i.metadata, |i| &mut i.metadata)
    }
}

impl Protected for Item {
    const KIND: ResourceKind = ResourceKind::Item;

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

/// License attached to an item. `start` and `end` are epoch millis, -1 when open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    pub start: i64,
    pub end: i64,
}

impl Default for License {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            url: String::new(),
            start: -1,
            end: -1,
        }
    }
}

impl Mapped for License {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::IMEJI, "license", "license")
            .identity(|l| &l.id, |l| &mut l.id)
            .literal("name", "name", |l| &l.name, |l| &mut l.name)
            .literal("url", "url", |l| &l.url, |l| &mut l.url)
            .literal("start", "start", |l| &l.start, |l| &mut l.start)
            .literal("end", "end", |l| &l.end, |l| &mut l.end)
    }
}

/// One metadata value of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: Option<String>,
    /// Statement (metadata field definition) IRI
    pub statement: Option<String>,
    pub text: String,
    pub number: f64,
    pub url: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub position: i64,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            id: None,
            statement: None,
            text: String::new(),
            number: f64::NAN,
            url: None,
            latitude: f64::NAN,
            longitude: f64::NAN,
            position: 0,
        }
    }
}

impl Mapped for Metadata {
    fn mapping() -> MappingBuilder<Self> {
        MappingBuilder::<Self>::new(vocab::IMEJI, "metadata", "metadata")
            .identity(|m| &m.id, |m| &mut m.id)
            .iri("statement", "statement", |m| &m.statement, |m| &mut m.statement)
            .literal("text", "text", |m| &m.text, |m| &mut m.text)
            .literal("number", "number", |m| &m.number, |m| &mut m.number)
            .literal("url", "url", |m| &m.url, |m| &mut m.url)
            .literal("latitude", "latitude", |m| &m.latitude, |m| &mut m.latitude)
            .literal("longitude", "longitude", |m| &m.longitude, |m| &mut m.longitude)
            .literal("position", "pos", |m| &m.position, |m| &mut m.position)
    }
}

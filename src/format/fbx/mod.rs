//! Binary FBX import and export.

pub use self::{exporter::FbxExporter, importer::FbxImporter};

use self::internal::{Document, Property, Record};

mod exporter;
#[cfg(test)]
pub(crate) mod fixture;
mod importer;
pub mod internal;

/// A `C` record of the `Connections` section. Object ids are 0 for the scene root.
#[derive(Debug, Clone, PartialEq)]
struct Connection {
    /// The child object (the one being connected).
    source: i64,
    /// The parent object (the one receiving the connection).
    destination: i64,
    /// The property of the destination, for object-to-property connections.
    property: Option<String>,
}

impl Connection {
    /// Parses object-to-object (`OO`) and object-to-property (`OP`) connections. Other kinds
    /// return `None` and are carried through untouched.
    fn parse(record: &Record) -> Option<Self> {
        if record.name != "C" {
            return None;
        }

        match record.properties.as_slice() {
            [Property::String(kind), source, destination] if kind == "OO" => Some(Self {
                source: source.as_i64()?,
                destination: destination.as_i64()?,
                property: None,
            }),
            [Property::String(kind), source, destination, Property::String(property), ..]
                if kind == "OP" =>
            {
                Some(Self {
                    source: source.as_i64()?,
                    destination: destination.as_i64()?,
                    property: Some(property.clone()),
                })
            }
            _ => None,
        }
    }

    fn to_record(&self) -> Record {
        let mut properties = vec![
            Property::string(if self.property.is_some() { "OP" } else { "OO" }),
            Property::I64(self.source),
            Property::I64(self.destination),
        ];
        if let Some(property) = &self.property {
            properties.push(Property::string(property));
        }

        Record::new("C", properties, Vec::new())
    }
}

fn connections(document: &Document) -> impl Iterator<Item = Connection> + '_ {
    document
        .find("Connections")
        .into_iter()
        .flat_map(|connections| &connections.children)
        .filter_map(Connection::parse)
}

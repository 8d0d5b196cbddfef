//! Operation outputs.

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use unified_core::Result;
use unified_driver::ChangeStreamHandle;

use crate::entity::Entity;

/// The successful result of one operation.
#[derive(Clone)]
pub enum Output {
    /// No result value
    Unit,
    /// A single value, e.g. a serialized write result
    Value(Bson),
    /// Count
    Count(i64),
    /// Documents returned by a cursor
    Documents(Vec<Document>),
    /// A document that may not exist
    Optional(Option<Document>),
    /// Names, e.g. of collections or indexes
    Names(Vec<String>),
    /// Plain values, e.g. from `distinct`
    Values(Vec<Bson>),
    /// An open change stream
    ChangeStream(Arc<dyn ChangeStreamHandle>),
}

impl Output {
    /// Serialize a driver result structure.
    pub fn serialize<T: serde::Serialize>(value: &T) -> Result<Self> {
        Ok(Output::Value(bson::to_bson(value)?))
    }

    /// The value `expectResult` is matched against, if there is one.
    pub fn to_bson(&self) -> Option<Bson> {
        match self {
            Output::Unit | Output::ChangeStream(_) => None,
            Output::Value(value) => Some(value.clone()),
            Output::Count(n) => Some(Bson::Int64(*n)),
            Output::Documents(docs) => Some(Bson::Array(docs.iter().cloned().map(Bson::Document).collect())),
            Output::Optional(doc) => Some(doc.clone().map_or(Bson::Null, Bson::Document)),
            Output::Names(names) => Some(Bson::Array(names.iter().cloned().map(Bson::String).collect())),
            Output::Values(values) => Some(Bson::Array(values.clone())),
        }
    }

    /// The entity `saveResultAsEntity` stores, if the output can be one.
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Output::ChangeStream(stream) => Some(Entity::ChangeStream(stream)),
            other => other.to_bson().map(Entity::Value),
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Unit => f.write_str("Unit"),
            Output::ChangeStream(_) => f.write_str("ChangeStream"),
            other => match other.to_bson() {
                Some(value) => write!(f, "{}", value),
                None => f.write_str("Unit"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn missing_document_is_null() {
        assert_eq!(Output::Optional(None).to_bson(), Some(Bson::Null));
        assert_eq!(
            Output::Optional(Some(doc! { "x": 1 })).to_bson(),
            Some(Bson::Document(doc! { "x": 1 }))
        );
    }

    #[test]
    fn unit_has_no_value_and_cannot_be_saved() {
        assert_eq!(Output::Unit.to_bson(), None);
        assert!(Output::Unit.into_entity().is_none());
        assert!(matches!(Output::Count(3).into_entity(), Some(Entity::Value(Bson::Int64(3)))));
    }
}

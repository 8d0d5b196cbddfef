//! Write models for bulk writes and update modifications.

use bson::Document;
use serde::Deserialize;

use crate::options::{DeleteModelOptions, ReplaceModelOptions, UpdateModelOptions};

/// An update: either an operator document or an aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UpdateModification {
    Document(Document),
    Pipeline(Vec<Document>),
}

/// One request of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Document,
    },
    DeleteOne {
        filter: Document,
        options: DeleteModelOptions,
    },
    DeleteMany {
        filter: Document,
        options: DeleteModelOptions,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        options: ReplaceModelOptions,
    },
    UpdateOne {
        filter: Document,
        update: UpdateModification,
        options: UpdateModelOptions,
    },
    UpdateMany {
        filter: Document,
        update: UpdateModification,
        options: UpdateModelOptions,
    },
}

impl WriteModel {
    /// Name of the model as written in test files.
    pub fn name(&self) -> &'static str {
        match self {
            WriteModel::InsertOne { .. } => "insertOne",
            WriteModel::DeleteOne { .. } => "deleteOne",
            WriteModel::DeleteMany { .. } => "deleteMany",
            WriteModel::ReplaceOne { .. } => "replaceOne",
            WriteModel::UpdateOne { .. } => "updateOne",
            WriteModel::UpdateMany { .. } => "updateMany",
        }
    }

    /// Server command that carries this model.
    pub fn command_name(&self) -> &'static str {
        match self {
            WriteModel::InsertOne { .. } => "insert",
            WriteModel::DeleteOne { .. } | WriteModel::DeleteMany { .. } => "delete",
            WriteModel::ReplaceOne { .. }
            | WriteModel::UpdateOne { .. }
            | WriteModel::UpdateMany { .. } => "update",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn update_modification_accepts_both_forms() {
        let d: UpdateModification = bson::from_bson(bson::Bson::Document(doc! { "$set": { "x": 1 } })).unwrap();
        assert!(matches!(d, UpdateModification::Document(_)));

        let p: UpdateModification =
            bson::from_bson(bson::Bson::Array(vec![doc! { "$set": { "x": 1 } }.into()])).unwrap();
        assert!(matches!(p, UpdateModification::Pipeline(ref stages) if stages.len() == 1));
    }

    #[test]
    fn replace_and_update_share_a_command() {
        let replace = WriteModel::ReplaceOne {
            filter: doc! {},
            replacement: doc! {},
            options: Default::default(),
        };
        assert_eq!(replace.name(), "replaceOne");
        assert_eq!(replace.command_name(), "update");
    }
}

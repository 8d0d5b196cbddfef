//! Decoding of `bulkWrite` requests.
//!
//! A request comes in one of two shapes:
//!
//! ```text
//! { "name": "insertOne", "arguments": { "document": { "x": 1 } } }   // legacy
//! { "insertOne": { "document": { "x": 1 } } }                        // unified
//! ```
//!
//! Both decode to the same [`WriteModel`]. In the unified shape the model
//! keys are tried in [`TRIAL_ORDER`]; the first whose value is a document
//! commits. Requests naming zero or several models are rejected outright.

use bson::{Bson, Document};
use unified_core::{Error, Result};
use unified_driver::{DeleteModelOptions, KnownFields, ReplaceModelOptions, UpdateModelOptions, WriteModel};

use super::arguments::Arguments;

/// Order in which the unified shape's model keys are tried.
pub const TRIAL_ORDER: [&str; 6] = [
    "insertOne",
    "deleteOne",
    "deleteMany",
    "replaceOne",
    "updateOne",
    "updateMany",
];

/// A shape that does not apply to the request; try the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continue;

/// Try the unified shape `{ <model>: { ... } }` for one model name.
pub fn try_shape<'a>(request: &'a Document, model: &str) -> std::result::Result<&'a Document, Continue> {
    match request.get(model) {
        Some(Bson::Document(arguments)) => Ok(arguments),
        _ => Err(Continue),
    }
}

const NO_KEYS: &[&str] = &[];
const INSERT_KEYS: &[&str] = &["document"];
const DELETE_KEYS: &[&str] = &["filter"];
const REPLACE_KEYS: &[&str] = &["filter", "replacement"];
const UPDATE_KEYS: &[&str] = &["filter", "update"];

/// Declared sub-keys and option fields of a write model.
fn known_keys(model: &str) -> Option<(&'static [&'static str], &'static [&'static str])> {
    match model {
        "insertOne" => Some((INSERT_KEYS, NO_KEYS)),
        "deleteOne" | "deleteMany" => Some((DELETE_KEYS, DeleteModelOptions::FIELDS)),
        "replaceOne" => Some((REPLACE_KEYS, ReplaceModelOptions::FIELDS)),
        "updateOne" | "updateMany" => Some((UPDATE_KEYS, UpdateModelOptions::FIELDS)),
        _ => None,
    }
}

/// Decode one entry of `bulkWrite.requests`.
pub fn decode_request(request: &Document) -> Result<WriteModel> {
    if request.contains_key("name") || request.contains_key("arguments") {
        decode_legacy(request)
    } else {
        decode_unified(request)
    }
}

fn decode_legacy(request: &Document) -> Result<WriteModel> {
    if let Some(key) = request.keys().find(|k| *k != "name" && *k != "arguments") {
        return Err(Error::UnsupportedArgument {
            operation: "bulkWrite".to_string(),
            key: key.clone(),
        });
    }
    let name = request.get_str("name").map_err(|_| Error::InvalidArguments {
        operation: "bulkWrite".to_string(),
        reason: "legacy request requires a string 'name'".to_string(),
    })?;
    if known_keys(name).is_none() {
        return Err(Error::UnknownWriteModel {
            name: name.to_string(),
        });
    }
    let empty = Document::new();
    let arguments = match request.get("arguments") {
        Some(Bson::Document(arguments)) => arguments,
        None => &empty,
        Some(_) => {
            return Err(Error::InvalidArguments {
                operation: name.to_string(),
                reason: "'arguments' must be a document".to_string(),
            })
        }
    };
    decode_model(name, arguments)
}

fn decode_unified(request: &Document) -> Result<WriteModel> {
    let present: Vec<String> = TRIAL_ORDER
        .iter()
        .filter(|model| request.contains_key(**model))
        .map(|model| model.to_string())
        .collect();
    match present.len() {
        0 => return Err(Error::NoWriteModelMatched),
        1 => {}
        _ => return Err(Error::AmbiguousWriteModel { keys: present }),
    }
    if let Some(key) = request.keys().find(|k| !TRIAL_ORDER.contains(&k.as_str())) {
        return Err(Error::UnsupportedArgument {
            operation: "bulkWrite".to_string(),
            key: key.clone(),
        });
    }
    for model in TRIAL_ORDER {
        match try_shape(request, model) {
            Ok(arguments) => return decode_model(model, arguments),
            Err(Continue) => continue,
        }
    }
    Err(Error::NoWriteModelMatched)
}

/// Closed-world check plus typed decode of one model's arguments.
fn decode_model(model: &str, raw: &Document) -> Result<WriteModel> {
    let (declared, options) = known_keys(model).ok_or_else(|| Error::UnknownWriteModel {
        name: model.to_string(),
    })?;
    if let Some(key) = raw
        .keys()
        .find(|k| !declared.contains(&k.as_str()) && !options.contains(&k.as_str()))
    {
        return Err(Error::UnsupportedArgument {
            operation: model.to_string(),
            key: key.clone(),
        });
    }

    let args = Arguments::new(model, raw);
    let decoded = match model {
        "insertOne" => WriteModel::InsertOne {
            document: args.required("document")?,
        },
        "deleteOne" => WriteModel::DeleteOne {
            filter: args.required("filter")?,
            options: args.options()?,
        },
        "deleteMany" => WriteModel::DeleteMany {
            filter: args.required("filter")?,
            options: args.options()?,
        },
        "replaceOne" => WriteModel::ReplaceOne {
            filter: args.required("filter")?,
            replacement: args.required("replacement")?,
            options: args.options()?,
        },
        "updateOne" => WriteModel::UpdateOne {
            filter: args.required("filter")?,
            update: args.required("update")?,
            options: args.options()?,
        },
        _ => WriteModel::UpdateMany {
            filter: args.required("filter")?,
            update: args.required("update")?,
            options: args.options()?,
        },
    };
    Ok(decoded)
}

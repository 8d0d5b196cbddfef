//! Results of write operations.
//!
//! These serialize to the camelCase shapes that `expectResult` documents
//! describe, with counts as 64-bit integers.

use bson::{Bson, Document};
use serde::Serialize;

/// Result of `insertOne`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
    pub inserted_id: Bson,
}

/// Result of `insertMany`. `inserted_ids` maps the request index (as a
/// string key) to the inserted `_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertManyResult {
    pub inserted_ids: Document,
}

/// Result of `updateOne`, `updateMany` and `replaceOne`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: i64,
    pub modified_count: i64,
    pub upserted_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Bson>,
}

/// Result of `deleteOne` and `deleteMany`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: i64,
}

/// Result of `bulkWrite`. Id maps are keyed by request index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteResult {
    pub inserted_count: i64,
    pub matched_count: i64,
    pub modified_count: i64,
    pub deleted_count: i64,
    pub upserted_count: i64,
    pub inserted_ids: Document,
    pub upserted_ids: Document,
}

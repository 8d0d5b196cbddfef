//! Collection operation handlers.

use bson::Document;
use unified_core::EntityKind;
use unified_driver::*;

use super::{finish, unsupported, Outcome};
use crate::entity::EntityMap;
use crate::operation::Operation;
use crate::output::Output;

/// Run an operation against a collection entity.
pub fn execute(coll: &dyn CollectionHandle, entities: &EntityMap, op: Operation) -> Outcome {
    match op {
        Operation::Aggregate {
            pipeline,
            session,
            options,
        } => aggregate(coll, entities, pipeline, session, options),
        Operation::BulkWrite {
            requests,
            session,
            options,
        } => bulk_write(coll, entities, requests, session, options),
        Operation::CountDocuments {
            filter,
            session,
            options,
        } => count_documents(coll, entities, filter, session, options),
        Operation::EstimatedDocumentCount { options } => estimated_document_count(coll, options),
        Operation::Distinct {
            field_name,
            filter,
            session,
            options,
        } => distinct(coll, entities, field_name, filter, session, options),
        Operation::Find {
            filter,
            session,
            options,
        } => find(coll, entities, filter, session, options),
        Operation::FindOne {
            filter,
            session,
            options,
        } => find_one(coll, entities, filter, session, options),
        Operation::FindOneAndDelete {
            filter,
            session,
            options,
        } => find_one_and_delete(coll, entities, filter, session, options),
        Operation::FindOneAndReplace {
            filter,
            replacement,
            session,
            options,
        } => find_one_and_replace(coll, entities, filter, replacement, session, options),
        Operation::FindOneAndUpdate {
            filter,
            update,
            session,
            options,
        } => find_one_and_update(coll, entities, filter, update, session, options),
        Operation::InsertOne {
            document,
            session,
            options,
        } => insert_one(coll, entities, document, session, options),
        Operation::InsertMany {
            documents,
            session,
            options,
        } => insert_many(coll, entities, documents, session, options),
        Operation::ReplaceOne {
            filter,
            replacement,
            session,
            options,
        } => replace_one(coll, entities, filter, replacement, session, options),
        Operation::UpdateOne {
            filter,
            update,
            session,
            options,
        } => update_one(coll, entities, filter, update, session, options),
        Operation::UpdateMany {
            filter,
            update,
            session,
            options,
        } => update_many(coll, entities, filter, update, session, options),
        Operation::DeleteOne {
            filter,
            session,
            options,
        } => delete_one(coll, entities, filter, session, options),
        Operation::DeleteMany {
            filter,
            session,
            options,
        } => delete_many(coll, entities, filter, session, options),
        Operation::CreateIndex {
            keys,
            name,
            session,
            options,
        } => create_index(coll, entities, keys, name, session, options),
        Operation::ListIndexes { session } => list_indexes(coll, entities, session),
        Operation::ListIndexNames { session } => list_index_names(coll, entities, session),
        Operation::RenameCollection { to, session, options } => {
            rename_collection(coll, entities, to, session, options)
        }
        Operation::CreateChangeStream {
            pipeline,
            session,
            options,
        } => create_change_stream(coll, entities, pipeline, session, options),
        other => Err(unsupported(&other, EntityKind::Collection)),
    }
}

// =============================================================================
// Individual Handlers
// =============================================================================

/// Handle aggregate operation.
pub fn aggregate(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    pipeline: Vec<Document>,
    session: Option<String>,
    options: AggregateOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.aggregate(pipeline, &options, session.as_deref()), |docs| {
        Ok(Output::Documents(docs))
    })
}

/// Handle bulkWrite operation.
pub fn bulk_write(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    requests: Vec<WriteModel>,
    session: Option<String>,
    options: BulkWriteOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.bulk_write(requests, &options, session.as_deref()), |result| {
        Output::serialize(&result)
    })
}

/// Handle countDocuments operation.
pub fn count_documents(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    session: Option<String>,
    options: CountOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.count_documents(filter, &options, session.as_deref()), |n| {
        Ok(Output::Count(n))
    })
}

/// Handle estimatedDocumentCount operation.
pub fn estimated_document_count(coll: &dyn CollectionHandle, options: EstimatedDocumentCountOptions) -> Outcome {
    finish(coll.estimated_document_count(&options), |n| Ok(Output::Count(n)))
}

/// Handle distinct operation.
pub fn distinct(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    field_name: String,
    filter: Option<Document>,
    session: Option<String>,
    options: DistinctOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        coll.distinct(&field_name, filter, &options, session.as_deref()),
        |values| Ok(Output::Values(values)),
    )
}

/// Handle find operation.
pub fn find(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Option<Document>,
    session: Option<String>,
    options: FindOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.find(filter, &options, session.as_deref()), |docs| {
        Ok(Output::Documents(docs))
    })
}

/// Handle findOne operation.
pub fn find_one(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Option<Document>,
    session: Option<String>,
    options: FindOneOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.find_one(filter, &options, session.as_deref()), |doc| {
        Ok(Output::Optional(doc))
    })
}

/// Handle findOneAndDelete operation.
pub fn find_one_and_delete(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    session: Option<String>,
    options: FindOneAndDeleteOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        coll.find_one_and_delete(filter, &options, session.as_deref()),
        |doc| Ok(Output::Optional(doc)),
    )
}

/// Handle findOneAndReplace operation.
pub fn find_one_and_replace(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    replacement: Document,
    session: Option<String>,
    options: FindOneAndReplaceOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        coll.find_one_and_replace(filter, replacement, &options, session.as_deref()),
        |doc| Ok(Output::Optional(doc)),
    )
}

/// Handle findOneAndUpdate operation.
pub fn find_one_and_update(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    update: UpdateModification,
    session: Option<String>,
    options: FindOneAndUpdateOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        coll.find_one_and_update(filter, update, &options, session.as_deref()),
        |doc| Ok(Output::Optional(doc)),
    )
}

/// Handle insertOne operation.
pub fn insert_one(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    document: Document,
    session: Option<String>,
    options: InsertOneOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.insert_one(document, &options, session.as_deref()), |result| {
        Output::serialize(&result)
    })
}

/// Handle insertMany operation.
pub fn insert_many(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    documents: Vec<Document>,
    session: Option<String>,
    options: InsertManyOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.insert_many(documents, &options, session.as_deref()), |result| {
        Output::serialize(&result)
    })
}

/// Handle replaceOne operation.
pub fn replace_one(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    replacement: Document,
    session: Option<String>,
    options: ReplaceOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        coll.replace_one(filter, replacement, &options, session.as_deref()),
        |result| Output::serialize(&result),
    )
}

/// Handle updateOne operation.
pub fn update_one(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    update: UpdateModification,
    session: Option<String>,
    options: UpdateOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.update_one(filter, update, &options, session.as_deref()), |result| {
        Output::serialize(&result)
    })
}

/// Handle updateMany operation.
pub fn update_many(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    update: UpdateModification,
    session: Option<String>,
    options: UpdateOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.update_many(filter, update, &options, session.as_deref()), |result| {
        Output::serialize(&result)
    })
}

/// Handle deleteOne operation.
pub fn delete_one(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    session: Option<String>,
    options: DeleteOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.delete_one(filter, &options, session.as_deref()), |result| {
        Output::serialize(&result)
    })
}

/// Handle deleteMany operation.
pub fn delete_many(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    filter: Document,
    session: Option<String>,
    options: DeleteOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.delete_many(filter, &options, session.as_deref()), |result| {
        Output::serialize(&result)
    })
}

/// Handle createIndex operation.
pub fn create_index(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    keys: Document,
    name: Option<String>,
    session: Option<String>,
    options: IndexOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        coll.create_index(keys, name.as_deref(), &options, session.as_deref()),
        |name| Ok(Output::Value(name.into())),
    )
}

/// Handle listIndexes operation.
pub fn list_indexes(coll: &dyn CollectionHandle, entities: &EntityMap, session: Option<String>) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.list_indexes(session.as_deref()), |docs| Ok(Output::Documents(docs)))
}

/// Handle listIndexNames operation.
pub fn list_index_names(coll: &dyn CollectionHandle, entities: &EntityMap, session: Option<String>) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.list_index_names(session.as_deref()), |names| Ok(Output::Names(names)))
}

/// Handle renameCollection operation.
pub fn rename_collection(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    to: String,
    session: Option<String>,
    options: RenameCollectionOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.rename(&to, &options, session.as_deref()), |()| Ok(Output::Unit))
}

/// Handle createChangeStream operation.
pub fn create_change_stream(
    coll: &dyn CollectionHandle,
    entities: &EntityMap,
    pipeline: Vec<Document>,
    session: Option<String>,
    options: ChangeStreamOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(coll.watch(pipeline, &options, session.as_deref()), |stream| {
        Ok(Output::ChangeStream(stream))
    })
}

//! Client operation handlers.

use bson::Document;
use unified_core::EntityKind;
use unified_driver::{ChangeStreamOptions, ClientHandle, ListDatabasesOptions};

use super::{finish, unsupported, Outcome};
use crate::entity::EntityMap;
use crate::operation::Operation;
use crate::output::Output;

/// Run an operation against a client entity.
pub fn execute(client: &dyn ClientHandle, entities: &EntityMap, op: Operation) -> Outcome {
    match op {
        Operation::ListDatabases {
            filter,
            session,
            options,
        } => list_databases(client, entities, filter, session, options),
        Operation::CreateChangeStream {
            pipeline,
            session,
            options,
        } => create_change_stream(client, entities, pipeline, session, options),
        other => Err(unsupported(&other, EntityKind::Client)),
    }
}

/// Handle listDatabases operation.
pub fn list_databases(
    client: &dyn ClientHandle,
    entities: &EntityMap,
    filter: Option<Document>,
    session: Option<String>,
    options: ListDatabasesOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        client.list_databases(filter, &options, session.as_deref()),
        |docs| Ok(Output::Documents(docs)),
    )
}

/// Handle createChangeStream operation.
pub fn create_change_stream(
    client: &dyn ClientHandle,
    entities: &EntityMap,
    pipeline: Vec<Document>,
    session: Option<String>,
    options: ChangeStreamOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(client.watch(pipeline, &options, session.as_deref()), |stream| {
        Ok(Output::ChangeStream(stream))
    })
}

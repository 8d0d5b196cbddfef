//! Database operation handlers.

use bson::Document;
use unified_core::{EntityKind, Error};
use unified_driver::*;

use super::{finish, unsupported, Outcome};
use crate::entity::EntityMap;
use crate::operation::Operation;
use crate::output::Output;

/// Run an operation against a database entity.
pub fn execute(db: &dyn DatabaseHandle, entities: &EntityMap, op: Operation) -> Outcome {
    match op {
        Operation::Aggregate {
            pipeline,
            session,
            options,
        } => aggregate(db, entities, pipeline, session, options),
        Operation::CreateCollection {
            collection,
            session,
            options,
        } => create_collection(db, entities, collection, session, options),
        Operation::DropCollection {
            collection,
            session,
            options,
        } => drop_collection(db, entities, collection, session, options),
        Operation::ListCollections {
            filter,
            session,
            options,
        } => list_collections(db, entities, filter, session, options),
        Operation::ListCollectionNames { filter, session } => {
            list_collection_names(db, entities, filter, session)
        }
        Operation::RunCommand {
            command,
            command_name,
            read_concern,
            read_preference,
            write_concern,
            session,
        } => run_command(
            db,
            entities,
            RunCommandArgs {
                command,
                command_name,
                read_concern,
                read_preference,
                write_concern,
            },
            session,
        ),
        Operation::CreateChangeStream {
            pipeline,
            session,
            options,
        } => create_change_stream(db, entities, pipeline, session, options),
        other => Err(unsupported(&other, EntityKind::Database)),
    }
}

// =============================================================================
// Individual Handlers
// =============================================================================

/// Handle aggregate operation.
pub fn aggregate(
    db: &dyn DatabaseHandle,
    entities: &EntityMap,
    pipeline: Vec<Document>,
    session: Option<String>,
    options: AggregateOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(db.aggregate(pipeline, &options, session.as_deref()), |docs| {
        Ok(Output::Documents(docs))
    })
}

/// Handle createCollection operation.
pub fn create_collection(
    db: &dyn DatabaseHandle,
    entities: &EntityMap,
    collection: String,
    session: Option<String>,
    options: CreateCollectionOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        db.create_collection(&collection, &options, session.as_deref()),
        |()| Ok(Output::Unit),
    )
}

/// Handle dropCollection operation.
pub fn drop_collection(
    db: &dyn DatabaseHandle,
    entities: &EntityMap,
    collection: String,
    session: Option<String>,
    options: DropCollectionOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        db.drop_collection(&collection, &options, session.as_deref()),
        |()| Ok(Output::Unit),
    )
}

/// Handle listCollections operation.
pub fn list_collections(
    db: &dyn DatabaseHandle,
    entities: &EntityMap,
    filter: Option<Document>,
    session: Option<String>,
    options: ListCollectionsOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(
        db.list_collections(filter, &options, session.as_deref()),
        |docs| Ok(Output::Documents(docs)),
    )
}

/// Handle listCollectionNames operation.
pub fn list_collection_names(
    db: &dyn DatabaseHandle,
    entities: &EntityMap,
    filter: Option<Document>,
    session: Option<String>,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(db.list_collection_names(filter, session.as_deref()), |names| {
        Ok(Output::Names(names))
    })
}

/// Arguments of `runCommand` besides the session.
pub struct RunCommandArgs {
    pub command: Document,
    pub command_name: Option<String>,
    pub read_concern: Option<Document>,
    pub read_preference: Option<Document>,
    pub write_concern: Option<Document>,
}

impl RunCommandArgs {
    /// The command as sent, with concerns and read preference attached.
    fn into_command(self) -> crate::Result<Document> {
        let mut command = self.command;
        if let Some(expected) = &self.command_name {
            let actual = command.keys().next().map(String::as_str).unwrap_or_default();
            if actual != expected.as_str() {
                return Err(Error::InvalidArguments {
                    operation: "runCommand".to_string(),
                    reason: format!("commandName {} does not match command {}", expected, actual),
                });
            }
        }
        if let Some(read_concern) = self.read_concern {
            command.insert("readConcern", read_concern);
        }
        if let Some(write_concern) = self.write_concern {
            command.insert("writeConcern", write_concern);
        }
        if let Some(read_preference) = self.read_preference {
            command.insert("$readPreference", read_preference);
        }
        Ok(command)
    }
}

/// Handle runCommand operation.
pub fn run_command(
    db: &dyn DatabaseHandle,
    entities: &EntityMap,
    args: RunCommandArgs,
    session: Option<String>,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    let command = args.into_command()?;
    finish(db.run_command(command, session.as_deref()), |reply| {
        Ok(Output::Value(reply.into()))
    })
}

/// Handle createChangeStream operation.
pub fn create_change_stream(
    db: &dyn DatabaseHandle,
    entities: &EntityMap,
    pipeline: Vec<Document>,
    session: Option<String>,
    options: ChangeStreamOptions,
) -> Outcome {
    let session = entities.optional_session(session.as_deref())?;
    finish(db.watch(pipeline, &options, session.as_deref()), |stream| {
        Ok(Output::ChangeStream(stream))
    })
}

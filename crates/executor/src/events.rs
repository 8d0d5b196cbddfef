//! Verification of `expectEvents`.

use bson::{Bson, Document};
use serde::Deserialize;
use tracing::info;
use unified_core::{Error, Result};
use unified_driver::CommandEvent;

use crate::entity::EntityMap;
use crate::matcher;

/// Events one client must have observed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectedEventsForClient {
    pub client: String,
    #[serde(default)]
    pub event_type: Option<String>,
    /// Raw events; decoded as [`ExpectedEvent`]s only for `eventType: command`
    pub events: Vec<Document>,
    #[serde(default)]
    pub ignore_extra_events: Option<bool>,
}

/// One expected command monitoring event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpectedEvent {
    CommandStartedEvent(ExpectedCommandStarted),
    CommandSucceededEvent(ExpectedCommandSucceeded),
    CommandFailedEvent(ExpectedCommandFailed),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectedCommandStarted {
    pub command: Option<Document>,
    pub command_name: Option<String>,
    pub database_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectedCommandSucceeded {
    pub reply: Option<Document>,
    pub command_name: Option<String>,
    pub database_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectedCommandFailed {
    pub command_name: Option<String>,
    pub database_name: Option<String>,
}

impl ExpectedEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExpectedEvent::CommandStartedEvent(_) => "commandStartedEvent",
            ExpectedEvent::CommandSucceededEvent(_) => "commandSucceededEvent",
            ExpectedEvent::CommandFailedEvent(_) => "commandFailedEvent",
        }
    }

    /// Check one observed event. Returns the reason on mismatch.
    fn check(&self, actual: &CommandEvent, entities: &EntityMap) -> std::result::Result<(), String> {
        if self.event_type() != actual.event_type() {
            return Err(format!("expected {}, got {}", self.event_type(), actual.event_type()));
        }
        let (command_name, database_name) = match self {
            ExpectedEvent::CommandStartedEvent(e) => (&e.command_name, &e.database_name),
            ExpectedEvent::CommandSucceededEvent(e) => (&e.command_name, &e.database_name),
            ExpectedEvent::CommandFailedEvent(e) => (&e.command_name, &e.database_name),
        };
        if let Some(name) = command_name {
            if name != actual.command_name() {
                return Err(format!("expected command {}, got {}", name, actual.command_name()));
            }
        }
        if let Some(name) = database_name {
            if name != actual.database_name() {
                return Err(format!("expected database {}, got {}", name, actual.database_name()));
            }
        }
        let body = match (self, actual) {
            (ExpectedEvent::CommandStartedEvent(e), CommandEvent::Started { command, .. }) => {
                e.command.as_ref().map(|expected| ("command", expected, command))
            }
            (ExpectedEvent::CommandSucceededEvent(e), CommandEvent::Succeeded { reply, .. }) => {
                e.reply.as_ref().map(|expected| ("reply", expected, reply))
            }
            _ => None,
        };
        if let Some((field, expected, actual)) = body {
            let expected = Bson::Document(expected.clone());
            let actual = Bson::Document(actual.clone());
            matcher::match_root(&expected, &actual, entities)
                .map_err(|m| format!("{} mismatch at {}", field, m))?;
        }
        Ok(())
    }
}

impl ExpectedEventsForClient {
    /// `eventType`, defaulting to `command`.
    pub fn event_type(&self) -> &str {
        self.event_type.as_deref().unwrap_or("command")
    }

    /// Decode the expected command events. Entries of other event types
    /// decode to an empty list.
    pub fn command_events(&self) -> Result<Vec<ExpectedEvent>> {
        if self.event_type() != "command" {
            return Ok(Vec::new());
        }
        self.events
            .iter()
            .map(|event| {
                bson::from_document(event.clone()).map_err(|e| {
                    Error::invalid_test_file(format!("expected event for client {}: {}", self.client, e))
                })
            })
            .collect()
    }
}

/// Verify one `expectEvents` entry against the client's observed events.
pub fn verify(expected: &ExpectedEventsForClient, entities: &EntityMap) -> Result<()> {
    let event_type = expected.event_type();
    if event_type != "command" {
        info!(
            target: "unified::executor",
            client = expected.client.as_str(),
            event_type,
            "skipping verification of non-command events"
        );
        return Ok(());
    }
    let events = expected.command_events()?;

    let client = entities.client(&expected.client)?;
    let observed = client.observed_events();
    let fail = |reason: String| Error::EventMismatch {
        client: expected.client.clone(),
        reason,
    };

    let ignore_extra = expected.ignore_extra_events.unwrap_or(false);
    if observed.len() < events.len() || (!ignore_extra && observed.len() != events.len()) {
        let names: Vec<&str> = observed.iter().map(CommandEvent::command_name).collect();
        return Err(fail(format!(
            "expected {} events, observed {} ({})",
            events.len(),
            observed.len(),
            names.join(", ")
        )));
    }
    for (i, (want, got)) in events.iter().zip(observed.iter()).enumerate() {
        want.check(got, entities)
            .map_err(|reason| fail(format!("event {}: {}", i, reason)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn expected_event_decodes_externally_tagged() {
        let event: ExpectedEvent = bson::from_document(doc! {
            "commandStartedEvent": { "commandName": "insert", "command": { "insert": "coll" } }
        })
        .unwrap();
        assert_eq!(event.event_type(), "commandStartedEvent");
    }

    fn expectation(event_type: Option<&str>, events: Vec<Document>) -> ExpectedEventsForClient {
        ExpectedEventsForClient {
            client: "client0".into(),
            event_type: event_type.map(String::from),
            events,
            ignore_extra_events: None,
        }
    }

    #[test]
    fn command_events_decode_by_default() {
        let expected = expectation(None, vec![doc! { "commandStartedEvent": { "commandName": "ping" } }]);
        let events = expected.command_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "commandStartedEvent");
    }

    #[test]
    fn unknown_command_event_is_invalid() {
        let expected = expectation(Some("command"), vec![doc! { "poolCreatedEvent": {} }]);
        assert!(matches!(
            expected.command_events(),
            Err(Error::InvalidTestFile { .. })
        ));
    }

    #[test]
    fn other_event_types_are_not_decoded() {
        let expected = expectation(
            Some("cmap"),
            vec![doc! { "poolCreatedEvent": {} }, doc! { "connectionReadyEvent": {} }],
        );
        assert!(expected.command_events().unwrap().is_empty());
        assert!(verify(&expected, &EntityMap::new()).is_ok());
    }

    #[test]
    fn check_compares_name_and_command() {
        let expected = ExpectedEvent::CommandStartedEvent(ExpectedCommandStarted {
            command: Some(doc! { "insert": "coll" }),
            command_name: Some("insert".into()),
            database_name: Some("db".into()),
        });
        let actual = CommandEvent::Started {
            command_name: "insert".into(),
            database_name: "db".into(),
            command: doc! { "insert": "coll", "ordered": true },
        };
        assert!(expected.check(&actual, &EntityMap::new()).is_ok());

        let other = CommandEvent::Started {
            command_name: "find".into(),
            database_name: "db".into(),
            command: doc! { "find": "coll" },
        };
        assert!(expected.check(&other, &EntityMap::new()).is_err());
    }
}

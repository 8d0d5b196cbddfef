//! Command monitoring events.

use bson::Document;
use unified_core::DriverError;

/// A captured command monitoring event.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    Started {
        command_name: String,
        database_name: String,
        command: Document,
    },
    Succeeded {
        command_name: String,
        database_name: String,
        reply: Document,
    },
    Failed {
        command_name: String,
        database_name: String,
        error: DriverError,
    },
}

impl CommandEvent {
    /// Name of the event type as used by `observeEvents`.
    pub fn event_type(&self) -> &'static str {
        match self {
            CommandEvent::Started { .. } => "commandStartedEvent",
            CommandEvent::Succeeded { .. } => "commandSucceededEvent",
            CommandEvent::Failed { .. } => "commandFailedEvent",
        }
    }

    pub fn command_name(&self) -> &str {
        match self {
            CommandEvent::Started { command_name, .. }
            | CommandEvent::Succeeded { command_name, .. }
            | CommandEvent::Failed { command_name, .. } => command_name,
        }
    }

    pub fn database_name(&self) -> &str {
        match self {
            CommandEvent::Started { database_name, .. }
            | CommandEvent::Succeeded { database_name, .. }
            | CommandEvent::Failed { database_name, .. } => database_name,
        }
    }
}

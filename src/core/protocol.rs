//! Message protocol between the pool and an activity unit.
//!
//! The pool sends exactly one `start` message per task:
//!
//! ```json
//! {"type":"start","activityRef":"/opt/activities/report.sh","payload":{"day":"mon"}}
//! ```
//!
//! The unit answers with zero or more `running` statuses followed by exactly one
//! terminal status:
//!
//! ```json
//! {"type":"status","status":"running","data":{"progress":0.5}}
//! {"type":"status","status":"completed","data":{"rows":120}}
//! ```
//!
//! Faults and process exits are not messages; channels surface them as
//! [`UnitEvent::Fault`] and [`UnitEvent::Exit`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::PoolError;

/// Pool → unit messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolMessage {
    /// Begin executing the activity with the given payload.
    Start {
        /// Resolved activity reference.
        #[serde(rename = "activityRef")]
        activity_ref: String,
        /// Task payload.
        payload: Value,
    },
}

/// Status values a unit may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Progress update, non-terminal.
    Running,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Error,
}

impl UnitStatus {
    /// Whether this status ends the task.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Unit → pool messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitMessage {
    /// Status report.
    Status {
        /// Reported status.
        status: UnitStatus,
        /// Attached data.
        #[serde(default)]
        data: Value,
    },
}

impl UnitMessage {
    /// Non-terminal progress report.
    #[must_use]
    pub fn running(data: Value) -> Self {
        Self::Status {
            status: UnitStatus::Running,
            data,
        }
    }

    /// Terminal success.
    #[must_use]
    pub fn completed(data: Value) -> Self {
        Self::Status {
            status: UnitStatus::Completed,
            data,
        }
    }

    /// Terminal failure.
    #[must_use]
    pub fn error(data: Value) -> Self {
        Self::Status {
            status: UnitStatus::Error,
            data,
        }
    }
}

/// Everything a channel can observe from a running unit.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitEvent {
    /// A protocol message.
    Message(UnitMessage),
    /// Crash or uncaught fault inside the unit.
    Fault(String),
    /// The unit is gone. `code` is `None` when killed or not applicable.
    Exit {
        /// Process-style exit code.
        code: Option<i32>,
    },
}

/// Bidirectional channel to one running activity unit.
///
/// After [`UnitEvent::Exit`] has been returned, callers must not call
/// `receive` again.
#[async_trait]
pub trait ActivityChannel: Send {
    /// Deliver a message to the unit.
    async fn send(&mut self, message: PoolMessage) -> Result<(), PoolError>;

    /// Wait for the next event from the unit.
    async fn receive(&mut self) -> UnitEvent;

    /// Forcibly stop the unit and wait until it is gone.
    async fn terminate(&mut self) -> Result<(), PoolError>;
}

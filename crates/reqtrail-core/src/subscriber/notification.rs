//! Wire format for framework instrumentation notifications.
//!
//! One notification per line in a JSON-lines stream, for example:
//!
//! ```json
//! {"context": 7, "event": "start_processing", "controller": "UsersController", "action": "show", "format": "html", "params": {"id": "10"}}
//! {"context": 7, "event": "process_action", "status": 200, "view_runtime": 4.2}
//! {"context": 7, "event": "request_finished"}
//! ```

use crate::record::CacheOperation;
use crate::registry::ContextId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One instrumentation event, tagged with the context it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub context: ContextId,

    #[serde(flatten)]
    pub event: NotificationKind,
}

impl Notification {
    pub fn new(context: ContextId, event: NotificationKind) -> Self {
        Self { context, event }
    }

    /// Parse one JSON line
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Events emitted by the request-handling framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationKind {
    RequestStarted,
    StartProcessing {
        controller: String,
        action: String,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        params: serde_json::Value,
    },
    ProcessAction {
        #[serde(default)]
        status: Option<u16>,
        /// Milliseconds
        #[serde(default)]
        view_runtime: Option<f64>,
        /// Milliseconds
        #[serde(default)]
        db_runtime: Option<f64>,
    },
    HaltedCallback {
        filter: String,
    },
    RedirectTo {
        location: String,
    },
    SendDataStarted {
        filename: String,
    },
    SendDataFinished,
    SendFileStarted {
        path: String,
    },
    SendFileFinished,
    Cache {
        operation: CacheOperation,
        key_or_path: String,
    },
    Exception {
        kind: String,
        #[serde(default)]
        rescued: bool,
    },
    RequestFinished,
}

impl NotificationKind {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            NotificationKind::RequestStarted => "request_started",
            NotificationKind::StartProcessing { .. } => "start_processing",
            NotificationKind::ProcessAction { .. } => "process_action",
            NotificationKind::HaltedCallback { .. } => "halted_callback",
            NotificationKind::RedirectTo { .. } => "redirect_to",
            NotificationKind::SendDataStarted { .. } => "send_data_started",
            NotificationKind::SendDataFinished => "send_data_finished",
            NotificationKind::SendFileStarted { .. } => "send_file_started",
            NotificationKind::SendFileFinished => "send_file_finished",
            NotificationKind::Cache { .. } => "cache",
            NotificationKind::Exception { .. } => "exception",
            NotificationKind::RequestFinished => "request_finished",
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for context {}", self.event.name(), self.context)
    }
}

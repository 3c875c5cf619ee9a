use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::store::LogEvent;

/// Snapshot tag routing the event log table to its dashboard region.
pub const EVENT_TABLE_ID: &str = "event-table-content";
/// Snapshot tag routing the roster table to its dashboard region.
pub const USER_TABLE_ID: &str = "user-table-content";

// ============================================
// Inbound command messages
// ============================================

/// A command submitted by a client over the websocket.
///
/// `request_type` is either `SIGNAL` (forwarded to the external arbiter,
/// outside this server's scope) or `PAYLOAD` (`ADD_USER`, `REMOVE_USER`,
/// `LOG_IMAGE` with an associated payload string).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub request_type: String,
    pub command: String,
    #[serde(default)]
    pub payload: Option<String>,
}

// ============================================
// Outbound messages to observers
// ============================================

/// An operational error shown to all observers, buffered for replay to
/// observers that connect later.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorNotice {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Error notice broadcast (and replayed on connect).
    #[serde(rename = "logError")]
    LogError(ErrorNotice),
    /// Full-state table snapshot, routed by `id`.
    #[serde(rename = "tableUpdate")]
    TableUpdate {
        id: &'static str,
        data: serde_json::Value,
    },
}

pub fn event_table_update(logs: &[LogEvent]) -> ServerMessage {
    ServerMessage::TableUpdate {
        id: EVENT_TABLE_ID,
        data: serde_json::to_value(logs).unwrap_or(serde_json::Value::Null),
    }
}

pub fn user_table_update(users: &[String]) -> ServerMessage {
    ServerMessage::TableUpdate {
        id: USER_TABLE_ID,
        data: serde_json::to_value(users).unwrap_or(serde_json::Value::Null),
    }
}

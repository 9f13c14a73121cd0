use serde::{Deserialize, Serialize};
use specta::Type;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Immutable audit record of one inbound call. Only the terminal
/// status/error/processed_at fields are ever written after creation.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct Event {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub event_type: String,
    /// Parsed payload re-serialized as JSON text.
    pub payload: String,
    /// Exact inbound body, lossily decoded for display. Signatures and
    /// replays operate on the stored raw bytes, not this string.
    pub raw_body: String,
    pub raw_headers: BTreeMap<String, String>,
    pub signature: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: String,
    pub content_type: Option<String>,
    pub body_hash: Option<String>,
    pub request_id: Option<String>,

    pub status: EventStatus,
    pub error_message: Option<String>,
    pub body_size: i64,
    pub is_duplicate: bool,

    pub created_at: String,
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    New,
    Processing,
    Processed,
    Failed,
    Forwarded,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct EventSummary {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub event_type: String,
    pub status: EventStatus,
    pub is_duplicate: bool,
    pub body_size: i64,
    pub source_ip: Option<String>,
    pub created_at: String,
}

use serde::{Deserialize, Serialize};
use specta::Type;
use std::collections::BTreeMap;
use uuid::Uuid;

/// One outbound send and its outcome. Test sends, replays and forwards share
/// this shape and differ only in `kind` and event linkage.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub kind: DeliveryKind,
    pub event_id: Option<Uuid>,
    pub endpoint_id: Uuid,
    pub target_url: String,

    pub request_headers: BTreeMap<String, String>,
    pub request_body: String,

    pub status: DeliveryStatus,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,

    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    Test,
    Replay,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

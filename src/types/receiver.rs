use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

/// 200 body for an accepted inbound call. Duplicates are accepted too; the
/// flag tells the sender its retry was recognized.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct IngestAccepted {
    pub status: String,
    pub message: String,
    pub event_id: Uuid,
    pub duplicate: bool,
}

/// 401 body for a signature failure. The event is persisted regardless, so
/// the id is returned for traceability.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct IngestRejected {
    pub error: String,
    pub event_id: Uuid,
}

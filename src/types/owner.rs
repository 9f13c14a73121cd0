use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

use crate::types::{DeliveryAttempt, DeliveryStatus, Endpoint, Event, EventSummary};

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CreateEndpointRequest {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<String>,
}

/// The plaintext secret appears here exactly once; afterwards only the
/// masked form (or an explicit reveal) is available.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CreateEndpointResponse {
    pub endpoint: Endpoint,
    pub webhook_url: String,
    pub secret: String,
    pub masked_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListEndpointsResponse {
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct GetEndpointResponse {
    pub endpoint: Endpoint,
    pub webhook_url: String,
    pub masked_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct RotateSecretResponse {
    pub message: String,
    pub new_secret: String,
    pub masked_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct RevealSecretResponse {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct TestSendResponse {
    pub message: String,
    pub event_id: Uuid,
    pub attempt_id: Uuid,
    pub status: DeliveryStatus,
    pub response_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct RelayTargetRequest {
    pub target_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct RelayResponse {
    pub message: String,
    pub attempt_id: Uuid,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListEventsResponse {
    pub events: Vec<EventSummary>,
    pub next_before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct GetEventResponse {
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListAttemptsResponse {
    pub attempts: Vec<DeliveryAttempt>,
}

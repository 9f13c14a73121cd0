use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

/// A receiving endpoint. The encrypted secret never leaves the store layer;
/// callers only ever see the masked form or an explicit one-time reveal.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct Endpoint {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub path_token: String,
    pub status: EndpointStatus,

    pub created_at: String,
    pub updated_at: String,
    pub last_used_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Active,
    Paused,
    Disabled,
}

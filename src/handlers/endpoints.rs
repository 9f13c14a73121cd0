use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    dispatch::{
        self, NewAttempt, OutboundRequest,
        sender::TEST_USER_AGENT,
        store::StoreError as DispatchStoreError,
    },
    endpoints::store::{self as endpoints, StoreError as EndpointStoreError},
    error::ApiError,
    extractors::ValidJson,
    ingest::store::{self as events, NewEvent, StoreError as EventStoreError},
    signature,
    state::AppState,
    types::{
        CreateEndpointRequest, CreateEndpointResponse, DeliveryKind, DeliveryStatus, EventStatus,
        GetEndpointResponse, ListEndpointsResponse, RevealSecretResponse, RotateSecretResponse,
        TestSendResponse,
    },
    vault::SecretVault,
};

const DEFAULT_OWNER: &str = "default";

pub async fn create_endpoint_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateEndpointRequest>,
) -> Result<Json<CreateEndpointResponse>, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name must be non-empty"));
    }
    let owner_id = req
        .owner_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_OWNER);
    let description = req.description.as_deref().unwrap_or("");

    let (endpoint, secret) =
        endpoints::create_endpoint(&state.pool, &state.vault, owner_id, name, description)
            .await
            .map_err(map_endpoint_store_error)?;

    tracing::info!(endpoint_id = %endpoint.id, owner_id, "webhook endpoint created");

    let webhook_url = state.webhook_url(&endpoint.path_token);
    let masked_secret = SecretVault::mask(&secret);

    Ok(Json(CreateEndpointResponse {
        endpoint,
        webhook_url,
        secret,
        masked_secret,
    }))
}

pub async fn list_endpoints_handler(
    State(state): State<AppState>,
) -> Result<Json<ListEndpointsResponse>, ApiError> {
    let endpoints = endpoints::list_endpoints(&state.pool)
        .await
        .map_err(map_endpoint_store_error)?;
    Ok(Json(ListEndpointsResponse { endpoints }))
}

pub async fn get_endpoint_handler(
    State(state): State<AppState>,
    Path(endpoint_id): Path<String>,
) -> Result<Json<GetEndpointResponse>, ApiError> {
    let endpoint_id = parse_uuid("endpoint_id", &endpoint_id)?;
    let record = endpoints::get_endpoint(&state.pool, endpoint_id)
        .await
        .map_err(map_endpoint_store_error)?;
    let secret = decrypt_secret(&state, &record.encrypted_secret)?;

    Ok(Json(GetEndpointResponse {
        webhook_url: state.webhook_url(&record.endpoint.path_token),
        masked_secret: SecretVault::mask(&secret),
        endpoint: record.endpoint,
    }))
}

/// The new plaintext appears in this response exactly once; the previous
/// secret stops verifying immediately.
pub async fn rotate_secret_handler(
    State(state): State<AppState>,
    Path(endpoint_id): Path<String>,
) -> Result<Json<RotateSecretResponse>, ApiError> {
    let endpoint_id = parse_uuid("endpoint_id", &endpoint_id)?;
    let new_secret = endpoints::rotate_secret(&state.pool, &state.vault, endpoint_id)
        .await
        .map_err(map_endpoint_store_error)?;

    tracing::info!(endpoint_id = %endpoint_id, "endpoint secret rotated");

    let masked_secret = SecretVault::mask(&new_secret);
    Ok(Json(RotateSecretResponse {
        message: "Secret rotated successfully".to_string(),
        new_secret,
        masked_secret,
    }))
}

pub async fn reveal_secret_handler(
    State(state): State<AppState>,
    Path(endpoint_id): Path<String>,
) -> Result<Json<RevealSecretResponse>, ApiError> {
    let endpoint_id = parse_uuid("endpoint_id", &endpoint_id)?;
    let record = endpoints::get_endpoint(&state.pool, endpoint_id)
        .await
        .map_err(map_endpoint_store_error)?;
    let secret = decrypt_secret(&state, &record.encrypted_secret)?;
    Ok(Json(RevealSecretResponse { secret }))
}

#[derive(Debug, Deserialize)]
pub struct TestSendRequest {
    event_type: String,
    payload: serde_json::Value,
}

/// Synthesize a signed event and deliver it to the endpoint's own webhook
/// URL. The synthesized event and the attempt both land in the audit trail;
/// a failed send is a recorded outcome, not an error.
pub async fn test_send_handler(
    State(state): State<AppState>,
    Path(endpoint_id): Path<String>,
    ValidJson(req): ValidJson<TestSendRequest>,
) -> Result<Json<TestSendResponse>, ApiError> {
    let endpoint_id = parse_uuid("endpoint_id", &endpoint_id)?;
    let event_type = req.event_type.trim();
    if event_type.is_empty() {
        return Err(ApiError::validation("event_type must be non-empty"));
    }

    let record = endpoints::get_endpoint(&state.pool, endpoint_id)
        .await
        .map_err(map_endpoint_store_error)?;
    let secret = decrypt_secret(&state, &record.encrypted_secret)?;

    let payload_json = req.payload.to_string();
    let sig = signature::sign(&secret, payload_json.as_bytes());
    let headers = dispatch::build_test_headers(event_type, &sig);
    let body_hash = hex::encode(Sha256::digest(payload_json.as_bytes()));

    let event_id = events::insert_event(
        &state.pool,
        &NewEvent {
            endpoint_id,
            event_type,
            payload: &payload_json,
            raw_body: payload_json.as_bytes(),
            raw_headers: &headers,
            signature: Some(&sig),
            source_ip: None,
            user_agent: TEST_USER_AGENT,
            content_type: Some("application/json"),
            body_hash: Some(&body_hash),
            request_id: None,
            status: EventStatus::Processing,
            error_message: None,
            is_duplicate: false,
        },
    )
    .await
    .map_err(map_event_store_error)?;

    let target_url = state.webhook_url(&record.endpoint.path_token);
    let attempt_id = dispatch::insert_attempt(
        &state.pool,
        &NewAttempt {
            kind: DeliveryKind::Test,
            event_id: Some(event_id),
            endpoint_id,
            target_url: &target_url,
            request_headers: &headers,
            request_body: payload_json.as_bytes(),
        },
    )
    .await
    .map_err(map_dispatch_store_error)?;

    let outcome = dispatch::send(
        &state.http,
        &state.delivery,
        &OutboundRequest {
            target_url,
            headers,
            body: payload_json.into_bytes(),
        },
    )
    .await;

    dispatch::finalize_attempt(&state.pool, attempt_id, &outcome)
        .await
        .map_err(map_dispatch_store_error)?;

    let (event_status, error_message) = match outcome.status {
        DeliveryStatus::Sent => (EventStatus::Processed, None),
        DeliveryStatus::Pending | DeliveryStatus::Failed => {
            (EventStatus::Failed, outcome.error_message.clone())
        }
    };
    if let Err(err) =
        events::set_event_outcome(&state.pool, event_id, event_status, error_message.as_deref())
            .await
    {
        tracing::warn!(event_id = %event_id, error = ?err, "failed to finalize test event");
    }
    if let Err(err) = endpoints::touch_last_used(&state.pool, endpoint_id).await {
        tracing::warn!(endpoint_id = %endpoint_id, error = ?err, "failed to update last_used_at");
    }

    Ok(Json(TestSendResponse {
        message: "Test webhook sent".to_string(),
        event_id,
        attempt_id,
        status: outcome.status,
        response_code: outcome.response_status,
    }))
}

fn decrypt_secret(state: &AppState, encrypted_secret: &str) -> Result<String, ApiError> {
    state.vault.decrypt(encrypted_secret).map_err(|err| {
        tracing::error!(error = %err, "endpoint secret unavailable");
        ApiError::internal("endpoint secret is corrupt")
    })
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::validation(format!("{field} must be a UUID")))
}

fn map_endpoint_store_error(err: EndpointStoreError) -> ApiError {
    match err {
        EndpointStoreError::Db(db) => ApiError::Db(db),
        EndpointStoreError::NotFound(message) => ApiError::NotFound(message),
        EndpointStoreError::Parse(message) => ApiError::Internal(message),
        EndpointStoreError::Secret(err) => {
            tracing::error!(error = %err, "secret vault failure");
            ApiError::Internal("secret vault failure".to_string())
        }
    }
}

fn map_event_store_error(err: EventStoreError) -> ApiError {
    match err {
        EventStoreError::Db(db) => ApiError::Db(db),
        EventStoreError::Conflict(message) => ApiError::Conflict(message),
        EventStoreError::NotFound(message) => ApiError::NotFound(message),
        EventStoreError::Parse(message) => ApiError::Internal(message),
    }
}

fn map_dispatch_store_error(err: DispatchStoreError) -> ApiError {
    match err {
        DispatchStoreError::Db(db) => ApiError::Db(db),
        DispatchStoreError::NotFound(message) => ApiError::NotFound(message),
        DispatchStoreError::Parse(message) => ApiError::Internal(message),
    }
}

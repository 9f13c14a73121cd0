use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    dispatch::{self, NewAttempt, OutboundRequest, store::StoreError as DispatchStoreError},
    error::ApiError,
    extractors::ValidJson,
    ingest::store::{StoreError as EventStoreError, get_event},
    state::AppState,
    types::{DeliveryKind, RelayResponse, RelayTargetRequest},
};

pub async fn replay_event_handler(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    ValidJson(req): ValidJson<RelayTargetRequest>,
) -> Result<(StatusCode, Json<RelayResponse>), ApiError> {
    relay_stored_event(&state, &event_id, DeliveryKind::Replay, req.target_url).await
}

pub async fn forward_event_handler(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    ValidJson(req): ValidJson<RelayTargetRequest>,
) -> Result<(StatusCode, Json<RelayResponse>), ApiError> {
    relay_stored_event(&state, &event_id, DeliveryKind::Forward, req.target_url).await
}

/// Shared replay/forward path: one attempt row, one outbound call, one
/// finalize. The source event is read-only here; only the attempt records
/// the outcome. A 201 is returned even when the send failed.
async fn relay_stored_event(
    state: &AppState,
    event_id: &str,
    kind: DeliveryKind,
    target_url: String,
) -> Result<(StatusCode, Json<RelayResponse>), ApiError> {
    let event_id = parse_uuid("event_id", event_id)?;
    let target_url = target_url.trim().to_string();
    if target_url.is_empty() {
        return Err(ApiError::validation("target_url is required"));
    }
    let parsed = reqwest::Url::parse(&target_url)
        .map_err(|_| ApiError::validation("target_url must be a valid URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::validation("target_url must be http or https"));
    }

    let record = get_event(&state.pool, event_id)
        .await
        .map_err(map_event_store_error)?;
    let event = &record.event;

    let headers = dispatch::build_headers(
        kind,
        event.id,
        &event.event_type,
        event.content_type.as_deref(),
        event.source_ip.as_deref(),
        &event.raw_headers,
    );

    let attempt_id = dispatch::insert_attempt(
        &state.pool,
        &NewAttempt {
            kind,
            event_id: Some(event.id),
            endpoint_id: event.endpoint_id,
            target_url: &target_url,
            request_headers: &headers,
            request_body: &record.raw_bytes,
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
            body: record.raw_bytes.clone(),
        },
    )
    .await;

    dispatch::finalize_attempt(&state.pool, attempt_id, &outcome)
        .await
        .map_err(map_dispatch_store_error)?;

    tracing::info!(
        event_id = %event.id,
        attempt_id = %attempt_id,
        kind = ?kind,
        status = ?outcome.status,
        "outbound relay attempt recorded"
    );

    let message = match kind {
        DeliveryKind::Replay => "Event replay initiated",
        DeliveryKind::Forward => "Event forward initiated",
        DeliveryKind::Test => "Test webhook sent",
    };

    Ok((
        StatusCode::CREATED,
        Json(RelayResponse {
            message: message.to_string(),
            attempt_id,
            status: outcome.status,
        }),
    ))
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::validation(format!("{field} must be a UUID")))
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

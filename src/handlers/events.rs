use axum::{
    Json,
    extract::{Path, State},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dispatch::store::{self as attempts, StoreError as DispatchStoreError},
    error::ApiError,
    extractors::ValidQuery,
    ingest::store::{
        EventCursor, ListEventsParams, StoreError as EventStoreError, get_event, list_events,
    },
    state::AppState,
    types::{
        EventStatus, GetEventResponse, ListAttemptsResponse, ListEventsResponse,
    },
};

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    limit: Option<i64>,
    before: Option<String>,
    status: Option<String>,
    endpoint_id: Option<String>,
    is_duplicate: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    created_at: String,
    id: String,
}

pub async fn list_events_handler(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ListEventsQuery>,
) -> Result<Json<ListEventsResponse>, ApiError> {
    let limit = parse_limit(query.limit)?;
    let before = match query.before {
        Some(raw) => Some(decode_cursor(&raw)?),
        None => None,
    };
    let status = match query.status {
        Some(raw) => Some(parse_status(&raw)?),
        None => None,
    };
    let endpoint_id = match query.endpoint_id {
        Some(raw) => Some(parse_uuid("endpoint_id", &raw)?),
        None => None,
    };

    let params = ListEventsParams {
        limit,
        before,
        status,
        endpoint_id,
        is_duplicate: query.is_duplicate,
    };

    let result = list_events(&state.pool, &params)
        .await
        .map_err(map_event_store_error)?;
    let next_before = match result.next_before {
        Some(cursor) => Some(encode_cursor(&cursor)?),
        None => None,
    };

    Ok(Json(ListEventsResponse {
        events: result.events,
        next_before,
    }))
}

pub async fn get_event_handler(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<GetEventResponse>, ApiError> {
    let event_id = parse_uuid("event_id", &event_id)?;
    let record = get_event(&state.pool, event_id)
        .await
        .map_err(map_event_store_error)?;
    Ok(Json(GetEventResponse {
        event: record.event,
    }))
}

pub async fn list_attempts_handler(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<ListAttemptsResponse>, ApiError> {
    let event_id = parse_uuid("event_id", &event_id)?;
    // 404 for unknown events rather than an empty list.
    get_event(&state.pool, event_id)
        .await
        .map_err(map_event_store_error)?;
    let attempts = attempts::list_attempts_for_event(&state.pool, event_id)
        .await
        .map_err(map_dispatch_store_error)?;
    Ok(Json(ListAttemptsResponse { attempts }))
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(ApiError::validation("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::validation(format!("{field} must be a UUID")))
}

fn parse_status(value: &str) -> Result<EventStatus, ApiError> {
    match value {
        "new" => Ok(EventStatus::New),
        "processing" => Ok(EventStatus::Processing),
        "processed" => Ok(EventStatus::Processed),
        "failed" => Ok(EventStatus::Failed),
        "forwarded" => Ok(EventStatus::Forwarded),
        _ => Err(ApiError::validation("status is invalid")),
    }
}

fn decode_cursor(raw: &str) -> Result<EventCursor, ApiError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| ApiError::validation("before must be a valid cursor"))?;
    let payload: CursorPayload = serde_json::from_slice(&decoded)
        .map_err(|_| ApiError::validation("before must be a valid cursor"))?;
    DateTime::parse_from_rfc3339(&payload.created_at)
        .map_err(|_| ApiError::validation("before must be a valid cursor"))?;
    let id = Uuid::parse_str(&payload.id)
        .map_err(|_| ApiError::validation("before must be a valid cursor"))?;
    Ok(EventCursor {
        created_at: payload.created_at,
        id,
    })
}

fn encode_cursor(cursor: &EventCursor) -> Result<String, ApiError> {
    let payload = CursorPayload {
        created_at: cursor.created_at.clone(),
        id: cursor.id.to_string(),
    };
    let encoded = serde_json::to_vec(&payload)
        .map_err(|_| ApiError::internal("failed to encode cursor"))?;
    Ok(URL_SAFE_NO_PAD.encode(encoded))
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

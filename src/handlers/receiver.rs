use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{
    error::ApiError,
    ingest::{self, InboundCall, IngestError, IngestOutcome},
    state::AppState,
    types::{ApiErrorCode, ApiErrorResponse, IngestAccepted, IngestRejected},
};

/// Inbound webhook receiver, routed by path token. All outcomes short of a
/// persistence failure produce a response carrying the stored event id.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(path_token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let call = inbound_call(&headers, &body);

    match ingest::ingest(&state.pool, &state.vault, &state.notifier, &path_token, call).await {
        Ok(IngestOutcome::Accepted {
            event_id,
            duplicate,
        }) => (
            StatusCode::OK,
            Json(IngestAccepted {
                status: "success".to_string(),
                message: "Webhook received successfully".to_string(),
                event_id,
                duplicate,
            }),
        )
            .into_response(),
        Ok(IngestOutcome::InvalidSignature { event_id }) => (
            StatusCode::UNAUTHORIZED,
            Json(IngestRejected {
                error: "Invalid signature".to_string(),
                event_id,
            }),
        )
            .into_response(),
        Err(IngestError::EndpointNotFound | IngestError::EndpointInactive) => {
            ApiError::not_found("webhook endpoint not found").into_response()
        }
        Err(IngestError::SecretCorrupt(err)) => {
            tracing::error!(error = %err, "endpoint secret unavailable");
            ApiError::internal("endpoint secret unavailable").into_response()
        }
        Err(err @ (IngestError::Lookup(_) | IngestError::Persist(_))) => {
            tracing::error!(error = %err, "failed to process webhook");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiErrorResponse {
                    code: ApiErrorCode::Internal,
                    message: "failed to process webhook".to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn inbound_call(headers: &HeaderMap, body: &Bytes) -> InboundCall {
    let mut raw_headers = BTreeMap::new();
    for (name, value) in headers {
        raw_headers.insert(
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }

    let source_ip = raw_headers
        .get("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| raw_headers.get("x-real-ip").cloned());

    let non_empty = |value: &String| !value.trim().is_empty();

    InboundCall {
        content_type: raw_headers.get("content-type").cloned(),
        user_agent: raw_headers.get("user-agent").cloned().unwrap_or_default(),
        request_id: raw_headers.get("x-request-id").cloned().filter(non_empty),
        event_type: raw_headers.get("x-event-type").cloned(),
        signature: raw_headers.get("x-signature").cloned().filter(non_empty),
        source_ip,
        raw_body: body.to_vec(),
        raw_headers,
    }
}

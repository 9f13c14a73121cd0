//! Ingestion state machine for one inbound webhook call.
//!
//! received -> parsed -> hashed -> dedup-checked -> signature-checked ->
//! persisted -> notified -> responded. Rejections before persistence happen
//! only for unknown/inactive endpoints; everything else is recorded.

use std::collections::BTreeMap;

use chrono::{Duration, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::endpoints::store::{self as endpoints, StoreError as EndpointStoreError};
use crate::ingest::store::{self as events, NewEvent, StoreError as EventStoreError};
use crate::notify::{EventNotification, Notifier};
use crate::signature;
use crate::types::{EndpointStatus, EventStatus};
use crate::vault::{SecretVault, VaultError};

pub const DEFAULT_EVENT_TYPE: &str = "webhook.received";

/// Two calls with the same body hash on one endpoint inside this window are
/// treated as retries of the same logical event.
const DEDUP_WINDOW_MINUTES: i64 = 5;

/// Everything the HTTP layer extracted from the inbound request. Header
/// names are lowercased; `raw_body` is the exact wire bytes.
#[derive(Debug)]
pub struct InboundCall {
    pub raw_body: Vec<u8>,
    pub raw_headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: String,
    pub request_id: Option<String>,
    pub event_type: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum IngestOutcome {
    Accepted { event_id: Uuid, duplicate: bool },
    InvalidSignature { event_id: Uuid },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("webhook endpoint not found")]
    EndpointNotFound,
    #[error("webhook endpoint is not active")]
    EndpointInactive,
    #[error("endpoint secret is corrupt")]
    SecretCorrupt(#[source] VaultError),
    #[error("failed to resolve endpoint: {0:?}")]
    Lookup(EndpointStoreError),
    #[error("failed to persist event: {0:?}")]
    Persist(EventStoreError),
}

pub async fn ingest(
    pool: &SqlitePool,
    vault: &SecretVault,
    notifier: &Notifier,
    path_token: &str,
    call: InboundCall,
) -> Result<IngestOutcome, IngestError> {
    let record = endpoints::find_by_token(pool, path_token)
        .await
        .map_err(IngestError::Lookup)?
        .ok_or(IngestError::EndpointNotFound)?;
    if record.endpoint.status != EndpointStatus::Active {
        return Err(IngestError::EndpointInactive);
    }
    let endpoint = record.endpoint;

    let payload = parse_payload(call.content_type.as_deref(), &call.raw_body);
    let body_hash = if call.raw_body.is_empty() {
        None
    } else {
        Some(hex::encode(Sha256::digest(&call.raw_body)))
    };

    let is_duplicate = match (call.request_id.as_deref(), body_hash.as_deref()) {
        (Some(request_id), _) => {
            events::has_event_with_request_id(pool, endpoint.id, request_id)
                .await
                .map_err(IngestError::Persist)?
        }
        (None, Some(hash)) => {
            let cutoff = dedup_cutoff();
            events::has_recent_event_with_hash(pool, endpoint.id, hash, &cutoff)
                .await
                .map_err(IngestError::Persist)?
        }
        (None, None) => false,
    };

    // Absent signature header: the verifier is not invoked and the call is
    // accepted as-is. Preserved source behavior; see DESIGN.md.
    let signature_valid = match call.signature.as_deref() {
        None => true,
        Some(header) => {
            let secret = vault
                .decrypt(&record.encrypted_secret)
                .map_err(IngestError::SecretCorrupt)?;
            let valid = signature::verify(&secret, &call.raw_body, header);
            if !valid {
                tracing::warn!(
                    endpoint_id = %endpoint.id,
                    source_ip = call.source_ip.as_deref().unwrap_or("unknown"),
                    "invalid signature on inbound webhook"
                );
            }
            valid
        }
    };

    let (status, error_message) = if signature_valid {
        (EventStatus::Processed, None)
    } else {
        (EventStatus::Failed, Some("Invalid signature"))
    };

    let event_type = call
        .event_type
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(DEFAULT_EVENT_TYPE);

    let event_id = events::insert_event(
        pool,
        &NewEvent {
            endpoint_id: endpoint.id,
            event_type,
            payload: &payload,
            raw_body: &call.raw_body,
            raw_headers: &call.raw_headers,
            signature: call.signature.as_deref(),
            source_ip: call.source_ip.as_deref(),
            user_agent: &call.user_agent,
            content_type: call.content_type.as_deref(),
            body_hash: body_hash.as_deref(),
            request_id: call.request_id.as_deref(),
            status,
            error_message,
            is_duplicate,
        },
    )
    .await
    .map_err(IngestError::Persist)?;

    // Best-effort from here on: neither the last-used stamp nor the live
    // notification may fail the call.
    if let Err(err) = endpoints::touch_last_used(pool, endpoint.id).await {
        tracing::warn!(endpoint_id = %endpoint.id, error = ?err, "failed to update last_used_at");
    }

    match events::get_event(pool, event_id).await {
        Ok(stored) => notifier.publish(EventNotification {
            owner_id: endpoint.owner_id.clone(),
            event: stored.event,
        }),
        Err(err) => {
            tracing::debug!(event_id = %event_id, error = ?err, "skipping event notification");
        }
    }

    tracing::info!(
        event_id = %event_id,
        endpoint_id = %endpoint.id,
        event_type,
        duplicate = is_duplicate,
        signature_valid,
        "webhook event ingested"
    );

    if signature_valid {
        Ok(IngestOutcome::Accepted {
            event_id,
            duplicate: is_duplicate,
        })
    } else {
        Ok(IngestOutcome::InvalidSignature { event_id })
    }
}

/// Parse the body as JSON only when the content type says so. Parsing never
/// blocks ingestion: failures keep the raw bytes and record the error.
fn parse_payload(content_type: Option<&str>, raw_body: &[u8]) -> String {
    if raw_body.is_empty() {
        return "{}".to_string();
    }

    let is_json = content_type
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or(value)
                .trim()
                .eq_ignore_ascii_case("application/json")
        })
        .unwrap_or(false);

    if is_json {
        match serde_json::from_slice::<serde_json::Value>(raw_body) {
            Ok(value) => value.to_string(),
            Err(err) => serde_json::json!({
                "raw_data": String::from_utf8_lossy(raw_body),
                "parse_error": err.to_string(),
            })
            .to_string(),
        }
    } else {
        serde_json::json!({
            "raw_data": String::from_utf8_lossy(raw_body),
        })
        .to_string()
    }
}

fn dedup_cutoff() -> String {
    (Utc::now() - Duration::minutes(DEDUP_WINDOW_MINUTES))
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

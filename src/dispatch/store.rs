use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::dispatch::sender::DeliveryOutcome;
use crate::types::{DeliveryAttempt, DeliveryKind, DeliveryStatus};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    NotFound(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

#[derive(Debug)]
pub struct NewAttempt<'a> {
    pub kind: DeliveryKind,
    pub event_id: Option<Uuid>,
    pub endpoint_id: Uuid,
    pub target_url: &'a str,
    pub request_headers: &'a BTreeMap<String, String>,
    pub request_body: &'a [u8],
}

/// Record the attempt before the wire call so even a crash mid-send leaves
/// an auditable `pending` row.
pub async fn insert_attempt(pool: &SqlitePool, new: &NewAttempt<'_>) -> Result<Uuid, StoreError> {
    let id = Uuid::new_v4();
    let request_headers = serde_json::to_string(new.request_headers)
        .map_err(|err| StoreError::Parse(format!("invalid request headers JSON: {err}")))?;

    sqlx::query(
        r#"
        INSERT INTO delivery_attempts (
            id,
            kind,
            event_id,
            endpoint_id,
            target_url,
            request_headers,
            request_body,
            status,
            response_status,
            response_body,
            error_message,
            created_at,
            completed_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', NULL, NULL, NULL, ?, NULL)
        "#,
    )
    .bind(id.to_string())
    .bind(kind_to_str(new.kind))
    .bind(new.event_id.map(|event_id| event_id.to_string()))
    .bind(new.endpoint_id.to_string())
    .bind(new.target_url)
    .bind(&request_headers)
    .bind(new.request_body)
    .bind(now_utc())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn finalize_attempt(
    pool: &SqlitePool,
    attempt_id: Uuid,
    outcome: &DeliveryOutcome,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE delivery_attempts
        SET status = ?,
            response_status = ?,
            response_body = ?,
            error_message = ?,
            completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status_to_str(outcome.status))
    .bind(outcome.response_status)
    .bind(outcome.response_body.as_deref())
    .bind(outcome.error_message.as_deref())
    .bind(now_utc())
    .bind(attempt_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("attempt not found".to_string()));
    }

    Ok(())
}

pub async fn list_attempts_for_event(
    pool: &SqlitePool,
    event_id: Uuid,
) -> Result<Vec<DeliveryAttempt>, StoreError> {
    let rows = sqlx::query_as::<_, AttemptRow>(
        r#"
        SELECT
            id,
            kind,
            event_id,
            endpoint_id,
            target_url,
            request_headers,
            request_body,
            status,
            response_status,
            response_body,
            error_message,
            created_at,
            completed_at
        FROM delivery_attempts
        WHERE event_id = ?
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(attempt_from_row).collect()
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    kind: String,
    event_id: Option<String>,
    endpoint_id: String,
    target_url: String,
    request_headers: String,
    request_body: Vec<u8>,
    status: String,
    response_status: Option<i64>,
    response_body: Option<String>,
    error_message: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

fn attempt_from_row(row: AttemptRow) -> Result<DeliveryAttempt, StoreError> {
    let request_headers: BTreeMap<String, String> = serde_json::from_str(&row.request_headers)
        .map_err(|err| StoreError::Parse(format!("invalid request headers JSON: {err}")))?;

    let event_id = match row.event_id {
        Some(value) if value.is_empty() => None,
        Some(value) => Some(
            Uuid::parse_str(&value)
                .map_err(|err| StoreError::Parse(format!("invalid event id: {err}")))?,
        ),
        None => None,
    };

    Ok(DeliveryAttempt {
        id: Uuid::parse_str(&row.id)
            .map_err(|err| StoreError::Parse(format!("invalid attempt id: {err}")))?,
        kind: parse_kind(&row.kind)?,
        event_id,
        endpoint_id: Uuid::parse_str(&row.endpoint_id)
            .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
        target_url: row.target_url,
        request_headers,
        request_body: String::from_utf8_lossy(&row.request_body).into_owned(),
        status: parse_status(&row.status)?,
        response_status: row.response_status,
        response_body: row.response_body,
        error_message: row.error_message,
        created_at: row.created_at,
        completed_at: row.completed_at,
    })
}

fn parse_kind(kind: &str) -> Result<DeliveryKind, StoreError> {
    match kind {
        "test" => Ok(DeliveryKind::Test),
        "replay" => Ok(DeliveryKind::Replay),
        "forward" => Ok(DeliveryKind::Forward),
        other => Err(StoreError::Parse(format!("unknown attempt kind: {other}"))),
    }
}

fn kind_to_str(kind: DeliveryKind) -> &'static str {
    match kind {
        DeliveryKind::Test => "test",
        DeliveryKind::Replay => "replay",
        DeliveryKind::Forward => "forward",
    }
}

fn parse_status(status: &str) -> Result<DeliveryStatus, StoreError> {
    match status {
        "pending" => Ok(DeliveryStatus::Pending),
        "sent" => Ok(DeliveryStatus::Sent),
        "failed" => Ok(DeliveryStatus::Failed),
        other => Err(StoreError::Parse(format!("unknown attempt status: {other}"))),
    }
}

fn status_to_str(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Sent => "sent",
        DeliveryStatus::Failed => "failed",
    }
}

fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

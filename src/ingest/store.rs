use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::types::{Event, EventStatus, EventSummary};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    Conflict(String),
    NotFound(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

/// Fields supplied by the ingestion pipeline when persisting one inbound
/// call. Size and timestamps are derived here.
#[derive(Debug)]
pub struct NewEvent<'a> {
    pub endpoint_id: Uuid,
    pub event_type: &'a str,
    pub payload: &'a str,
    pub raw_body: &'a [u8],
    pub raw_headers: &'a BTreeMap<String, String>,
    pub signature: Option<&'a str>,
    pub source_ip: Option<&'a str>,
    pub user_agent: &'a str,
    pub content_type: Option<&'a str>,
    pub body_hash: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub status: EventStatus,
    pub error_message: Option<&'a str>,
    pub is_duplicate: bool,
}

/// A stored event plus its exact raw bytes. Replays and forwards send
/// `raw_bytes`; the `Event` view carries a lossy string for display.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event: Event,
    pub raw_bytes: Vec<u8>,
}

pub async fn insert_event(pool: &SqlitePool, new: &NewEvent<'_>) -> Result<Uuid, StoreError> {
    let id = Uuid::new_v4();
    let now = now_utc();
    // Terminal statuses written at ingestion carry their processed stamp
    // immediately; a processing event is finalized later, exactly once.
    let processed_at = match new.status {
        EventStatus::Processed | EventStatus::Failed | EventStatus::Forwarded => Some(now.clone()),
        EventStatus::New | EventStatus::Processing => None,
    };
    let raw_headers = serde_json::to_string(new.raw_headers)
        .map_err(|err| StoreError::Parse(format!("invalid headers JSON: {err}")))?;

    sqlx::query(
        r#"
        INSERT INTO events (
            id,
            endpoint_id,
            event_type,
            payload,
            raw_body,
            raw_headers,
            signature,
            source_ip,
            user_agent,
            content_type,
            body_hash,
            request_id,
            status,
            error_message,
            body_size,
            is_duplicate,
            created_at,
            processed_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.endpoint_id.to_string())
    .bind(new.event_type)
    .bind(new.payload)
    .bind(new.raw_body)
    .bind(&raw_headers)
    .bind(new.signature)
    .bind(new.source_ip)
    .bind(new.user_agent)
    .bind(new.content_type)
    .bind(new.body_hash)
    .bind(new.request_id)
    .bind(status_to_str(new.status))
    .bind(new.error_message)
    .bind(new.raw_body.len() as i64)
    .bind(i64::from(new.is_duplicate))
    .bind(&now)
    .bind(processed_at.as_deref())
    .execute(pool)
    .await?;

    Ok(id)
}

/// Idempotency-token dedup: any prior event on the endpoint with the same
/// request id counts, regardless of age.
pub async fn has_event_with_request_id(
    pool: &SqlitePool,
    endpoint_id: Uuid,
    request_id: &str,
) -> Result<bool, StoreError> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(1)
        FROM events
        WHERE endpoint_id = ? AND request_id = ?
        "#,
    )
    .bind(endpoint_id.to_string())
    .bind(request_id)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Content-hash dedup, bounded by the caller-supplied window cutoff.
pub async fn has_recent_event_with_hash(
    pool: &SqlitePool,
    endpoint_id: Uuid,
    body_hash: &str,
    cutoff: &str,
) -> Result<bool, StoreError> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(1)
        FROM events
        WHERE endpoint_id = ? AND body_hash = ? AND created_at >= ?
        "#,
    )
    .bind(endpoint_id.to_string())
    .bind(body_hash)
    .bind(cutoff)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

pub async fn get_event(pool: &SqlitePool, event_id: Uuid) -> Result<EventRecord, StoreError> {
    let row = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT
            id,
            endpoint_id,
            event_type,
            payload,
            raw_body,
            raw_headers,
            signature,
            source_ip,
            user_agent,
            content_type,
            body_hash,
            request_id,
            status,
            error_message,
            body_size,
            is_duplicate,
            created_at,
            processed_at
        FROM events
        WHERE id = ?
        "#,
    )
    .bind(event_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("event not found".to_string()))?;

    record_from_row(row)
}

/// Finalize a processing event. The guard on `processed_at` keeps the audit
/// record append-only: once stamped, an event is never rewritten.
pub async fn set_event_outcome(
    pool: &SqlitePool,
    event_id: Uuid,
    status: EventStatus,
    error_message: Option<&str>,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE events
        SET status = ?,
            error_message = ?,
            processed_at = ?
        WHERE id = ?
          AND processed_at IS NULL
        "#,
    )
    .bind(status_to_str(status))
    .bind(error_message)
    .bind(now_utc())
    .bind(event_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict("event already finalized".to_string()));
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct EventCursor {
    pub created_at: String,
    pub id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ListEventsParams {
    pub limit: i64,
    pub before: Option<EventCursor>,
    pub status: Option<EventStatus>,
    pub endpoint_id: Option<Uuid>,
    pub is_duplicate: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ListEventsResult {
    pub events: Vec<EventSummary>,
    pub next_before: Option<EventCursor>,
}

pub async fn list_events(
    pool: &SqlitePool,
    params: &ListEventsParams,
) -> Result<ListEventsResult, StoreError> {
    let mut query = QueryBuilder::new(
        "SELECT \
            id, \
            endpoint_id, \
            event_type, \
            status, \
            is_duplicate, \
            body_size, \
            source_ip, \
            created_at \
        FROM events \
        WHERE 1 = 1",
    );

    if let Some(status) = params.status {
        query.push(" AND status = ");
        query.push_bind(status_to_str(status));
    }

    if let Some(endpoint_id) = params.endpoint_id {
        query.push(" AND endpoint_id = ");
        query.push_bind(endpoint_id.to_string());
    }

    if let Some(is_duplicate) = params.is_duplicate {
        query.push(" AND is_duplicate = ");
        query.push_bind(i64::from(is_duplicate));
    }

    if let Some(cursor) = &params.before {
        query.push(" AND (created_at < ");
        query.push_bind(&cursor.created_at);
        query.push(" OR (created_at = ");
        query.push_bind(&cursor.created_at);
        query.push(" AND id < ");
        query.push_bind(cursor.id.to_string());
        query.push("))");
    }

    query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    query.push_bind(params.limit + 1);

    let rows: Vec<SummaryRow> = query.build_query_as().fetch_all(pool).await?;

    let has_more = rows.len() > params.limit as usize;
    let take_count = if has_more {
        params.limit as usize
    } else {
        rows.len()
    };

    let mut events = Vec::with_capacity(take_count);
    let mut last_cursor = None;

    for row in rows.into_iter().take(take_count) {
        let (summary, cursor) = summary_from_row(row)?;
        last_cursor = Some(cursor);
        events.push(summary);
    }

    let next_before = if has_more { last_cursor } else { None };

    Ok(ListEventsResult {
        events,
        next_before,
    })
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    endpoint_id: String,
    event_type: String,
    payload: String,
    raw_body: Vec<u8>,
    raw_headers: String,
    signature: Option<String>,
    source_ip: Option<String>,
    user_agent: String,
    content_type: Option<String>,
    body_hash: Option<String>,
    request_id: Option<String>,
    status: String,
    error_message: Option<String>,
    body_size: i64,
    is_duplicate: i64,
    created_at: String,
    processed_at: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    endpoint_id: String,
    event_type: String,
    status: String,
    is_duplicate: i64,
    body_size: i64,
    source_ip: Option<String>,
    created_at: String,
}

fn record_from_row(row: EventRow) -> Result<EventRecord, StoreError> {
    let raw_headers: BTreeMap<String, String> = serde_json::from_str(&row.raw_headers)
        .map_err(|err| StoreError::Parse(format!("invalid headers JSON: {err}")))?;

    let event = Event {
        id: Uuid::parse_str(&row.id)
            .map_err(|err| StoreError::Parse(format!("invalid event id: {err}")))?,
        endpoint_id: Uuid::parse_str(&row.endpoint_id)
            .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
        event_type: row.event_type,
        payload: row.payload,
        raw_body: String::from_utf8_lossy(&row.raw_body).into_owned(),
        raw_headers,
        signature: row.signature,
        source_ip: row.source_ip,
        user_agent: row.user_agent,
        content_type: row.content_type,
        body_hash: row.body_hash,
        request_id: row.request_id,
        status: parse_status(&row.status)?,
        error_message: row.error_message,
        body_size: row.body_size,
        is_duplicate: row.is_duplicate != 0,
        created_at: row.created_at,
        processed_at: row.processed_at,
    };

    Ok(EventRecord {
        event,
        raw_bytes: row.raw_body,
    })
}

fn summary_from_row(row: SummaryRow) -> Result<(EventSummary, EventCursor), StoreError> {
    let event_id = Uuid::parse_str(&row.id)
        .map_err(|err| StoreError::Parse(format!("invalid event id: {err}")))?;

    let summary = EventSummary {
        id: event_id,
        endpoint_id: Uuid::parse_str(&row.endpoint_id)
            .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
        event_type: row.event_type,
        status: parse_status(&row.status)?,
        is_duplicate: row.is_duplicate != 0,
        body_size: row.body_size,
        source_ip: row.source_ip,
        created_at: row.created_at.clone(),
    };

    Ok((
        summary,
        EventCursor {
            created_at: row.created_at,
            id: event_id,
        },
    ))
}

fn parse_status(status: &str) -> Result<EventStatus, StoreError> {
    match status {
        "new" => Ok(EventStatus::New),
        "processing" => Ok(EventStatus::Processing),
        "processed" => Ok(EventStatus::Processed),
        "failed" => Ok(EventStatus::Failed),
        "forwarded" => Ok(EventStatus::Forwarded),
        other => Err(StoreError::Parse(format!("unknown status: {other}"))),
    }
}

pub(crate) fn status_to_str(status: EventStatus) -> &'static str {
    match status {
        EventStatus::New => "new",
        EventStatus::Processing => "processing",
        EventStatus::Processed => "processed",
        EventStatus::Failed => "failed",
        EventStatus::Forwarded => "forwarded",
    }
}

pub(crate) fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

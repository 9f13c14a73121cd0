use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::{Endpoint, EndpointStatus};
use crate::vault::{self, SecretVault, VaultError};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    NotFound(String),
    Parse(String),
    Secret(VaultError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

impl From<VaultError> for StoreError {
    fn from(err: VaultError) -> Self {
        Self::Secret(err)
    }
}

/// An endpoint plus its encrypted secret blob. The blob stays inside the
/// store/pipeline layers; API types never carry it.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub endpoint: Endpoint,
    pub encrypted_secret: String,
}

/// Create an endpoint with a fresh path token and secret. Returns the
/// endpoint and the plaintext secret; this is the only time the plaintext
/// leaves the vault without an explicit reveal.
pub async fn create_endpoint(
    pool: &SqlitePool,
    secret_vault: &SecretVault,
    owner_id: &str,
    name: &str,
    description: &str,
) -> Result<(Endpoint, String), StoreError> {
    let id = Uuid::new_v4();
    let path_token = vault::generate_token();
    let secret = secret_vault.generate_secret();
    let encrypted_secret = secret_vault.encrypt(&secret)?;
    let now = now_utc();

    sqlx::query(
        r#"
        INSERT INTO endpoints (
            id,
            owner_id,
            name,
            description,
            path_token,
            encrypted_secret,
            status,
            created_at,
            updated_at,
            last_used_at
        )
        VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?, NULL)
        "#,
    )
    .bind(id.to_string())
    .bind(owner_id)
    .bind(name)
    .bind(description)
    .bind(&path_token)
    .bind(&encrypted_secret)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let endpoint = Endpoint {
        id,
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        path_token,
        status: EndpointStatus::Active,
        created_at: now.clone(),
        updated_at: now,
        last_used_at: None,
    };

    Ok((endpoint, secret))
}

pub async fn find_by_token(
    pool: &SqlitePool,
    path_token: &str,
) -> Result<Option<EndpointRecord>, StoreError> {
    let row = sqlx::query_as::<_, EndpointRow>(
        r#"
        SELECT
            id,
            owner_id,
            name,
            description,
            path_token,
            encrypted_secret,
            status,
            created_at,
            updated_at,
            last_used_at
        FROM endpoints
        WHERE path_token = ?
        "#,
    )
    .bind(path_token)
    .fetch_optional(pool)
    .await?;

    row.map(record_from_row).transpose()
}

pub async fn get_endpoint(
    pool: &SqlitePool,
    endpoint_id: Uuid,
) -> Result<EndpointRecord, StoreError> {
    let row = sqlx::query_as::<_, EndpointRow>(
        r#"
        SELECT
            id,
            owner_id,
            name,
            description,
            path_token,
            encrypted_secret,
            status,
            created_at,
            updated_at,
            last_used_at
        FROM endpoints
        WHERE id = ?
        "#,
    )
    .bind(endpoint_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("endpoint not found".to_string()))?;

    record_from_row(row)
}

pub async fn list_endpoints(pool: &SqlitePool) -> Result<Vec<Endpoint>, StoreError> {
    let rows = sqlx::query_as::<_, EndpointRow>(
        r#"
        SELECT
            id,
            owner_id,
            name,
            description,
            path_token,
            encrypted_secret,
            status,
            created_at,
            updated_at,
            last_used_at
        FROM endpoints
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| record_from_row(row).map(|record| record.endpoint))
        .collect()
}

/// Generate and store a new secret for the endpoint. The previous secret is
/// gone for good; the returned plaintext is the caller's only chance to
/// capture it.
pub async fn rotate_secret(
    pool: &SqlitePool,
    secret_vault: &SecretVault,
    endpoint_id: Uuid,
) -> Result<String, StoreError> {
    let secret = secret_vault.generate_secret();
    let encrypted_secret = secret_vault.encrypt(&secret)?;

    let result = sqlx::query(
        r#"
        UPDATE endpoints
        SET encrypted_secret = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&encrypted_secret)
    .bind(now_utc())
    .bind(endpoint_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("endpoint not found".to_string()));
    }

    Ok(secret)
}

pub async fn touch_last_used(pool: &SqlitePool, endpoint_id: Uuid) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE endpoints
        SET last_used_at = ?
        WHERE id = ?
        "#,
    )
    .bind(now_utc())
    .bind(endpoint_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct EndpointRow {
    id: String,
    owner_id: String,
    name: String,
    description: String,
    path_token: String,
    encrypted_secret: String,
    status: String,
    created_at: String,
    updated_at: String,
    last_used_at: Option<String>,
}

fn record_from_row(row: EndpointRow) -> Result<EndpointRecord, StoreError> {
    let endpoint = Endpoint {
        id: Uuid::parse_str(&row.id)
            .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
        owner_id: row.owner_id,
        name: row.name,
        description: row.description,
        path_token: row.path_token,
        status: parse_status(&row.status)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
        last_used_at: row.last_used_at,
    };

    Ok(EndpointRecord {
        endpoint,
        encrypted_secret: row.encrypted_secret,
    })
}

fn parse_status(status: &str) -> Result<EndpointStatus, StoreError> {
    match status {
        "active" => Ok(EndpointStatus::Active),
        "paused" => Ok(EndpointStatus::Paused),
        "disabled" => Ok(EndpointStatus::Disabled),
        other => Err(StoreError::Parse(format!("unknown endpoint status: {other}"))),
    }
}

fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

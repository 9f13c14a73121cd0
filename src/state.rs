use sqlx::SqlitePool;

use crate::{dispatch::DeliveryConfig, notify::Notifier, vault::SecretVault};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub vault: SecretVault,
    pub delivery: DeliveryConfig,
    pub http: reqwest::Client,
    pub notifier: Notifier,
    /// Bearer token guarding the management API. `None` disables the guard
    /// (local development).
    pub api_token: Option<String>,
    /// Externally reachable base URL, used to address an endpoint's own
    /// webhook URL for test sends.
    pub public_base_url: String,
}

impl AppState {
    pub fn webhook_url(&self, path_token: &str) -> String {
        format!(
            "{}/webhook/{path_token}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

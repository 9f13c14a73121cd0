use relay::{
    dispatch::DeliveryConfig,
    notify::{self, Notifier},
    router,
    state::AppState,
    vault::SecretVault,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:relay.db".to_string());
    let bind_addr =
        std::env::var("RELAY_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());
    let public_base_url = std::env::var("RELAY_PUBLIC_BASE_URL")
        .unwrap_or_else(|_| format!("http://{bind_addr}"));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&pool)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let vault = SecretVault::from_env()?;
    let api_token = std::env::var("RELAY_API_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());
    let notify_buffer = std::env::var("RELAY_NOTIFY_BUFFER")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(256);

    let (notifier, notify_rx) = Notifier::channel(notify_buffer);
    tokio::spawn(notify::drain(notify_rx));

    let state = AppState {
        pool,
        vault,
        delivery: DeliveryConfig::from_env(),
        http: reqwest::Client::builder().build()?,
        notifier,
        api_token,
        public_base_url,
    };

    let app = router::build(state);

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "webhook relay listening");
    axum::serve(listener, app).await?;

    Ok(())
}

use std::sync::Arc;

use anyhow::{Context, Result};
use scrimhub::{
    auth,
    config::Config,
    identity::{IdentityToolkit, MemoryAuthority},
    store, users, AppState, Identity,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,scrimhub=debug,sqlx=warn")),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = store::connect(&config.database_url, 16)
        .await
        .context("failed to open database")?;

    let client_secret = std::fs::read_to_string(&config.client_secret_path)
        .with_context(|| format!("failed to read {}", config.client_secret_path))?;
    let clients = auth::Clients::from_json(serde_json::from_str(&client_secret)?, &config.public_url)?;

    let identity: Identity = match &config.firebase {
        Some(firebase) => {
            tracing::info!(project_id = %firebase.project_id, "using Identity Toolkit authority");
            Arc::new(IdentityToolkit::new(firebase.project_id.clone(), firebase.access_token.clone()))
        }
        None => {
            tracing::warn!("no Firebase credentials, accounts live in memory only");
            Arc::new(match &config.bootstrap_admin_uid {
                Some(uid) => MemoryAuthority::with_admin(uid),
                None => MemoryAuthority::new(),
            })
        }
    };

    users::spawn_ban_sweep(db_pool.clone(), identity.clone(), config.ban_sweep_interval);

    let app = scrimhub::app(AppState { db_pool, clients, identity }, config.session_inactivity);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub mod appresult;
pub mod auth;
pub mod caller;
pub mod config;
pub mod identity;
pub mod inbox;
pub mod rooms;
pub mod scrims;
pub mod session;
pub mod store;
pub mod teams;
pub mod users;

use axum::{extract::FromRef, Router};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};
pub use caller::{CallerIdentity, Claims, Role};
pub use identity::{Identity, IdentityAuthority};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub identity: Identity,
}

/// Body of every mutation that has nothing more to say than how it went.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Ack {
        Ack { success: true, message: message.into() }
    }
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }
}

pub fn app(app_state: AppState, session_inactivity: time::Duration) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(session_inactivity));

    Router::new()
        .merge(auth::router())
        .nest("/rooms", rooms::router())
        .nest("/scrims", scrims::router())
        .nest("/teams", teams::router())
        .nest("/users", users::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

use axum::{routing::get, Router};
use rand::seq::IndexedRandom;
use sqlx::SqlitePool;

use crate::{store, AppResult, AppState};

mod clients;
mod login;
mod lockin;
mod logout;

pub use clients::{ClientProvider, Clients};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

/// Creates the `users/{uid}` profile on first sign-in. Existing profiles are
/// left alone; their claim mirror is owned by the sync operations.
pub(crate) async fn ensure_profile(db_pool: &SqlitePool, uid: &str, display_name: Option<String>) -> AppResult<bool> {
    let display_name = display_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(random_alias);

    let created = sqlx::query("INSERT OR IGNORE INTO users (uid, display_name, created_at) VALUES (?, ?, ?)")
        .bind(uid)
        .bind(&display_name)
        .bind(store::now_millis())
        .execute(db_pool)
        .await?
        .rows_affected() == 1;

    if created {
        tracing::info!(%uid, %display_name, "created user profile");
    }
    Ok(created)
}

fn random_alias() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Lucky",
    ];
    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl",
        "Falcon", "Hawk", "Shark", "Panda", "Phoenix", "Griffin", "Viper", "Raven",
    ];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).unwrap_or(&"Nameless"),
        nouns.choose(&mut rng).unwrap_or(&"Player"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn profile_created_once() {
        let db_pool = store::in_memory().await.unwrap();

        assert!(ensure_profile(&db_pool, "u1", Some("Ana".to_owned())).await.unwrap());
        assert!(!ensure_profile(&db_pool, "u1", Some("Other".to_owned())).await.unwrap());

        let (name,): (String,) = sqlx::query_as("SELECT display_name FROM users WHERE uid = 'u1'")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(name, "Ana");
    }

    #[tokio::test]
    async fn blank_names_get_an_alias() {
        let db_pool = store::in_memory().await.unwrap();
        ensure_profile(&db_pool, "u2", Some("  ".to_owned())).await.unwrap();

        let (name,): (String,) = sqlx::query_as("SELECT display_name FROM users WHERE uid = 'u2'")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(name.split(' ').count(), 2);
    }
}

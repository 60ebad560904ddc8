//! Shared setup for the integration tests: a migrated SQLite pool, an
//! in-memory identity authority, and helpers to seed users and teams.

#![allow(dead_code)]

use std::{path::Path, sync::Arc};

use scrimhub::{
    identity::MemoryAuthority, store, teams, AppResult, CallerIdentity, IdentityAuthority, Role,
};
use sqlx::SqlitePool;

pub struct TestHarness {
    pub db_pool: SqlitePool,
    pub authority: Arc<MemoryAuthority>,
}

impl TestHarness {
    pub async fn new() -> TestHarness {
        init_tracing();
        TestHarness {
            db_pool: store::in_memory().await.expect("in-memory database"),
            authority: Arc::new(MemoryAuthority::new()),
        }
    }

    /// A WAL database on disk, for tests that need real concurrent writers.
    pub async fn on_disk(dir: &Path) -> TestHarness {
        init_tracing();
        let url = format!("sqlite://{}", dir.join("scrimhub.db").display());
        TestHarness {
            db_pool: store::connect(&url, 8).await.expect("on-disk database"),
            authority: Arc::new(MemoryAuthority::new()),
        }
    }

    pub fn identity(&self) -> &dyn IdentityAuthority {
        self.authority.as_ref()
    }

    /// Registers `uid` with the authority and gives them a profile row.
    pub async fn user(&self, uid: &str, role: Option<Role>) -> CallerIdentity {
        self.authority.insert(uid, role);
        sqlx::query("INSERT OR IGNORE INTO users (uid, display_name, created_at) VALUES (?, ?, ?)")
            .bind(uid)
            .bind(uid.to_uppercase())
            .bind(store::now_millis())
            .execute(&self.db_pool)
            .await
            .expect("profile row");
        self.caller(uid)
    }

    /// The caller as the authority sees `uid` right now.
    pub fn caller(&self, uid: &str) -> CallerIdentity {
        let account = self.authority.account(uid).expect("known account");
        CallerIdentity::from_account(uid, &account)
    }

    /// A team founded by `founder`.
    pub async fn team(&self, founder: &CallerIdentity, name: &str) -> String {
        teams::create_team(
            &self.db_pool,
            founder,
            teams::NewTeam { name: name.to_owned(), game: String::new() },
        )
            .await
            .expect("team created")
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.db_pool).await.expect("count query")
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Unwraps the error of a call expected to fail.
pub fn err_of<T: std::fmt::Debug>(result: AppResult<T>) -> scrimhub::AppError {
    result.expect_err("call should have failed")
}

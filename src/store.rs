use std::{future::Future, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use time::OffsetDateTime;

use crate::AppResult;

pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Whole read-validate-write attempts before a contended transaction gives up.
pub const MAX_TX_ATTEMPTS: usize = 5;
/// Attempts for commutative writes (join, message append).
pub const MAX_TRANSIENT_ATTEMPTS: usize = 3;

pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {database_url}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    MIGRATOR.run(&db_pool).await?;
    Ok(db_pool)
}

/// Single-connection in-memory database. The connection is never recycled,
/// otherwise the database would vanish with it.
pub async fn in_memory() -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    MIGRATOR.run(&db_pool).await?;
    Ok(db_pool)
}

pub fn now_millis() -> i64 {
    millis_of(OffsetDateTime::now_utc())
}

pub fn millis_of(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn datetime_of(millis: i64) -> AppResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)?)
}

pub fn new_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Result of one optimistic attempt. `Conflict` means a conditional write
/// matched no row because someone changed the document after we read it.
pub enum Attempt<T> {
    Done(T),
    Conflict,
}

/// Runs `attempt` until it commits. Every retry starts from scratch, so all
/// preconditions are read and checked again against the current state.
pub async fn optimistic<T, F, Fut>(what: &str, mut attempt: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<Attempt<T>>>,
{
    for n in 1..=MAX_TX_ATTEMPTS {
        match attempt().await {
            Ok(Attempt::Done(value)) => return Ok(value),
            Ok(Attempt::Conflict) => tracing::debug!(what, attempt = n, "write conflict, retrying"),
            Err(err) if err.is_contention() => tracing::debug!(what, attempt = n, %err, "store contention, retrying"),
            Err(err) => return Err(err),
        }
    }

    Err(anyhow!("{what}: gave up after {MAX_TX_ATTEMPTS} conflicting attempts").into())
}

/// Retries an idempotent write on store contention with a short backoff.
pub async fn retry_transient<T, F, Fut>(what: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut n = 1;
    loop {
        match op().await {
            Err(err) if err.is_contention() && n < MAX_TRANSIENT_ATTEMPTS => {
                tracing::debug!(what, attempt = n, %err, "transient store error, retrying");
                tokio::time::sleep(Duration::from_millis(25 * n as u64)).await;
                n += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::AppError;

    #[tokio::test]
    async fn optimistic_reruns_until_done() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let value = optimistic("test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(Attempt::Conflict)
            } else {
                Ok(Attempt::Done(7))
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn optimistic_gives_up() {
        let err = optimistic::<(), _, _>("test", || async { Ok(Attempt::Conflict) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn optimistic_does_not_retry_verdicts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let err = optimistic::<(), _, _>("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::FailedPrecondition("closed".to_owned()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::FailedPrecondition(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_retry_is_bounded() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let err = retry_transient::<(), _, _>("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::from(sqlx::Error::PoolTimedOut))
        })
        .await
        .unwrap_err();

        assert!(err.is_contention());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_TRANSIENT_ATTEMPTS);
    }

    #[test]
    fn millis_round_trip_through_datetime() {
        let at = datetime_of(1_700_000_000_123).unwrap();
        assert_eq!(millis_of(at), 1_700_000_000_123);
    }
}

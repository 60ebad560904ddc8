use std::time::Duration;

use sqlx::SqlitePool;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::{caller::keys, identity::{Identity, IdentityAuthority}, store, AppResult};

use super::{status::apply_ban, sync::mirror_account, BanState};

/// Lifts every temporary ban whose expiry has passed. The profile's
/// `ban_until` only nominates candidates; the authority's claim decides.
/// A candidate that fails is logged and left for the next sweep. Returns how
/// many bans were lifted.
pub async fn sweep_expired_bans(db_pool: &SqlitePool, identity: &dyn IdentityAuthority) -> AppResult<usize> {
    let now = OffsetDateTime::now_utc();
    let candidates: Vec<String> = sqlx::query_scalar(
        "SELECT uid FROM users WHERE disabled = 1 AND ban_until IS NOT NULL AND ban_until <= ? ORDER BY ban_until"
    )
        .bind(store::millis_of(now))
        .fetch_all(db_pool)
        .await?;

    let mut lifted = 0;
    for uid in &candidates {
        match lift_if_expired(db_pool, identity, uid, now).await {
            Ok(true) => lifted += 1,
            Ok(false) => {}
            Err(err) => tracing::warn!(%uid, error = %err, "could not lift ban, retrying next sweep"),
        }
    }

    Ok(lifted)
}

async fn lift_if_expired(
    db_pool: &SqlitePool,
    identity: &dyn IdentityAuthority,
    uid: &str,
    now: OffsetDateTime,
) -> AppResult<bool> {
    let Some(account) = identity.lookup(uid).await? else {
        tracing::warn!(%uid, "banned profile has no account, skipping");
        return Ok(false);
    };

    let ban = BanState::of_account(&account);
    if !ban.has_expired(now) {
        // the profile is stale, the claim says otherwise
        tracing::debug!(%uid, ?ban, "ban not expired per claims, refreshing profile");
        mirror_account(db_pool, uid, &account).await?;
        return Ok(false);
    }

    // a ban set after the read above changes these claims and wins
    if apply_ban(db_pool, identity, uid, BanState::Active, &account, &[keys::DISABLED, keys::BAN_UNTIL])
        .await?
        .is_none()
    {
        tracing::info!(%uid, "ban changed during sweep, keeping it");
        if let Some(fresh) = identity.lookup(uid).await? {
            mirror_account(db_pool, uid, &fresh).await?;
        }
        return Ok(false);
    }

    tracing::info!(%uid, "ban expired and lifted");
    Ok(true)
}

/// Runs [`sweep_expired_bans`] every `period` until the runtime shuts down.
pub fn spawn_ban_sweep(db_pool: SqlitePool, identity: Identity, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match sweep_expired_bans(&db_pool, identity.as_ref()).await {
                Ok(0) => tracing::debug!("ban sweep found nothing to lift"),
                Ok(lifted) => tracing::info!(lifted, "ban sweep finished"),
                Err(err) => tracing::error!(error = %err, "ban sweep failed"),
            }
        }
    })
}

use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use sqlx::{sqlite::SqliteQueryResult, SqlitePool};

use crate::{
    auth, caller::Claims, identity::{Account, Identity, IdentityAuthority},
    store, AppResult, CallerIdentity,
};

use super::{require_uid, target_account, BanState};

/// How a two-step change landed. The claim is always written by the time a
/// report exists; `display_synced` says whether the `users` row caught up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub display_synced: bool,
}

impl SyncReport {
    pub fn synced(message: impl Into<String>) -> SyncReport {
        SyncReport { success: true, message: message.into(), display_synced: true }
    }

    pub fn lagging(message: impl Into<String>) -> SyncReport {
        SyncReport {
            success: true,
            message: format!("{} Authorization updated; display may lag.", message.into()),
            display_synced: false,
        }
    }
}

/// Turns the outcome of the store step into a report. The claim already
/// changed, so a failed store write is logged and tolerated, never undone.
pub(crate) fn store_step(
    uid: &str,
    what: &str,
    result: Result<SqliteQueryResult, sqlx::Error>,
    message: String,
) -> SyncReport {
    match result {
        Ok(done) if done.rows_affected() > 0 => SyncReport::synced(message),
        Ok(_) => {
            tracing::warn!(%uid, what, "claim updated but user has no profile row");
            SyncReport::lagging(message)
        }
        Err(err) => {
            tracing::warn!(%uid, what, error = %err, "claim updated but profile write failed");
            SyncReport::lagging(message)
        }
    }
}

/// Overwrites the profile's claim mirror with what `account` says.
pub(crate) async fn mirror_account(db_pool: &SqlitePool, uid: &str, account: &Account) -> Result<SqliteQueryResult, sqlx::Error> {
    let claims = Claims::from_custom(&account.custom_claims, false);
    let ban = BanState::of_account(account);

    sqlx::query(
        "UPDATE users SET role = ?, is_certified_streamer = ?, disabled = ?, ban_until = ?, claims_refreshed_at = ? \
         WHERE uid = ?"
    )
        .bind(claims.role.map(|role| role.as_str()))
        .bind(claims.is_certified_streamer)
        .bind(ban.is_disabled())
        .bind(ban.until().map(store::millis_of))
        .bind(store::now_millis())
        .bind(uid)
        .execute(db_pool)
        .await
}

/// Rebuilds a user's profile mirror from the authority. Safe to repeat; this
/// is how a lagging display is repaired.
pub async fn reconcile_user(
    db_pool: &SqlitePool,
    identity: &dyn IdentityAuthority,
    caller: &CallerIdentity,
    uid: &str,
) -> AppResult<SyncReport> {
    let moderator = caller.require_mod_or_admin()?;
    require_uid(uid)?;
    let account = target_account(identity, uid).await?;

    auth::ensure_profile(db_pool, uid, None).await?;
    mirror_account(db_pool, uid, &account).await?;

    tracing::info!(%uid, by = %moderator.id, "user profile reconciled with claims");
    Ok(SyncReport::synced(format!("User {uid} reconciled.")))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn reconcile(
    State(db_pool): State<SqlitePool>,
    State(identity): State<Identity>,
    Path(uid): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<SyncReport>> {
    Ok(Json(reconcile_user(&db_pool, identity.as_ref(), &caller, &uid).await?))
}

use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{
    caller::keys,
    identity::{Account, Identity, IdentityAuthority},
    store, AppError, AppResult, CallerIdentity, Claims, Role,
};

use super::{require_uid, sync::{self, SyncReport}, target_account, BanState};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusChange {
    pub disabled: bool,
    /// Hours. Absent means a permanent ban; ignored when unbanning.
    pub duration: Option<f64>,
}

/// Bans or unbans `uid`. Moderators may not act on moderators or admins and
/// nobody may act on themselves.
pub async fn update_user_status(
    db_pool: &SqlitePool,
    identity: &dyn IdentityAuthority,
    caller: &CallerIdentity,
    uid: &str,
    change: StatusChange,
) -> AppResult<SyncReport> {
    let moderator = caller.require_mod_or_admin()?;
    require_uid(uid)?;
    let ban = if change.disabled {
        BanState::ban(change.duration, OffsetDateTime::now_utc())?
    } else {
        BanState::Active
    };
    if moderator.id == uid {
        return Err(AppError::FailedPrecondition("You cannot change your own status.".to_owned()));
    }

    let account = target_account(identity, uid).await?;
    let target_role = Claims::from_custom(&account.custom_claims, false).role;
    if moderator.has_role(Role::Moderator) && target_role.is_some_and(|role| role.is_platform_staff()) {
        return Err(AppError::PermissionDenied("Moderators cannot ban other moderators or admins.".to_owned()));
    }

    // the escalation check above holds only while the target's role does
    let Some(report) = apply_ban(db_pool, identity, uid, ban, &account, &[keys::ROLE]).await? else {
        return Err(AppError::FailedPrecondition("The user's role changed meanwhile; try again.".to_owned()));
    };
    tracing::info!(%uid, action = ban.action(), until = ?ban.until(), by = %moderator.id, "user status changed");
    Ok(report)
}

/// Writes `ban` to the authority, then mirrors it to the profile. The claim
/// write only lands while every `guarded` claim still has the value it had
/// in `read`; otherwise nothing changes and `None` comes back.
pub(crate) async fn apply_ban(
    db_pool: &SqlitePool,
    identity: &dyn IdentityAuthority,
    uid: &str,
    ban: BanState,
    read: &Account,
    guarded: &[&str],
) -> AppResult<Option<SyncReport>> {
    let patch = guarded
        .iter()
        .fold(ban.claim_patch(), |patch, key| patch.expecting(key, read));
    if identity.merge_claims(uid, patch).await?.is_none() {
        return Ok(None);
    }

    let result = sqlx::query("UPDATE users SET disabled = ?, ban_until = ?, claims_refreshed_at = ? WHERE uid = ?")
        .bind(ban.is_disabled())
        .bind(ban.until().map(store::millis_of))
        .bind(store::now_millis())
        .bind(uid)
        .execute(db_pool)
        .await;
    Ok(Some(sync::store_step(uid, "status", result, format!("User {} successfully.", ban.action()))))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_status(
    State(db_pool): State<SqlitePool>,
    State(identity): State<Identity>,
    Path(uid): Path<String>,
    caller: CallerIdentity,
    Json(change): Json<StatusChange>,
) -> AppResult<Json<SyncReport>> {
    Ok(Json(update_user_status(&db_pool, identity.as_ref(), &caller, &uid, change).await?))
}

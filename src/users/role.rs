use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{
    caller::keys,
    identity::{ClaimPatch, Identity, IdentityAuthority},
    store, AppError, AppResult, CallerIdentity, Role,
};

use super::{merge, require_uid, sync::{self, SyncReport}};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RoleQuery {
    role: String,
}

/// Assigns a platform role. Admins only.
pub async fn update_user_role(
    db_pool: &SqlitePool,
    identity: &dyn IdentityAuthority,
    caller: &CallerIdentity,
    uid: &str,
    role: &str,
) -> AppResult<SyncReport> {
    let admin = caller.require_admin()?;
    require_uid(uid)?;
    let role: Role = role
        .parse()
        .map_err(|_| AppError::InvalidArgument(format!("{role:?} is not a valid role.")))?;

    merge(identity, uid, ClaimPatch::new().with(keys::ROLE, Value::from(role.as_str()))).await?;
    tracing::info!(%uid, %role, by = %admin.id, "role claim updated");

    let result = sqlx::query("UPDATE users SET role = ?, claims_refreshed_at = ? WHERE uid = ?")
        .bind(role.as_str())
        .bind(store::now_millis())
        .bind(uid)
        .execute(db_pool)
        .await;
    Ok(sync::store_step(uid, "role", result, format!("Role \"{role}\" assigned to user {uid}.")))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_role(
    State(db_pool): State<SqlitePool>,
    State(identity): State<Identity>,
    Path(uid): Path<String>,
    caller: CallerIdentity,
    Json(RoleQuery { role }): Json<RoleQuery>,
) -> AppResult<Json<SyncReport>> {
    Ok(Json(update_user_role(&db_pool, identity.as_ref(), &caller, &uid, &role).await?))
}

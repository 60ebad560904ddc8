use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{
    caller::keys,
    identity::{ClaimPatch, Identity, IdentityAuthority},
    store, AppResult, CallerIdentity,
};

use super::{merge, require_uid, sync::{self, SyncReport}};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct CertificationQuery {
    is_certified: bool,
}

pub async fn update_user_certification(
    db_pool: &SqlitePool,
    identity: &dyn IdentityAuthority,
    caller: &CallerIdentity,
    uid: &str,
    is_certified: bool,
) -> AppResult<SyncReport> {
    let moderator = caller.require_mod_or_admin()?;
    require_uid(uid)?;

    merge(identity, uid, ClaimPatch::new().with(keys::CERTIFIED, Value::Bool(is_certified))).await?;
    tracing::info!(%uid, is_certified, by = %moderator.id, "certification claim updated");

    let result = sqlx::query("UPDATE users SET is_certified_streamer = ?, claims_refreshed_at = ? WHERE uid = ?")
        .bind(is_certified)
        .bind(store::now_millis())
        .bind(uid)
        .execute(db_pool)
        .await;
    Ok(sync::store_step(uid, "certification", result, "User certification status updated successfully.".to_owned()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_certification(
    State(db_pool): State<SqlitePool>,
    State(identity): State<Identity>,
    Path(uid): Path<String>,
    caller: CallerIdentity,
    Json(CertificationQuery { is_certified }): Json<CertificationQuery>,
) -> AppResult<Json<SyncReport>> {
    Ok(Json(update_user_certification(&db_pool, identity.as_ref(), &caller, &uid, is_certified).await?))
}

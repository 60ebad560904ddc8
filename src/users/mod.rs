use axum::{routing::{post, put}, Router};

use anyhow::anyhow;

use crate::{
    identity::{no_account, Account, ClaimPatch, IdentityAuthority},
    AppError, AppResult, AppState,
};

mod ban;
mod certification;
mod role;
mod status;
mod sweep;
mod sync;

pub use ban::BanState;
pub use certification::update_user_certification;
pub use role::update_user_role;
pub use status::{update_user_status, StatusChange};
pub use sweep::{spawn_ban_sweep, sweep_expired_bans};
pub use sync::{reconcile_user, SyncReport};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{uid}/role", put(role::set_role))
        .route("/{uid}/status", put(status::set_status))
        .route("/{uid}/certification", put(certification::set_certification))
        .route("/{uid}/reconcile", post(sync::reconcile))
}

fn require_uid(uid: &str) -> AppResult<()> {
    if uid.trim().is_empty() {
        return Err(AppError::InvalidArgument("User ID is required.".to_owned()));
    }
    Ok(())
}

/// The target's account as the authority currently has it.
async fn target_account(identity: &dyn IdentityAuthority, uid: &str) -> AppResult<Account> {
    identity
        .lookup(uid)
        .await?
        .ok_or_else(|| no_account(uid))
}

/// Merges a patch that carries no expectations, so it always lands.
async fn merge(identity: &dyn IdentityAuthority, uid: &str, patch: ClaimPatch) -> AppResult<Account> {
    identity
        .merge_claims(uid, patch)
        .await?
        .ok_or_else(|| AppError::from(anyhow!("claim merge for {uid} was refused")))
}

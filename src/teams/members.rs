use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{Ack, AppError, AppResult, CallerIdentity};

use super::{require_staff, require_team, role_in_team, TeamRole};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct AddMemberQuery {
    uid: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetRoleQuery {
    role: TeamRole,
}

/// Staff add players to the roster. Adding someone twice keeps their role.
pub async fn add_member(db_pool: &SqlitePool, caller: &CallerIdentity, team_id: &str, uid: &str) -> AppResult<()> {
    let user = caller.authenticated()?;
    if team_id.trim().is_empty() || uid.trim().is_empty() {
        return Err(AppError::InvalidArgument("Team ID and user ID are required.".to_owned()));
    }

    let mut tx = db_pool.begin().await?;
    require_staff(&mut tx, team_id, &user.id).await?;
    sqlx::query("INSERT OR IGNORE INTO team_members (team_id, user_id, role) VALUES (?, ?, 'member')")
        .bind(team_id)
        .bind(uid)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(%team_id, %uid, by = %user.id, "team member added");
    Ok(())
}

/// Founder-only promotion to coach or demotion to member.
pub async fn set_member_role(db_pool: &SqlitePool, caller: &CallerIdentity, team_id: &str, uid: &str, role: TeamRole) -> AppResult<()> {
    let user = caller.authenticated()?;
    if role == TeamRole::Founder {
        return Err(AppError::InvalidArgument("Role must be coach or member.".to_owned()));
    }

    let mut tx = db_pool.begin().await?;
    require_team(&mut tx, team_id).await?;
    if role_in_team(&mut tx, team_id, &user.id).await? != Some(TeamRole::Founder) {
        return Err(AppError::PermissionDenied("Only the team founder can change roles.".to_owned()));
    }
    match role_in_team(&mut tx, team_id, uid).await? {
        None => return Err(AppError::NotFound(format!("{uid} is not a member of this team."))),
        Some(TeamRole::Founder) => {
            return Err(AppError::FailedPrecondition("The founder's role cannot be changed.".to_owned()));
        }
        Some(_) => {}
    }
    sqlx::query("UPDATE team_members SET role = ? WHERE team_id = ? AND user_id = ?")
        .bind(role.as_str())
        .bind(team_id)
        .bind(uid)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(%team_id, %uid, %role, "team member role changed");
    Ok(())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn add(
    State(db_pool): State<SqlitePool>,
    Path(team_id): Path<String>,
    caller: CallerIdentity,
    Json(AddMemberQuery { uid }): Json<AddMemberQuery>,
) -> AppResult<Json<Ack>> {
    add_member(&db_pool, &caller, &team_id, &uid).await?;
    Ok(Json(Ack::new("Member added.")))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_role(
    State(db_pool): State<SqlitePool>,
    Path((team_id, uid)): Path<(String, String)>,
    caller: CallerIdentity,
    Json(SetRoleQuery { role }): Json<SetRoleQuery>,
) -> AppResult<Json<Ack>> {
    set_member_role(&db_pool, &caller, &team_id, &uid, role).await?;
    Ok(Json(Ack::new(format!("Role {role} assigned."))))
}

use std::{fmt, str::FromStr};

use axum::{routing::{get, post, put}, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::{AppError, AppResult, AppState};

mod members;
mod new;

pub use members::{add_member, set_member_role};
pub use new::{create_team, NewTeam};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(new::new_team))
        .route("/{team_id}/members", post(members::add))
        .route("/{team_id}/members/{uid}", put(members::set_role))
        .route("/{team_id}/scrims", get(crate::scrims::team_scrims))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Founder,
    Coach,
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Founder => "founder",
            TeamRole::Coach => "coach",
            TeamRole::Member => "member",
        }
    }

    /// Founders and coaches act on the team's behalf.
    pub fn is_staff(&self) -> bool {
        matches!(self, TeamRole::Founder | TeamRole::Coach)
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "founder" => Ok(TeamRole::Founder),
            "coach" => Ok(TeamRole::Coach),
            "member" => Ok(TeamRole::Member),
            _ => Err(format!("unknown team role {s:?}").into()),
        }
    }
}

pub(crate) async fn role_in_team(conn: &mut SqliteConnection, team_id: &str, uid: &str) -> AppResult<Option<TeamRole>> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM team_members WHERE team_id = ? AND user_id = ?")
        .bind(team_id)
        .bind(uid)
        .fetch_optional(conn)
        .await?;
    role.map(|role| role.parse()).transpose()
}

pub(crate) async fn require_team(conn: &mut SqliteConnection, team_id: &str) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM teams WHERE id = ?)")
        .bind(team_id)
        .fetch_one(conn)
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("Team {team_id} does not exist.")));
    }
    Ok(())
}

/// Fails unless `uid` is a founder or coach of `team_id`.
pub(crate) async fn require_staff(conn: &mut SqliteConnection, team_id: &str, uid: &str) -> AppResult<()> {
    match role_in_team(&mut *conn, team_id, uid).await? {
        Some(role) if role.is_staff() => Ok(()),
        _ => {
            require_team(conn, team_id).await?;
            Err(AppError::PermissionDenied(format!("Only staff of team {team_id} may do this.")))
        }
    }
}

/// Staff of `team_id`, for notifications.
pub(crate) async fn staff_of(conn: &mut SqliteConnection, team_id: &str) -> AppResult<Vec<String>> {
    Ok(
        sqlx::query_scalar("SELECT user_id FROM team_members WHERE team_id = ? AND role IN ('founder', 'coach') ORDER BY user_id")
            .bind(team_id)
            .fetch_all(conn)
            .await?
    )
}

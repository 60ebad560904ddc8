use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{store, AppError, AppResult, CallerIdentity};

use super::TeamRole;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewTeam {
    pub name: String,
    pub game: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatedTeam {
    success: bool,
    message: String,
    team_id: String,
}

pub async fn create_team(db_pool: &SqlitePool, caller: &CallerIdentity, new_team: NewTeam) -> AppResult<String> {
    let user = caller.authenticated()?;

    let name = new_team.name.trim();
    if !(3..=50).contains(&name.chars().count()) {
        return Err(AppError::InvalidArgument("Team name must be 3 to 50 characters.".to_owned()));
    }
    let game = match new_team.game.trim() {
        "" => "Valorant",
        game => game,
    };

    let team_id = store::new_id();
    let mut tx = db_pool.begin().await?;
    sqlx::query("INSERT INTO teams (id, name, game, founder_id, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&team_id)
        .bind(name)
        .bind(game)
        .bind(&user.id)
        .bind(store::now_millis())
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO team_members (team_id, user_id, role) VALUES (?, ?, ?)")
        .bind(&team_id)
        .bind(&user.id)
        .bind(TeamRole::Founder.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(%team_id, uid = %user.id, %name, "team created");
    Ok(team_id)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_team(
    State(db_pool): State<SqlitePool>,
    caller: CallerIdentity,
    Json(new_team): Json<NewTeam>,
) -> AppResult<Json<CreatedTeam>> {
    let team_id = create_team(&db_pool, &caller, new_team).await?;
    Ok(Json(CreatedTeam {
        success: true,
        message: "Team created successfully.".to_owned(),
        team_id,
    }))
}

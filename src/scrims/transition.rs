use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    inbox,
    store::{self, Attempt},
    teams, Ack, AppError, AppResult, CallerIdentity,
};

use super::{model::load_scrim, Scrim, ScrimStatus, Transition};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ChallengeQuery {
    challenger_team_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ReportQuery {
    winner_team_id: String,
}

fn not_found(scrim_id: &str) -> AppError {
    AppError::NotFound(format!("Scrim {scrim_id} does not exist."))
}

/// Fails unless `uid` is staff of at least one of `teams`.
async fn require_staff_of_any(conn: &mut SqliteConnection, team_ids: &[&str], uid: &str) -> AppResult<()> {
    for team_id in team_ids {
        if let Some(role) = teams::role_in_team(&mut *conn, team_id, uid).await? {
            if role.is_staff() {
                return Ok(());
            }
        }
    }
    match team_ids {
        [team_id] => teams::require_staff(conn, team_id, uid).await,
        _ => Err(AppError::PermissionDenied("Only staff of a participating team may do this.".to_owned())),
    }
}

/// Moves a scrim one step through its lifecycle. The stored status is
/// re-read and the write is conditional on it, so two racing transitions
/// cannot both apply.
pub async fn transition_scrim(
    db_pool: &SqlitePool,
    caller: &CallerIdentity,
    scrim_id: &str,
    transition: Transition,
) -> AppResult<Scrim> {
    let user = caller.authenticated()?;
    let missing_team = match &transition {
        Transition::Challenge { challenger_team_id: team } | Transition::ReportWinner { winner_team_id: team } => {
            team.trim().is_empty()
        }
        Transition::Accept | Transition::Decline => false,
    };
    if scrim_id.trim().is_empty() || missing_team {
        return Err(AppError::InvalidArgument("Missing scrim ID or team ID.".to_owned()));
    }

    let uid = user.id.as_str();
    let transition = &transition;
    let scrim = store::optimistic(transition.name(), move || transition_once(db_pool, uid, scrim_id, transition)).await?;

    tracing::info!(%scrim_id, %uid, status = %scrim.status, "scrim transitioned");
    Ok(scrim)
}

async fn transition_once(
    db_pool: &SqlitePool,
    uid: &str,
    scrim_id: &str,
    transition: &Transition,
) -> AppResult<Attempt<Scrim>> {
    let mut tx = db_pool.begin().await?;

    let current = load_scrim(&mut tx, scrim_id).await?.ok_or_else(|| not_found(scrim_id))?;
    require_staff_of_any(&mut tx, &transition.acting_teams(&current), uid).await?;
    let next = current.apply(transition, store::datetime_of(store::now_millis())?)?;

    let updated = sqlx::query(
        "UPDATE scrims SET status = ?, challenger_id = ?, team_b_id = ?, winner_id = ?, updated_at = ? \
         WHERE id = ? AND status = ?"
    )
        .bind(next.status.as_str())
        .bind(&next.challenger_id)
        .bind(&next.team_b_id)
        .bind(&next.winner_id)
        .bind(store::millis_of(next.updated_at))
        .bind(scrim_id)
        .bind(current.status.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if updated == 0 {
        return Ok(Attempt::Conflict);
    }

    if let Transition::ReportWinner { winner_team_id } = transition {
        record_result(&mut tx, &next, winner_team_id).await?;
    }

    // the acting side is known from the transition, the other side hears about it
    let (notified, from) = match transition {
        Transition::Challenge { challenger_team_id } => (Some(next.team_a_id.as_str()), challenger_team_id.as_str()),
        Transition::Accept | Transition::Decline => (next.challenger_id.as_deref(), next.team_a_id.as_str()),
        Transition::ReportWinner { winner_team_id } => (next.opponent_of(winner_team_id), winner_team_id.as_str()),
    };
    if let Some(team_id) = notified {
        inbox::notify_team_staff(&mut tx, team_id, transition.notification(), scrim_id, from).await?;
    }

    tx.commit().await?;
    Ok(Attempt::Done(next))
}

/// Winner gets a win, the other participant a loss.
async fn record_result(conn: &mut SqliteConnection, scrim: &Scrim, winner_team_id: &str) -> AppResult<()> {
    let loser = scrim
        .opponent_of(winner_team_id)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("completed scrim {} has one team", scrim.id)))?;

    sqlx::query("UPDATE teams SET wins = wins + 1 WHERE id = ?")
        .bind(winner_team_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE teams SET losses = losses + 1 WHERE id = ?")
        .bind(loser)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Withdraws a scrim that has not been confirmed yet. Only the poster's
/// staff may do this.
pub async fn cancel_scrim(db_pool: &SqlitePool, caller: &CallerIdentity, scrim_id: &str) -> AppResult<()> {
    let user = caller.authenticated()?;
    if scrim_id.trim().is_empty() {
        return Err(AppError::InvalidArgument("Missing scrim ID.".to_owned()));
    }
    let uid = user.id.as_str();

    store::optimistic("cancel scrim", move || cancel_once(db_pool, uid, scrim_id)).await?;

    tracing::info!(%scrim_id, %uid, "scrim cancelled");
    Ok(())
}

async fn cancel_once(db_pool: &SqlitePool, uid: &str, scrim_id: &str) -> AppResult<Attempt<()>> {
    let mut tx = db_pool.begin().await?;

    let current = load_scrim(&mut tx, scrim_id).await?.ok_or_else(|| not_found(scrim_id))?;
    teams::require_staff(&mut tx, &current.team_a_id, uid).await?;
    if !matches!(current.status, ScrimStatus::Open | ScrimStatus::Challenged) {
        return Err(AppError::FailedPrecondition(format!("A {} scrim cannot be cancelled.", current.status)));
    }

    let deleted = sqlx::query("DELETE FROM scrims WHERE id = ? AND status = ?")
        .bind(scrim_id)
        .bind(current.status.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Ok(Attempt::Conflict);
    }

    tx.commit().await?;
    Ok(Attempt::Done(()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn challenge(
    State(db_pool): State<SqlitePool>,
    Path(scrim_id): Path<String>,
    caller: CallerIdentity,
    Json(ChallengeQuery { challenger_team_id }): Json<ChallengeQuery>,
) -> AppResult<Json<Scrim>> {
    let transition = Transition::Challenge { challenger_team_id };
    Ok(Json(transition_scrim(&db_pool, &caller, &scrim_id, transition).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn accept(
    State(db_pool): State<SqlitePool>,
    Path(scrim_id): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<Scrim>> {
    Ok(Json(transition_scrim(&db_pool, &caller, &scrim_id, Transition::Accept).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn decline(
    State(db_pool): State<SqlitePool>,
    Path(scrim_id): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<Scrim>> {
    Ok(Json(transition_scrim(&db_pool, &caller, &scrim_id, Transition::Decline).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn report(
    State(db_pool): State<SqlitePool>,
    Path(scrim_id): Path<String>,
    caller: CallerIdentity,
    Json(ReportQuery { winner_team_id }): Json<ReportQuery>,
) -> AppResult<Json<Scrim>> {
    let transition = Transition::ReportWinner { winner_team_id };
    Ok(Json(transition_scrim(&db_pool, &caller, &scrim_id, transition).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn cancel(
    State(db_pool): State<SqlitePool>,
    Path(scrim_id): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<Ack>> {
    cancel_scrim(&db_pool, &caller, &scrim_id).await?;
    Ok(Json(Ack::new("Scrim cancelled.")))
}

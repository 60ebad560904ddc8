use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{store, teams, AppError, AppResult, CallerIdentity};

use super::{Scrim, ScrimStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewScrim {
    pub team_id: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
    pub rank_min: Option<String>,
    pub rank_max: Option<String>,
    pub country: String,
}

fn non_blank(rank: Option<String>) -> Option<String> {
    rank.map(|r| r.trim().to_owned()).filter(|r| !r.is_empty())
}

/// Posts an open scrim on behalf of `team_id`. A single rank bound stands
/// for both.
pub async fn create_scrim(db_pool: &SqlitePool, caller: &CallerIdentity, new_scrim: NewScrim) -> AppResult<Scrim> {
    let user = caller.authenticated()?;

    let team_id = new_scrim.team_id.trim();
    let country = new_scrim.country.trim();
    let Some(date) = new_scrim.date else {
        return Err(AppError::InvalidArgument("A scrim needs a date.".to_owned()));
    };
    if team_id.is_empty() || country.is_empty() {
        return Err(AppError::InvalidArgument("Missing team ID or country.".to_owned()));
    }
    let (rank_min, rank_max) = match (non_blank(new_scrim.rank_min), non_blank(new_scrim.rank_max)) {
        (Some(min), None) => (Some(min.clone()), Some(min)),
        (None, Some(max)) => (Some(max.clone()), Some(max)),
        ranks => ranks,
    };

    // stored at millisecond precision
    let now = store::datetime_of(store::now_millis())?;
    let date = store::datetime_of(store::millis_of(date))?;
    let scrim = Scrim {
        id: store::new_id(),
        team_a_id: team_id.to_owned(),
        challenger_id: None,
        team_b_id: None,
        status: ScrimStatus::Open,
        date,
        rank_min,
        rank_max,
        country: country.to_owned(),
        winner_id: None,
        created_at: now,
        updated_at: now,
    };

    let mut tx = db_pool.begin().await?;
    teams::require_staff(&mut tx, team_id, &user.id).await?;
    sqlx::query(
        "INSERT INTO scrims (id, team_a_id, status, date, rank_min, rank_max, country, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
        .bind(&scrim.id)
        .bind(&scrim.team_a_id)
        .bind(scrim.status.as_str())
        .bind(store::millis_of(scrim.date))
        .bind(&scrim.rank_min)
        .bind(&scrim.rank_max)
        .bind(&scrim.country)
        .bind(store::millis_of(now))
        .bind(store::millis_of(now))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(scrim_id = %scrim.id, %team_id, uid = %user.id, "scrim posted");
    Ok(scrim)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_scrim(
    State(db_pool): State<SqlitePool>,
    caller: CallerIdentity,
    Json(new_scrim): Json<NewScrim>,
) -> AppResult<Json<Scrim>> {
    Ok(Json(create_scrim(&db_pool, &caller, new_scrim).await?))
}

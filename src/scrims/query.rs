use std::collections::HashMap;

use axum::{debug_handler, extract::{Path, Query, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{AppError, AppResult, CallerIdentity};

use super::{model::{ScrimRow, SCRIM_COLUMNS}, Scrim, ScrimStatus};

/// The columns a team can appear in.
#[derive(Debug, Clone, Copy)]
enum TeamSlot {
    Poster,
    Opponent,
    Challenger,
}

impl TeamSlot {
    fn column(&self) -> &'static str {
        match self {
            TeamSlot::Poster => "team_a_id",
            TeamSlot::Opponent => "team_b_id",
            TeamSlot::Challenger => "challenger_id",
        }
    }
}

async fn scrims_in_slot(db_pool: &SqlitePool, slot: TeamSlot, team_id: &str) -> AppResult<Vec<Scrim>> {
    let rows: Vec<ScrimRow> = sqlx::query_as(&format!(
        "SELECT {SCRIM_COLUMNS} FROM scrims WHERE {} = ?",
        slot.column()
    ))
        .bind(team_id)
        .fetch_all(db_pool)
        .await?;
    rows.into_iter().map(ScrimRow::into_scrim).collect()
}

/// Every non-open scrim `team_id` took part in, as poster, opponent or
/// challenger, newest date first.
pub async fn find_scrims_for_team(db_pool: &SqlitePool, caller: &CallerIdentity, team_id: &str) -> AppResult<Vec<Scrim>> {
    caller.authenticated()?;
    if team_id.trim().is_empty() {
        return Err(AppError::InvalidArgument("Missing team ID.".to_owned()));
    }

    let (as_poster, as_opponent, as_challenger) = futures_util::try_join!(
        scrims_in_slot(db_pool, TeamSlot::Poster, team_id),
        scrims_in_slot(db_pool, TeamSlot::Opponent, team_id),
        scrims_in_slot(db_pool, TeamSlot::Challenger, team_id),
    )?;

    Ok(merge_team_scrims([as_poster, as_opponent, as_challenger]))
}

/// Folds query batches into one view. A scrim seen more than once resolves
/// to the copy with the latest `updated_at`; on a tie the later batch wins.
/// Open scrims are left out.
pub fn merge_team_scrims(batches: impl IntoIterator<Item = Vec<Scrim>>) -> Vec<Scrim> {
    let mut by_id: HashMap<String, Scrim> = HashMap::new();
    for scrim in batches.into_iter().flatten() {
        match by_id.get(&scrim.id) {
            Some(seen) if seen.updated_at > scrim.updated_at => {}
            _ => {
                by_id.insert(scrim.id.clone(), scrim);
            }
        }
    }

    let mut scrims: Vec<Scrim> = by_id
        .into_values()
        .filter(|scrim| scrim.status != ScrimStatus::Open)
        .collect();
    scrims.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    scrims
}

/// Which public board to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    #[default]
    Open,
    Confirmed,
}

impl Board {
    fn status(&self) -> ScrimStatus {
        match self {
            Board::Open => ScrimStatus::Open,
            Board::Confirmed => ScrimStatus::Confirmed,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct BoardQuery {
    status: Board,
    country: Option<String>,
}

/// Open or confirmed scrims, soonest first. Readable without signing in.
pub async fn list_board(db_pool: &SqlitePool, board: Board, country: Option<&str>) -> AppResult<Vec<Scrim>> {
    let country = country.map(str::trim).filter(|c| !c.is_empty());

    let rows: Vec<ScrimRow> = sqlx::query_as(&format!(
        "SELECT {SCRIM_COLUMNS} FROM scrims \
         WHERE status = ? AND (? IS NULL OR country = ?) \
         ORDER BY date, id"
    ))
        .bind(board.status().as_str())
        .bind(country)
        .bind(country)
        .fetch_all(db_pool)
        .await?;
    rows.into_iter().map(ScrimRow::into_scrim).collect()
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn board(
    State(db_pool): State<SqlitePool>,
    Query(BoardQuery { status, country }): Query<BoardQuery>,
) -> AppResult<Json<Vec<Scrim>>> {
    Ok(Json(list_board(&db_pool, status, country.as_deref()).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn team_scrims(
    State(db_pool): State<SqlitePool>,
    Path(team_id): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<Vec<Scrim>>> {
    Ok(Json(find_scrims_for_team(&db_pool, &caller, &team_id).await?))
}

#[cfg(test)]
mod tests {
    use time::{macros::datetime, Duration, OffsetDateTime};

    use super::*;

    fn scrim(id: &str, status: ScrimStatus, date: OffsetDateTime, updated_at: OffsetDateTime) -> Scrim {
        Scrim {
            id: id.to_owned(),
            team_a_id: "x".to_owned(),
            challenger_id: Some("y".to_owned()),
            team_b_id: None,
            status,
            date,
            rank_min: None,
            rank_max: None,
            country: "Spain".to_owned(),
            winner_id: None,
            created_at: date,
            updated_at,
        }
    }

    #[test]
    fn latest_activity_wins() {
        let day = datetime!(2026-10-01 18:00 UTC);
        let stale = scrim("s1", ScrimStatus::Challenged, day, day);
        let fresh = scrim("s1", ScrimStatus::Confirmed, day, day + Duration::minutes(5));

        let merged = merge_team_scrims([vec![fresh.clone()], vec![], vec![stale.clone()]]);
        assert_eq!(merged, vec![fresh.clone()]);

        let merged = merge_team_scrims([vec![stale], vec![fresh.clone()]]);
        assert_eq!(merged, vec![fresh]);
    }

    #[test]
    fn ties_go_to_the_later_batch() {
        let day = datetime!(2026-10-01 18:00 UTC);
        let first = scrim("s1", ScrimStatus::Challenged, day, day);
        let second = scrim("s1", ScrimStatus::Declined, day, day);

        let merged = merge_team_scrims([vec![first], vec![second.clone()]]);
        assert_eq!(merged, vec![second]);
    }

    #[test]
    fn open_scrims_are_left_out_and_dates_descend() {
        let day = datetime!(2026-10-01 18:00 UTC);
        let open = scrim("s0", ScrimStatus::Open, day + Duration::days(3), day);
        let early = scrim("s1", ScrimStatus::Confirmed, day, day);
        let late = scrim("s2", ScrimStatus::Completed, day + Duration::days(1), day);

        let merged = merge_team_scrims([vec![open, early.clone()], vec![late.clone()]]);
        assert_eq!(merged, vec![late, early]);
    }
}

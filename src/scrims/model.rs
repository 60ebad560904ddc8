use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use time::OffsetDateTime;

use crate::{inbox::NotificationKind, store, AppError, AppResult};

/// `open → challenged → {confirmed | declined}`, `confirmed → completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrimStatus {
    Open,
    Challenged,
    Confirmed,
    Declined,
    Completed,
}

impl ScrimStatus {
    pub fn as_str(&self) -> &'static str {
        use ScrimStatus::*;
        match self {
            Open => "open",
            Challenged => "challenged",
            Confirmed => "confirmed",
            Declined => "declined",
            Completed => "completed",
        }
    }
}

impl fmt::Display for ScrimStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrimStatus {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        use ScrimStatus::*;
        Ok(match s {
            "open" => Open,
            "challenged" => Challenged,
            "confirmed" => Confirmed,
            "declined" => Declined,
            "completed" => Completed,
            _ => return Err(format!("unknown scrim status {s:?}").into()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scrim {
    pub id: String,
    /// The posting team.
    pub team_a_id: String,
    pub challenger_id: Option<String>,
    /// Set once a challenge is accepted.
    pub team_b_id: Option<String>,
    pub status: ScrimStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub rank_min: Option<String>,
    pub rank_max: Option<String>,
    pub country: String,
    pub winner_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last activity; the newest copy of a scrim wins when views are merged.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Challenge { challenger_team_id: String },
    Accept,
    Decline,
    ReportWinner { winner_team_id: String },
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Challenge { .. } => "challenge scrim",
            Transition::Accept => "accept scrim",
            Transition::Decline => "decline scrim",
            Transition::ReportWinner { .. } => "report scrim winner",
        }
    }

    /// Teams whose staff may perform this transition on `scrim`.
    pub fn acting_teams<'a>(&'a self, scrim: &'a Scrim) -> Vec<&'a str> {
        match self {
            Transition::Challenge { challenger_team_id } => vec![challenger_team_id.as_str()],
            Transition::Accept | Transition::Decline => vec![scrim.team_a_id.as_str()],
            Transition::ReportWinner { .. } => {
                std::iter::once(scrim.team_a_id.as_str())
                    .chain(scrim.team_b_id.as_deref())
                    .collect()
            }
        }
    }

    pub(crate) fn notification(&self) -> NotificationKind {
        match self {
            Transition::Challenge { .. } => NotificationKind::ScrimChallenged,
            Transition::Accept => NotificationKind::ScrimAccepted,
            Transition::Decline => NotificationKind::ScrimDeclined,
            Transition::ReportWinner { .. } => NotificationKind::ScrimCompleted,
        }
    }
}

impl Scrim {
    /// The scrim after `transition`, or why the current state forbids it.
    pub fn apply(&self, transition: &Transition, now: OffsetDateTime) -> AppResult<Scrim> {
        use ScrimStatus::*;

        if self.status == Completed {
            return Err(AppError::FailedPrecondition("This scrim is already completed.".to_owned()));
        }

        let mut next = self.clone();
        next.updated_at = now;

        match transition {
            Transition::Challenge { challenger_team_id } => {
                if self.status != Open {
                    return Err(AppError::FailedPrecondition(format!("This scrim is {}, not open.", self.status)));
                }
                if *challenger_team_id == self.team_a_id {
                    return Err(AppError::FailedPrecondition("A team cannot challenge its own scrim.".to_owned()));
                }
                next.status = Challenged;
                next.challenger_id = Some(challenger_team_id.clone());
            }
            Transition::Accept | Transition::Decline => {
                if self.status != Challenged {
                    return Err(AppError::FailedPrecondition(format!("This scrim is {}, not challenged.", self.status)));
                }
                if *transition == Transition::Accept {
                    next.status = Confirmed;
                    next.team_b_id = self.challenger_id.clone();
                } else {
                    next.status = Declined;
                }
            }
            Transition::ReportWinner { winner_team_id } => {
                if self.status != Confirmed {
                    return Err(AppError::FailedPrecondition(format!("This scrim is {}, not confirmed.", self.status)));
                }
                if *winner_team_id != self.team_a_id && Some(winner_team_id) != self.team_b_id.as_ref() {
                    return Err(AppError::InvalidArgument("The winner must be one of the two teams.".to_owned()));
                }
                next.status = Completed;
                next.winner_id = Some(winner_team_id.clone());
            }
        }

        Ok(next)
    }

    /// The participating team that is not `team_id`.
    pub fn opponent_of(&self, team_id: &str) -> Option<&str> {
        if team_id == self.team_a_id {
            self.team_b_id.as_deref().or(self.challenger_id.as_deref())
        } else {
            Some(self.team_a_id.as_str())
        }
    }
}

#[derive(FromRow)]
pub(crate) struct ScrimRow {
    id: String,
    team_a_id: String,
    challenger_id: Option<String>,
    team_b_id: Option<String>,
    status: String,
    date: i64,
    rank_min: Option<String>,
    rank_max: Option<String>,
    country: String,
    winner_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl ScrimRow {
    pub(crate) fn into_scrim(self) -> AppResult<Scrim> {
        Ok(Scrim {
            id: self.id,
            team_a_id: self.team_a_id,
            challenger_id: self.challenger_id,
            team_b_id: self.team_b_id,
            status: self.status.parse()?,
            date: store::datetime_of(self.date)?,
            rank_min: self.rank_min,
            rank_max: self.rank_max,
            country: self.country,
            winner_id: self.winner_id,
            created_at: store::datetime_of(self.created_at)?,
            updated_at: store::datetime_of(self.updated_at)?,
        })
    }
}

pub(crate) const SCRIM_COLUMNS: &str =
    "id, team_a_id, challenger_id, team_b_id, status, date, rank_min, rank_max, country, winner_id, created_at, updated_at";

pub(crate) async fn load_scrim(conn: &mut SqliteConnection, scrim_id: &str) -> AppResult<Option<Scrim>> {
    sqlx::query_as::<_, ScrimRow>(&format!("SELECT {SCRIM_COLUMNS} FROM scrims WHERE id = ?"))
        .bind(scrim_id)
        .fetch_optional(conn)
        .await?
        .map(ScrimRow::into_scrim)
        .transpose()
}

use axum::{debug_handler, extract::{Path, State}, Json};
use sqlx::SqlitePool;

use crate::{store::{self, Attempt}, Ack, AppError, AppResult, CallerIdentity};

use super::{require_room_id, room::participants_of};

/// How a leave resolved. Every variant is a success for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The room was already deleted.
    RoomGone,
    /// The caller was not a participant.
    NotMember,
    Left,
    /// The owner left; ownership went to the earliest remaining joiner.
    Transferred { new_owner: String },
    /// The last participant left and the room is gone with them.
    Deleted,
}

impl LeaveOutcome {
    pub fn message(&self) -> &'static str {
        use LeaveOutcome::*;
        match self {
            RoomGone => "Room no longer exists.",
            NotMember => "You are not in the room.",
            Left | Transferred { .. } | Deleted => "Successfully left the room.",
        }
    }
}

/// Adds the caller to the room. Joining twice changes nothing.
pub async fn join_room(db_pool: &SqlitePool, caller: &CallerIdentity, room_id: &str) -> AppResult<()> {
    let user = caller.authenticated()?;
    require_room_id(room_id)?;
    let uid = user.id.as_str();

    let joined = store::retry_transient("join room", move || join_once(db_pool, uid, room_id)).await?;
    if joined {
        tracing::info!(%room_id, %uid, "joined room");
    } else {
        tracing::debug!(%room_id, %uid, "already in room");
    }
    Ok(())
}

async fn join_once(db_pool: &SqlitePool, uid: &str, room_id: &str) -> AppResult<bool> {
    let mut tx = db_pool.begin().await?;

    // Insert-if-room-exists is one statement, so it cannot race a delete.
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO room_participants (room_id, user_id) \
         SELECT id, ? FROM rooms WHERE id = ?"
    )
        .bind(uid)
        .bind(room_id)
        .execute(&mut *tx)
        .await?
        .rows_affected() == 1;

    if inserted {
        sqlx::query("UPDATE rooms SET version = version + 1 WHERE id = ?")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;
    } else {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM rooms WHERE id = ?)")
            .bind(room_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(AppError::NotFound("The room does not exist.".to_owned()));
        }
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Removes the caller from the room, handing ownership on or deleting the
/// room as needed. Runs as one optimistic transaction against the room's
/// version, re-read from scratch on every retry.
pub async fn leave_room(db_pool: &SqlitePool, caller: &CallerIdentity, room_id: &str) -> AppResult<LeaveOutcome> {
    let user = caller.authenticated()?;
    require_room_id(room_id)?;
    let uid = user.id.as_str();

    let outcome = store::optimistic("leave room", move || leave_once(db_pool, uid, room_id)).await?;
    match &outcome {
        LeaveOutcome::RoomGone | LeaveOutcome::NotMember => {
            tracing::debug!(%room_id, %uid, ?outcome, "leave was a no-op")
        }
        LeaveOutcome::Transferred { new_owner } => {
            tracing::info!(%room_id, %uid, %new_owner, "owner left room, ownership transferred")
        }
        LeaveOutcome::Deleted => tracing::info!(%room_id, %uid, "last participant left, room deleted"),
        LeaveOutcome::Left => tracing::info!(%room_id, %uid, "left room"),
    }
    Ok(outcome)
}

async fn leave_once(db_pool: &SqlitePool, uid: &str, room_id: &str) -> AppResult<Attempt<LeaveOutcome>> {
    let mut tx = db_pool.begin().await?;

    let Some((owner, version)): Option<(String, i64)> =
        sqlx::query_as("SELECT created_by, version FROM rooms WHERE id = ?")
            .bind(room_id)
            .fetch_optional(&mut *tx)
            .await?
    else {
        return Ok(Attempt::Done(LeaveOutcome::RoomGone));
    };

    let participants = participants_of(&mut tx, room_id).await?;
    if !participants.iter().any(|p| p == uid) {
        return Ok(Attempt::Done(LeaveOutcome::NotMember));
    }
    let remaining: Vec<&String> = participants.iter().filter(|p| *p != uid).collect();

    let outcome = match remaining.first() {
        None => {
            let deleted = sqlx::query("DELETE FROM rooms WHERE id = ? AND version = ?")
                .bind(room_id)
                .bind(version)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if deleted == 0 {
                return Ok(Attempt::Conflict);
            }
            LeaveOutcome::Deleted
        }
        Some(next) => {
            let new_owner = if owner == uid { next.as_str() } else { owner.as_str() };
            let updated = sqlx::query("UPDATE rooms SET created_by = ?, version = version + 1 WHERE id = ? AND version = ?")
                .bind(new_owner)
                .bind(room_id)
                .bind(version)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if updated == 0 {
                return Ok(Attempt::Conflict);
            }
            sqlx::query("DELETE FROM room_participants WHERE room_id = ? AND user_id = ?")
                .bind(room_id)
                .bind(uid)
                .execute(&mut *tx)
                .await?;

            if owner == uid {
                LeaveOutcome::Transferred { new_owner: new_owner.to_owned() }
            } else {
                LeaveOutcome::Left
            }
        }
    };

    tx.commit().await?;
    Ok(Attempt::Done(outcome))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join(
    State(db_pool): State<SqlitePool>,
    Path(room_id): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<Ack>> {
    join_room(&db_pool, &caller, &room_id).await?;
    Ok(Json(Ack::new("Joined the room.")))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn leave(
    State(db_pool): State<SqlitePool>,
    Path(room_id): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<Ack>> {
    let outcome = leave_room(&db_pool, &caller, &room_id).await?;
    Ok(Json(Ack::new(outcome.message())))
}

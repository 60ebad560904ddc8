use axum::{debug_handler, extract::{Path, State}, Json};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;

use crate::{store, Ack, AppError, AppResult, CallerIdentity};

use super::require_room_id;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(FromRow)]
struct MessageRow {
    id: String,
    sender: String,
    content: String,
    created_at: i64,
}

impl MessageRow {
    fn into_message(self) -> AppResult<RoomMessage> {
        Ok(RoomMessage {
            id: self.id,
            sender: self.sender,
            content: self.content,
            created_at: store::datetime_of(self.created_at)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SendMessageQuery {
    content: String,
}

/// `Some(is_participant)` when the room exists.
async fn membership(db_pool: &SqlitePool, room_id: &str, uid: &str) -> AppResult<Option<bool>> {
    Ok(
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM room_participants WHERE room_id = rooms.id AND user_id = ?) \
             FROM rooms WHERE id = ?"
        )
            .bind(uid)
            .bind(room_id)
            .fetch_optional(db_pool)
            .await?
    )
}

async fn require_participant(db_pool: &SqlitePool, room_id: &str, uid: &str) -> AppResult<()> {
    match membership(db_pool, room_id, uid).await? {
        None => Err(AppError::NotFound("The room does not exist.".to_owned())),
        Some(false) => Err(AppError::PermissionDenied("You are not a participant of this room.".to_owned())),
        Some(true) => Ok(()),
    }
}

/// Appends a message and bumps the room's `last_message_at`. Membership is
/// checked up front but not held: a message racing its sender's leave may
/// still land.
pub async fn send_message(db_pool: &SqlitePool, caller: &CallerIdentity, room_id: &str, content: &str) -> AppResult<RoomMessage> {
    let user = caller.authenticated()?;
    if room_id.trim().is_empty() || content.trim().is_empty() {
        return Err(AppError::InvalidArgument("Missing room ID or message content.".to_owned()));
    }
    require_participant(db_pool, room_id, &user.id).await?;

    // id is fixed across retries so a retried append cannot duplicate
    let id = store::new_id();
    let created_at = store::now_millis();
    let uid = user.id.as_str();
    let message_id = id.as_str();

    store::retry_transient("send room message", move || {
        append_message(db_pool, room_id, uid, message_id, content, created_at)
    }).await?;

    tracing::debug!(%room_id, %uid, message_id = %id, "room message sent");
    Ok(RoomMessage {
        id,
        sender: user.id.clone(),
        content: content.to_owned(),
        created_at: store::datetime_of(created_at)?,
    })
}

/// Inserts the message only if the room still exists; it may have been
/// deleted since the sender's membership was checked. An id already stored
/// means an earlier attempt landed.
async fn append_message(
    db_pool: &SqlitePool,
    room_id: &str,
    uid: &str,
    message_id: &str,
    content: &str,
    created_at: i64,
) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO room_messages (id, room_id, sender, content, created_at) \
         SELECT ?, id, ?, ?, ? FROM rooms WHERE id = ?"
    )
        .bind(message_id)
        .bind(uid)
        .bind(content)
        .bind(created_at)
        .bind(room_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if inserted == 0 {
        let retried: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM room_messages WHERE id = ?)")
            .bind(message_id)
            .fetch_one(&mut *tx)
            .await?;
        if !retried {
            return Err(AppError::NotFound("The room does not exist.".to_owned()));
        }
    }
    sqlx::query("UPDATE rooms SET last_message_at = MAX(COALESCE(last_message_at, 0), ?) WHERE id = ?")
        .bind(created_at)
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Messages in send order. Only participants may read.
pub async fn list_messages(db_pool: &SqlitePool, caller: &CallerIdentity, room_id: &str) -> AppResult<Vec<RoomMessage>> {
    let user = caller.authenticated()?;
    require_room_id(room_id)?;
    require_participant(db_pool, room_id, &user.id).await?;

    let rows: Vec<MessageRow> = sqlx::query_as(
        "SELECT id, sender, content, created_at FROM room_messages \
         WHERE room_id = ? ORDER BY created_at, seq"
    )
        .bind(room_id)
        .fetch_all(db_pool)
        .await?;

    rows.into_iter().map(MessageRow::into_message).collect()
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send(
    State(db_pool): State<SqlitePool>,
    Path(room_id): Path<String>,
    caller: CallerIdentity,
    Json(SendMessageQuery { content }): Json<SendMessageQuery>,
) -> AppResult<Json<Ack>> {
    send_message(&db_pool, &caller, &room_id, &content).await?;
    Ok(Json(Ack::new("Message sent.")))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn messages(
    State(db_pool): State<SqlitePool>,
    Path(room_id): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<Vec<RoomMessage>>> {
    Ok(Json(list_messages(&db_pool, &caller, &room_id).await?))
}

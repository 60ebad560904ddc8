use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use time::OffsetDateTime;

use crate::{store, AppError, AppResult, CallerIdentity};

use super::require_room_id;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub game: String,
    pub server: String,
    pub rank: String,
    pub party_size: String,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    /// In join order.
    pub participants: Vec<String>,
    pub discord_channel_id: Option<String>,
}

#[derive(FromRow)]
struct RoomRow {
    id: String,
    name: String,
    game: String,
    server: String,
    rank: String,
    party_size: String,
    created_by: String,
    created_at: i64,
    last_message_at: Option<i64>,
    discord_channel_id: Option<String>,
}

impl RoomRow {
    fn into_room(self, participants: Vec<String>) -> AppResult<Room> {
        Ok(Room {
            id: self.id,
            name: self.name,
            game: self.game,
            server: self.server,
            rank: self.rank,
            party_size: self.party_size,
            created_by: self.created_by,
            created_at: store::datetime_of(self.created_at)?,
            last_message_at: self.last_message_at.map(store::datetime_of).transpose()?,
            participants,
            discord_channel_id: self.discord_channel_id,
        })
    }
}

const ROOM_COLUMNS: &str =
    "id, name, game, server, rank, party_size, created_by, created_at, last_message_at, discord_channel_id";

pub(crate) async fn participants_of(conn: &mut SqliteConnection, room_id: &str) -> AppResult<Vec<String>> {
    Ok(
        sqlx::query_scalar("SELECT user_id FROM room_participants WHERE room_id = ? ORDER BY seq")
            .bind(room_id)
            .fetch_all(conn)
            .await?
    )
}

pub(crate) async fn load_room(conn: &mut SqliteConnection, room_id: &str) -> AppResult<Option<Room>> {
    let Some(row) = sqlx::query_as::<_, RoomRow>(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?"))
        .bind(room_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let participants = participants_of(conn, room_id).await?;
    Ok(Some(row.into_room(participants)?))
}

pub async fn get_room(db_pool: &SqlitePool, caller: &CallerIdentity, room_id: &str) -> AppResult<Room> {
    caller.authenticated()?;
    require_room_id(room_id)?;

    let mut tx = db_pool.begin().await?;
    load_room(&mut tx, room_id)
        .await?
        .ok_or_else(|| AppError::NotFound("The room does not exist.".to_owned()))
}

/// Rooms with recent chat first, then the newest.
pub async fn list_rooms(db_pool: &SqlitePool, caller: &CallerIdentity) -> AppResult<Vec<Room>> {
    caller.authenticated()?;

    let mut tx = db_pool.begin().await?;
    let rows: Vec<RoomRow> = sqlx::query_as(&format!(
        "SELECT {ROOM_COLUMNS} FROM rooms \
         ORDER BY last_message_at IS NULL, last_message_at DESC, created_at DESC"
    ))
        .fetch_all(&mut *tx)
        .await?;

    let mut rooms = Vec::with_capacity(rows.len());
    for row in rows {
        let participants = participants_of(&mut tx, &row.id).await?;
        rooms.push(row.into_room(participants)?);
    }
    Ok(rooms)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn rooms_page(
    State(db_pool): State<SqlitePool>,
    caller: CallerIdentity,
) -> AppResult<Json<Vec<Room>>> {
    Ok(Json(list_rooms(&db_pool, &caller).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    State(db_pool): State<SqlitePool>,
    Path(room_id): Path<String>,
    caller: CallerIdentity,
) -> AppResult<Json<Room>> {
    Ok(Json(get_room(&db_pool, &caller, &room_id).await?))
}

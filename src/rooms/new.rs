use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{store, AppError, AppResult, CallerIdentity};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewRoom {
    pub name: String,
    pub game: String,
    pub server: String,
    pub rank: String,
    pub party_size: String,
}

impl NewRoom {
    fn validate(&self) -> AppResult<()> {
        let fields = [&self.name, &self.game, &self.server, &self.rank, &self.party_size];
        if fields.iter().any(|field| field.trim().is_empty()) {
            return Err(AppError::InvalidArgument("Missing required room details.".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRoom {
    pub success: bool,
    pub message: String,
    pub room_id: String,
    pub discord_channel_id: Option<String>,
}

/// Rooms have no external chat channel; this stays `None` until one exists.
fn discord_channel_for(_room_id: &str) -> Option<String> {
    None
}

pub async fn create_room(db_pool: &SqlitePool, caller: &CallerIdentity, new_room: NewRoom) -> AppResult<CreatedRoom> {
    let user = caller.authenticated()?;
    new_room.validate()?;

    let room_id = store::new_id();
    let discord_channel_id = discord_channel_for(&room_id);

    let mut tx = db_pool.begin().await?;
    sqlx::query(
        "INSERT INTO rooms (id, name, game, server, rank, party_size, created_by, created_at, discord_channel_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
        .bind(&room_id)
        .bind(&new_room.name)
        .bind(&new_room.game)
        .bind(&new_room.server)
        .bind(&new_room.rank)
        .bind(&new_room.party_size)
        .bind(&user.id)
        .bind(store::now_millis())
        .bind(&discord_channel_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO room_participants (room_id, user_id) VALUES (?, ?)")
        .bind(&room_id)
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(%room_id, uid = %user.id, game = %new_room.game, "room created");
    Ok(CreatedRoom {
        success: true,
        message: "Room created successfully.".to_owned(),
        room_id,
        discord_channel_id,
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    State(db_pool): State<SqlitePool>,
    caller: CallerIdentity,
    Json(new_room): Json<NewRoom>,
) -> AppResult<Json<CreatedRoom>> {
    Ok(Json(create_room(&db_pool, &caller, new_room).await?))
}

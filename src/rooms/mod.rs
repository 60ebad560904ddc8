mod membership;
mod msg;
mod new;
mod room;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use membership::{join_room, leave_room, LeaveOutcome};
pub use msg::{list_messages, send_message, RoomMessage};
pub use new::{create_room, CreatedRoom, NewRoom};
pub use room::{get_room, list_rooms, Room};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(room::rooms_page).post(new::new_room))
        .route("/{room_id}", get(room::room))
        .route("/{room_id}/join", post(membership::join))
        .route("/{room_id}/leave", post(membership::leave))
        .route("/{room_id}/messages", get(msg::messages).post(msg::send))
}

fn require_room_id(room_id: &str) -> crate::AppResult<()> {
    if room_id.trim().is_empty() {
        return Err(crate::AppError::InvalidArgument("Missing room ID.".to_owned()));
    }
    Ok(())
}

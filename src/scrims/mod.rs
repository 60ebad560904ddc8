use axum::{routing::{get, post}, Router};

use crate::AppState;

mod model;
mod new;
mod query;
mod transition;

pub use model::{Scrim, ScrimStatus, Transition};
pub use new::{create_scrim, NewScrim};
pub use query::{find_scrims_for_team, list_board, merge_team_scrims, Board};
pub use transition::{cancel_scrim, transition_scrim};

pub(crate) use query::team_scrims;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(query::board).post(new::new_scrim))
        .route("/{scrim_id}/challenge", post(transition::challenge))
        .route("/{scrim_id}/accept", post(transition::accept))
        .route("/{scrim_id}/decline", post(transition::decline))
        .route("/{scrim_id}/report", post(transition::report))
        .route("/{scrim_id}/cancel", post(transition::cancel))
}

use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;

use crate::{store, teams, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ScrimChallenged,
    ScrimAccepted,
    ScrimDeclined,
    ScrimCompleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        use NotificationKind::*;
        match self {
            ScrimChallenged => "scrim_challenged",
            ScrimAccepted => "scrim_accepted",
            ScrimDeclined => "scrim_declined",
            ScrimCompleted => "scrim_completed",
        }
    }
}

/// Drops a notification in the inbox of every staff member of `team_id`.
/// Runs on the caller's connection so it commits or aborts with the change
/// that caused it.
pub(crate) async fn notify_team_staff(
    conn: &mut SqliteConnection,
    team_id: &str,
    kind: NotificationKind,
    scrim_id: &str,
    from_team_id: &str,
) -> AppResult<usize> {
    let staff = teams::staff_of(&mut *conn, team_id).await?;
    let payload = json!({ "scrimId": scrim_id, "fromTeamId": from_team_id }).to_string();
    let now = store::now_millis();

    for uid in &staff {
        sqlx::query("INSERT INTO inbox (id, user_id, kind, payload, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(store::new_id())
            .bind(uid)
            .bind(kind.as_str())
            .bind(&payload)
            .bind(now)
            .execute(&mut *conn)
            .await?;
    }

    tracing::debug!(%team_id, %scrim_id, kind = kind.as_str(), recipients = staff.len(), "inbox notified");
    Ok(staff.len())
}

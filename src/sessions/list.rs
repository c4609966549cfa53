use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::Caller, db::{SessionListing, SessionStatus}, guard::Gate, AppResult, AppState};

const LISTING: &str = "SELECT x.id,x.student_id,x.mentor_id,x.date,x.time,x.status,x.notes,x.created_at,\
    s.name AS student_name,m.name AS mentor_name \
    FROM sessions x \
    LEFT JOIN profiles s ON s.id=x.student_id \
    LEFT JOIN profiles m ON m.id=x.mentor_id";

/// Sessions where the profile is either side, soonest first.
pub async fn sessions_for(db_pool: &SqlitePool, profile_id: Uuid) -> sqlx::Result<Vec<SessionListing>> {
    sqlx::query_as(&format!(
        "{LISTING} WHERE x.student_id=?1 OR x.mentor_id=?1 ORDER BY x.date, x.time"
    ))
    .bind(profile_id)
    .fetch_all(db_pool)
    .await
}

pub async fn all_sessions(db_pool: &SqlitePool) -> sqlx::Result<Vec<SessionListing>> {
    sqlx::query_as(&format!("{LISTING} ORDER BY x.created_at DESC, x.id DESC"))
        .fetch_all(db_pool)
        .await
}

#[derive(Debug, Default, Serialize)]
pub struct SessionBuckets {
    pub upcoming: Vec<SessionListing>,
    pub pending: Vec<SessionListing>,
    pub completed: Vec<SessionListing>,
    pub cancelled: Vec<SessionListing>,
}

impl FromIterator<SessionListing> for SessionBuckets {
    fn from_iter<I: IntoIterator<Item = SessionListing>>(iter: I) -> Self {
        let mut buckets = SessionBuckets::default();
        for listing in iter {
            match listing.session.status {
                SessionStatus::Upcoming => buckets.upcoming.push(listing),
                SessionStatus::Pending => buckets.pending.push(listing),
                SessionStatus::Completed => buckets.completed.push(listing),
                SessionStatus::Cancelled => buckets.cancelled.push(listing),
            }
        }
        buckets
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn mine(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<SessionBuckets>> {
    caller.require(Gate::Authenticated)?;
    let sessions = sessions_for(&db_pool, caller.id()).await?;
    Ok(Json(sessions.into_iter().collect()))
}

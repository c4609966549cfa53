use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::Caller, db::RequestListing, guard::Gate, AppResult, AppState};

const LISTING: &str = "SELECT r.id,r.student_id,r.mentor_id,r.date,r.time,r.topic,r.status,r.created_at,\
    s.name AS student_name,m.name AS mentor_name \
    FROM session_requests r \
    LEFT JOIN profiles s ON s.id=r.student_id \
    LEFT JOIN profiles m ON m.id=r.mentor_id";

/// The mentor's pending queue, newest first.
pub async fn pending_for_mentor(db_pool: &SqlitePool, mentor_id: Uuid) -> sqlx::Result<Vec<RequestListing>> {
    sqlx::query_as(&format!(
        "{LISTING} WHERE r.mentor_id=? AND r.status='pending' ORDER BY r.created_at DESC, r.id DESC"
    ))
    .bind(mentor_id)
    .fetch_all(db_pool)
    .await
}

pub async fn all_requests(db_pool: &SqlitePool) -> sqlx::Result<Vec<RequestListing>> {
    sqlx::query_as(&format!("{LISTING} ORDER BY r.created_at DESC, r.id DESC"))
        .fetch_all(db_pool)
        .await
}

#[debug_handler(state = AppState)]
pub(crate) async fn pending(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<Vec<RequestListing>>> {
    caller.require(Gate::Mentor)?;
    Ok(Json(pending_for_mentor(&db_pool, caller.id()).await?))
}

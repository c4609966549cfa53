use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use sqlx::{SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::Caller,
    booking,
    db::{self, RequestStatus, Session, SessionRequest, SessionStatus, REQUEST_COLUMNS},
    guard::{self, Gate},
    AppResult, AppState, Rejection,
};

async fn load_for(conn: &mut SqliteConnection, caller: &Caller, request_id: Uuid) -> AppResult<SessionRequest> {
    let Some(request): Option<SessionRequest> =
        sqlx::query_as(&format!("SELECT {REQUEST_COLUMNS} FROM session_requests WHERE id=?"))
            .bind(request_id)
            .fetch_optional(&mut *conn)
            .await?
    else {
        return Err(Rejection::NotFound("request"))?;
    };

    if !caller.is_admin() && request.mentor_id != caller.id() {
        return Err(Rejection::Forbidden { redirect: guard::dashboard(caller.profile().role) })?;
    }

    Ok(request)
}

/// Marks a pending request accepted and creates its `upcoming` session. Both
/// writes commit together; a failure in either, or a slot the mentor already
/// holds, leaves the request pending.
pub async fn accept(db_pool: &SqlitePool, caller: &Caller, request_id: Uuid) -> AppResult<Session> {
    let mut tx = db::begin_write(db_pool).await?;
    let request = load_for(&mut tx, caller, request_id).await?;

    let updated = sqlx::query("UPDATE session_requests SET status=? WHERE id=? AND status=?")
        .bind(RequestStatus::Accepted)
        .bind(request.id)
        .bind(RequestStatus::Pending)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(Rejection::AlreadyResolved)?;
    }
    // another request for the same slot may have been accepted first
    if booking::slot_taken(&mut tx, request.mentor_id, request.date, request.time).await? {
        return Err(Rejection::SlotTaken)?;
    }

    let session = Session {
        id: Uuid::now_v7(),
        student_id: request.student_id,
        mentor_id: request.mentor_id,
        date: request.date,
        time: request.time,
        status: SessionStatus::Upcoming,
        notes: request.topic,
        created_at: OffsetDateTime::now_utc(),
    };
    sqlx::query("INSERT INTO sessions (id,student_id,mentor_id,date,time,status,notes,created_at) VALUES (?,?,?,?,?,?,?,?)")
        .bind(session.id)
        .bind(session.student_id)
        .bind(session.mentor_id)
        .bind(session.date)
        .bind(session.time)
        .bind(session.status)
        .bind(&session.notes)
        .bind(session.created_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(%request_id, session_id = %session.id, by = %caller.id(), "request accepted");
    Ok(session)
}

/// Declining twice is harmless; declining an accepted request is not allowed.
pub async fn decline(db_pool: &SqlitePool, caller: &Caller, request_id: Uuid) -> AppResult<()> {
    let mut tx = db::begin_write(db_pool).await?;
    let request = load_for(&mut tx, caller, request_id).await?;

    match request.status {
        RequestStatus::Declined => return Ok(()),
        RequestStatus::Accepted => return Err(Rejection::AlreadyResolved)?,
        RequestStatus::Pending => {}
    }

    sqlx::query("UPDATE session_requests SET status=? WHERE id=? AND status=?")
        .bind(RequestStatus::Declined)
        .bind(request.id)
        .bind(RequestStatus::Pending)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(%request_id, by = %caller.id(), "request declined");
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn accept_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(request_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<Session>)> {
    caller.require(Gate::Mentor)?;
    let session = accept(&db_pool, &caller, request_id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn decline_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(request_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.require(Gate::Mentor)?;
    decline(&db_pool, &caller, request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

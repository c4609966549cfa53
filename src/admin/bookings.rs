use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    auth::Caller,
    db::{RequestListing, Session, SessionListing},
    guard::Gate,
    requests, sessions,
    sessions::NewSession,
    AppResult, AppState, Rejection,
};

#[debug_handler(state = AppState)]
pub(crate) async fn list_requests(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<Vec<RequestListing>>> {
    caller.require(Gate::Admin)?;
    Ok(Json(requests::all_requests(&db_pool).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn accept_request(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(request_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<Session>)> {
    caller.require(Gate::Admin)?;
    let session = requests::accept(&db_pool, &caller, request_id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn decline_request(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(request_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.require(Gate::Admin)?;
    requests::decline(&db_pool, &caller, request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_sessions(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<Vec<SessionListing>>> {
    caller.require(Gate::Admin)?;
    Ok(Json(sessions::all_sessions(&db_pool).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_session(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(form): Json<NewSession>,
) -> AppResult<(StatusCode, Json<Session>)> {
    caller.require(Gate::Admin)?;
    let session = sessions::create(&db_pool, form).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn cancel_session(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(session_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.require(Gate::Admin)?;
    if !sessions::cancel(&db_pool, session_id).await? {
        return Err(Rejection::NotFound("session"))?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_session(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(session_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.require(Gate::Admin)?;
    if !sessions::delete(&db_pool, session_id).await? {
        return Err(Rejection::NotFound("session"))?;
    }
    Ok(StatusCode::NO_CONTENT)
}

use axum::{debug_handler, extract::{Query, State}, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

use crate::{
    auth::Caller,
    db::{self, Profile, RequestStatus, Role, SessionRequest},
    guard::Gate,
    AppResult, AppState, Rejection,
};

use super::check_eligibility;

#[derive(Debug, Default, Deserialize)]
pub struct BookingForm {
    pub mentor_id: Option<Uuid>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub topic: Option<String>,
}

struct Slot {
    mentor_id: Uuid,
    date: Date,
    time: Time,
}

impl BookingForm {
    /// Missing fields are caught here, before anything touches the database.
    fn slot(&self) -> Result<Slot, Rejection> {
        fn present<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, Rejection> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|x| !x.is_empty())
                .ok_or(Rejection::MissingField(field))
        }

        let mentor_id = self.mentor_id.ok_or(Rejection::MissingField("mentor"))?;
        let date = db::parse_date(present(&self.date, "date")?)?;
        let time = db::parse_time(present(&self.time, "time")?)?;
        Ok(Slot { mentor_id, date, time })
    }
}

async fn bookable_mentor(db_pool: &SqlitePool, caller: &Caller, mentor_id: Uuid) -> AppResult<Profile> {
    if caller.profile().role != Role::Student {
        return Err(Rejection::Invalid("only students can request sessions".to_owned()))?;
    }
    if mentor_id == caller.id() {
        return Err(Rejection::Invalid("you can't book a session with yourself".to_owned()))?;
    }

    Ok(Profile::find(db_pool, mentor_id)
        .await?
        .filter(|mentor| mentor.role == Role::Mentor && mentor.is_active)
        .ok_or(Rejection::NotFound("mentor"))?)
}

/// Checks the slot and records a `pending` request for it. The check and the
/// insert share one transaction.
pub async fn request_session(
    db_pool: &SqlitePool,
    caller: &Caller,
    form: BookingForm,
    now: PrimitiveDateTime,
) -> AppResult<SessionRequest> {
    let Slot { mentor_id, date, time } = form.slot()?;
    let topic = form.topic.map(|x| x.trim().to_owned()).filter(|x| !x.is_empty());
    bookable_mentor(db_pool, caller, mentor_id).await?;

    let mut tx = db::begin_write(db_pool).await?;
    check_eligibility(&mut tx, mentor_id, date, time, now).await?;

    let request = SessionRequest {
        id: Uuid::now_v7(),
        student_id: caller.id(),
        mentor_id,
        date,
        time,
        topic,
        status: RequestStatus::Pending,
        created_at: OffsetDateTime::now_utc(),
    };
    sqlx::query("INSERT INTO session_requests (id,student_id,mentor_id,date,time,topic,status,created_at) VALUES (?,?,?,?,?,?,?,?)")
        .bind(request.id)
        .bind(request.student_id)
        .bind(request.mentor_id)
        .bind(request.date)
        .bind(request.time)
        .bind(&request.topic)
        .bind(request.status)
        .bind(request.created_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(request_id = %request.id, student_id = %request.student_id, %mentor_id, %date, %time, "session requested");
    Ok(request)
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(form): Json<BookingForm>,
) -> AppResult<(StatusCode, Json<SessionRequest>)> {
    caller.require(Gate::Authenticated)?;
    let request = request_session(&db_pool, &caller, form, db::now()).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Runs the eligibility check without submitting anything.
#[debug_handler(state = AppState)]
pub(crate) async fn check_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Query(form): Query<BookingForm>,
) -> AppResult<Json<Value>> {
    caller.require(Gate::Authenticated)?;
    let Slot { mentor_id, date, time } = form.slot()?;
    bookable_mentor(&db_pool, &caller, mentor_id).await?;

    let mut conn = db_pool.acquire().await?;
    check_eligibility(&mut conn, mentor_id, date, time, db::now()).await?;
    Ok(Json(json!({ "eligible": true })))
}

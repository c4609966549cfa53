use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{booking, db::{self, Profile, Role, Session, SessionStatus}, AppResult, Rejection};

#[derive(Debug, Default, Deserialize)]
pub struct NewSession {
    pub student_id: Option<Uuid>,
    pub mentor_id: Option<Uuid>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub status: Option<SessionStatus>,
    pub notes: Option<String>,
}

async fn profile_with_role(db_pool: &SqlitePool, id: Uuid, role: Role, what: &'static str) -> AppResult<Profile> {
    Ok(Profile::find(db_pool, id)
        .await?
        .filter(|profile| profile.role == role)
        .ok_or(Rejection::NotFound(what))?)
}

/// Books a session directly, skipping the request queue. Still refuses a slot
/// the mentor already holds.
pub async fn create(db_pool: &SqlitePool, form: NewSession) -> AppResult<Session> {
    let student_id = form.student_id.ok_or(Rejection::MissingField("student"))?;
    let mentor_id = form.mentor_id.ok_or(Rejection::MissingField("mentor"))?;
    let date = db::parse_date(form.date.as_deref().ok_or(Rejection::MissingField("date"))?)?;
    let time = db::parse_time(form.time.as_deref().ok_or(Rejection::MissingField("time"))?)?;
    let status = match form.status.unwrap_or(SessionStatus::Upcoming) {
        status @ (SessionStatus::Upcoming | SessionStatus::Pending) => status,
        other => return Err(Rejection::Invalid(format!("new sessions can't start as {other:?}")))?,
    };

    profile_with_role(db_pool, student_id, Role::Student, "student").await?;
    profile_with_role(db_pool, mentor_id, Role::Mentor, "mentor").await?;

    let session = Session {
        id: Uuid::now_v7(),
        student_id,
        mentor_id,
        date,
        time,
        status,
        notes: form.notes.map(|x| x.trim().to_owned()).filter(|x| !x.is_empty()),
        created_at: OffsetDateTime::now_utc(),
    };

    let mut tx = db::begin_write(db_pool).await?;
    if booking::slot_taken(&mut tx, mentor_id, date, time).await? {
        return Err(Rejection::SlotTaken)?;
    }

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

    tracing::info!(session_id = %session.id, %student_id, %mentor_id, "session created");
    Ok(session)
}

/// Unguarded: cancelling a cancelled session is a no-op write. Returns
/// whether the session exists.
pub async fn cancel(db_pool: &SqlitePool, session_id: Uuid) -> sqlx::Result<bool> {
    let affected = sqlx::query("UPDATE sessions SET status=? WHERE id=?")
        .bind(SessionStatus::Cancelled)
        .bind(session_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    tracing::info!(%session_id, affected, "session cancelled");
    Ok(affected > 0)
}

pub async fn delete(db_pool: &SqlitePool, session_id: Uuid) -> sqlx::Result<bool> {
    let affected = sqlx::query("DELETE FROM sessions WHERE id=?")
        .bind(session_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    tracing::info!(%session_id, affected, "session deleted");
    Ok(affected > 0)
}

use sqlx::SqliteConnection;
use time::{Date, PrimitiveDateTime, Time};
use uuid::Uuid;

use crate::{db::{day_index, AvailabilityWindow}, AppResult, Rejection};

/// Whether a new request for `mentor_id` at `date` `time` may be submitted.
///
/// The checks fail closed and run in a fixed order, so when several apply the
/// caller always sees the first: past time, then outside availability, then
/// slot taken.
pub async fn check_eligibility(
    conn: &mut SqliteConnection,
    mentor_id: Uuid,
    date: Date,
    time: Time,
    now: PrimitiveDateTime,
) -> AppResult<()> {
    if PrimitiveDateTime::new(date, time) < now {
        return Err(Rejection::PastTime)?;
    }

    let windows: Vec<AvailabilityWindow> = sqlx::query_as(
        "SELECT day_of_week,start_time,end_time FROM mentor_availability WHERE mentor_id=? AND day_of_week=?",
    )
    .bind(mentor_id)
    .bind(day_index(date))
    .fetch_all(&mut *conn)
    .await?;

    if !windows.iter().any(|window| window.contains(time)) {
        return Err(Rejection::OutsideAvailability)?;
    }

    if slot_taken(conn, mentor_id, date, time).await? {
        return Err(Rejection::SlotTaken)?;
    }

    Ok(())
}

/// Whether the mentor already holds an active (`pending` or `upcoming`)
/// session at exactly this date and time.
pub async fn slot_taken(conn: &mut SqliteConnection, mentor_id: Uuid, date: Date, time: Time) -> sqlx::Result<bool> {
    Ok(sqlx::query(
        "SELECT 1 FROM sessions WHERE mentor_id=? AND date=? AND time=? AND status IN ('pending','upcoming') LIMIT 1",
    )
    .bind(mentor_id)
    .bind(date)
    .bind(time)
    .fetch_optional(&mut *conn)
    .await?
    .is_some())
}

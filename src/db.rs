use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use sqlx::{migrate::Migrator, sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions}, Sqlite, SqlitePool, Transaction};
use time::{format_description::BorrowedFormatItem, macros::format_description, Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

use crate::{AppResult, Rejection};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(url: &str) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .create_if_missing(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(options)
        .await?;

    MIGRATOR.run(&db_pool).await?;
    Ok(db_pool)
}

/// A transaction that holds the write lock from its first statement. A plain
/// `BEGIN` that reads before writing can't be upgraded under WAL while another
/// writer is active, and fails with SQLITE_BUSY instead of waiting.
pub async fn begin_write(db_pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    db_pool.begin_with("BEGIN IMMEDIATE").await
}

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");
time::serde::format_description!(hhmm, Time, "[hour]:[minute]");

const HHMM: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

pub fn parse_date(raw: &str) -> Result<Date, Rejection> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| Rejection::Invalid(format!("{raw:?} is not a date (YYYY-MM-DD)")))
}

pub fn format_time(time: Time) -> String {
    time.format(HHMM).unwrap_or_default()
}

/// Minutes only. Slots are compared by exact time, so seconds never get in.
pub fn parse_time(raw: &str) -> Result<Time, Rejection> {
    let raw = raw.trim();
    Time::parse(raw, HHMM)
        .map_err(|_| Rejection::Invalid(format!("{raw:?} is not a time (HH:MM)")))
}

/// Wall-clock now. Slots are booked in UTC.
pub fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// 0 = Monday .. 6 = Sunday, for both storage and lookup.
pub fn day_index(date: Date) -> u8 {
    date.weekday().number_days_from_monday()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Student,
    Mentor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Upcoming,
    Completed,
    Pending,
    Cancelled,
}

pub(crate) const PROFILE_COLUMNS: &str =
    "id,name,country,bio,profile_image_url,role,is_admin,is_active,deactivated_reason,created_at";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    pub country: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    pub role: Role,
    pub is_admin: bool,
    pub is_active: bool,
    pub deactivated_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Profile {
    pub async fn find(db_pool: &SqlitePool, id: Uuid) -> sqlx::Result<Option<Profile>> {
        sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id=?"))
            .bind(id)
            .fetch_optional(db_pool)
            .await
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("User")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AvailabilityWindow {
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: Time,
    #[serde(with = "hhmm")]
    pub end_time: Time,
}

impl AvailabilityWindow {
    /// Half-open: the end time itself is not bookable.
    pub fn contains(&self, time: Time) -> bool {
        self.start_time <= time && time < self.end_time
    }
}

pub(crate) const REQUEST_COLUMNS: &str =
    "id,student_id,mentor_id,date,time,topic,status,created_at";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SessionRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub mentor_id: Uuid,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(with = "hhmm")]
    pub time: Time,
    pub topic: Option<String>,
    pub status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A request joined with the names shown in the mentor queue and admin console.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RequestListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: SessionRequest,
    pub student_name: Option<String>,
    pub mentor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub student_id: Uuid,
    pub mentor_id: Uuid,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(with = "hhmm")]
    pub time: Time,
    pub status: SessionStatus,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SessionListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub session: Session,
    pub student_name: Option<String>,
    pub mentor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Chat {
    pub id: Uuid,
    pub mentor_id: Uuid,
    pub student_id: Uuid,
    pub last_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Chat {
    pub fn has_participant(&self, profile_id: Uuid) -> bool {
        self.mentor_id == profile_id || self.student_id == profile_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub seq: i64,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}


#[cfg(test)]
mod tests {
    use time::macros::{date, time};

    use super::*;

    #[test]
    fn weekdays_start_on_monday() {
        assert_eq!(day_index(date!(2030-01-07)), 0);
        assert_eq!(day_index(date!(2030-01-09)), 2);
        assert_eq!(day_index(date!(2030-01-13)), 6);
    }

    #[test]
    fn windows_exclude_their_end() {
        let window = AvailabilityWindow {
            day_of_week: 0,
            start_time: time!(09:00),
            end_time: time!(17:00),
        };
        assert!(window.contains(time!(09:00)));
        assert!(window.contains(time!(16:30)));
        assert!(!window.contains(time!(17:00)));
        assert!(!window.contains(time!(08:59)));
    }

    #[test]
    fn times_are_hours_and_minutes() {
        assert_eq!(parse_time("16:30").unwrap(), time!(16:30));
        assert_eq!(parse_time(" 09:05 ").unwrap(), time!(09:05));
        assert!(parse_time("16:30:00").is_err());
        assert!(parse_time("10:00:01").is_err());
        assert!(parse_time("4pm").is_err());
        assert_eq!(format_time(time!(09:05)), "09:05");
        assert_eq!(parse_date("2030-01-07").unwrap(), date!(2030-01-07));
        assert!(parse_date("07/01/2030").is_err());
    }
}

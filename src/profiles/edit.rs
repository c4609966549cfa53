use axum::{
    body::Bytes,
    debug_handler,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::{macros::time, Time};
use uuid::Uuid;

use crate::{
    auth::Caller,
    avatars::AvatarStore,
    db::{self, AvailabilityWindow, Profile, Role},
    guard::Gate,
    AppResult, AppState, Rejection,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileDetails {
    #[serde(flatten)]
    pub profile: Profile,
    pub skills: Vec<String>,
    pub availability: Vec<AvailabilityWindow>,
}

impl ProfileDetails {
    async fn load(db_pool: &SqlitePool, profile: Profile) -> sqlx::Result<ProfileDetails> {
        let (skills, availability) = match profile.role {
            Role::Mentor => (load_skills(db_pool, profile.id).await?, load_availability(db_pool, profile.id).await?),
            Role::Student => Default::default(),
        };
        Ok(ProfileDetails { profile, skills, availability })
    }
}

pub async fn load_skills(db_pool: &SqlitePool, mentor_id: Uuid) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT skill FROM mentor_skills WHERE mentor_id=? ORDER BY skill")
        .bind(mentor_id)
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(skill,)| skill).collect())
}

pub async fn load_availability(db_pool: &SqlitePool, mentor_id: Uuid) -> sqlx::Result<Vec<AvailabilityWindow>> {
    sqlx::query_as(
        "SELECT day_of_week,start_time,end_time FROM mentor_availability WHERE mentor_id=? ORDER BY day_of_week, start_time",
    )
    .bind(mentor_id)
    .fetch_all(db_pool)
    .await
}

#[derive(Debug, Default, Deserialize)]
pub struct WindowForm {
    pub day_of_week: Option<u8>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl WindowForm {
    /// Unset times fall back to a 09:00 to 17:00 working day.
    fn window(&self) -> Result<AvailabilityWindow, Rejection> {
        let day_of_week = self.day_of_week.ok_or(Rejection::MissingField("day_of_week"))?;
        if day_of_week > 6 {
            return Err(Rejection::Invalid(format!("day {day_of_week} is not between 0 (Monday) and 6 (Sunday)")));
        }

        let parse = |raw: &Option<String>, default: Time| match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(default),
            Some(raw) => db::parse_time(raw),
        };
        let start_time = parse(&self.start_time, time!(09:00))?;
        let end_time = parse(&self.end_time, time!(17:00))?;
        if start_time >= end_time {
            return Err(Rejection::Invalid(format!(
                "availability must end after it starts ({} to {})",
                db::format_time(start_time),
                db::format_time(end_time),
            )));
        }

        Ok(AvailabilityWindow { day_of_week, start_time, end_time })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileForm {
    pub name: Option<String>,
    pub country: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub availability: Vec<WindowForm>,
}

fn cleaned(value: Option<String>) -> Option<String> {
    value.map(|x| x.trim().to_owned()).filter(|x| !x.is_empty())
}

/// Saves the caller's profile. For mentors the skill and availability sets
/// are replaced as a whole; students have neither, so theirs are ignored.
pub async fn save(db_pool: &SqlitePool, caller: &Caller, form: ProfileForm) -> AppResult<ProfileDetails> {
    let name = cleaned(form.name).ok_or(Rejection::MissingField("name"))?;
    let windows = form
        .availability
        .iter()
        .map(WindowForm::window)
        .collect::<Result<Vec<_>, _>>()?;
    let mut skills: Vec<String> = form.skills.into_iter().filter_map(|x| cleaned(Some(x))).collect();
    skills.sort();
    skills.dedup();

    let mut tx = db::begin_write(db_pool).await?;
    sqlx::query("UPDATE profiles SET name=?,country=?,bio=?,profile_image_url=? WHERE id=?")
        .bind(&name)
        .bind(cleaned(form.country))
        .bind(cleaned(form.bio))
        .bind(cleaned(form.profile_image_url))
        .bind(caller.id())
        .execute(&mut *tx)
        .await?;

    if caller.profile().role == Role::Mentor {
        sqlx::query("DELETE FROM mentor_skills WHERE mentor_id=?")
            .bind(caller.id())
            .execute(&mut *tx)
            .await?;
        for skill in &skills {
            sqlx::query("INSERT INTO mentor_skills (mentor_id,skill) VALUES (?,?)")
                .bind(caller.id())
                .bind(skill)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM mentor_availability WHERE mentor_id=?")
            .bind(caller.id())
            .execute(&mut *tx)
            .await?;
        for window in &windows {
            sqlx::query("INSERT INTO mentor_availability (mentor_id,day_of_week,start_time,end_time) VALUES (?,?,?,?)")
                .bind(caller.id())
                .bind(window.day_of_week)
                .bind(window.start_time)
                .bind(window.end_time)
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await?;

    tracing::info!(profile_id = %caller.id(), skills = skills.len(), windows = windows.len(), "profile saved");

    let profile = Profile::find(db_pool, caller.id()).await?.ok_or(Rejection::NotFound("profile"))?;
    Ok(ProfileDetails::load(db_pool, profile).await?)
}

/// Stores a new picture for the caller and points their profile at it.
pub async fn upload_avatar(
    db_pool: &SqlitePool,
    avatars: &AvatarStore,
    caller: &Caller,
    content_type: &str,
    bytes: &[u8],
) -> AppResult<Profile> {
    let url = avatars.put(caller.id(), content_type, bytes).await?;
    sqlx::query("UPDATE profiles SET profile_image_url=? WHERE id=?")
        .bind(&url)
        .bind(caller.id())
        .execute(db_pool)
        .await?;

    tracing::info!(profile_id = %caller.id(), %url, size = bytes.len(), "avatar uploaded");
    Ok(Profile::find(db_pool, caller.id()).await?.ok_or(Rejection::NotFound("profile"))?)
}

#[debug_handler(state = AppState)]
pub(crate) async fn get(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<ProfileDetails>> {
    caller.require(Gate::Authenticated)?;
    Ok(Json(ProfileDetails::load(&db_pool, caller.0).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn put(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(form): Json<ProfileForm>,
) -> AppResult<Json<ProfileDetails>> {
    caller.require(Gate::Authenticated)?;
    Ok(Json(save(&db_pool, &caller, form).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn avatar(
    State(db_pool): State<SqlitePool>,
    State(avatars): State<AvatarStore>,
    caller: Caller,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Profile>> {
    caller.require(Gate::Authenticated)?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|x| x.to_str().ok())
        .ok_or(Rejection::MissingField("content type"))?;
    Ok(Json(upload_avatar(&db_pool, &avatars, &caller, content_type, &body).await?))
}

#[cfg(test)]
mod tests {
    use crate::db::testing;

    use super::*;

    fn window(day: u8, start: &str, end: &str) -> WindowForm {
        WindowForm {
            day_of_week: Some(day),
            start_time: Some(start.to_owned()),
            end_time: Some(end.to_owned()),
        }
    }

    fn form(availability: Vec<WindowForm>) -> ProfileForm {
        ProfileForm {
            name: Some(" Grace ".to_owned()),
            country: Some("US".to_owned()),
            bio: Some("".to_owned()),
            profile_image_url: None,
            skills: vec!["Rust".to_owned(), " ".to_owned(), "Go".to_owned(), "Rust".to_owned()],
            availability,
        }
    }

    #[tokio::test]
    async fn load_save_load_keeps_availability() {
        let db_pool = testing::pool().await;
        let mentor = testing::user(&db_pool, "Mentor", Role::Mentor).await;
        testing::available(&db_pool, mentor, 4, time!(08:00), time!(12:00)).await;
        let caller = testing::caller(&db_pool, mentor).await;

        let saved = save(&db_pool, &caller, form(vec![window(0, "09:00", "17:00"), window(2, "13:00", "15:30")]))
            .await
            .unwrap();
        assert_eq!(saved.profile.name.as_deref(), Some("Grace"));
        assert_eq!(saved.profile.bio, None);
        assert_eq!(saved.skills, vec!["Go", "Rust"]);
        assert_eq!(
            saved.availability,
            vec![
                AvailabilityWindow { day_of_week: 0, start_time: time!(09:00), end_time: time!(17:00) },
                AvailabilityWindow { day_of_week: 2, start_time: time!(13:00), end_time: time!(15:30) },
            ]
        );

        let reloaded = load_availability(&db_pool, mentor).await.unwrap();
        assert_eq!(reloaded, saved.availability);

        let resaved = save(
            &db_pool,
            &caller,
            form(reloaded.iter().map(|x| window(x.day_of_week, &db::format_time(x.start_time), &db::format_time(x.end_time))).collect()),
        )
        .await
        .unwrap();
        assert_eq!(resaved.availability, saved.availability);
    }

    #[tokio::test]
    async fn unset_times_default_to_office_hours() {
        let db_pool = testing::pool().await;
        let mentor = testing::user(&db_pool, "Mentor", Role::Mentor).await;
        let caller = testing::caller(&db_pool, mentor).await;

        let saved = save(&db_pool, &caller, form(vec![WindowForm { day_of_week: Some(5), ..Default::default() }]))
            .await
            .unwrap();
        assert_eq!(
            saved.availability,
            vec![AvailabilityWindow { day_of_week: 5, start_time: time!(09:00), end_time: time!(17:00) }]
        );
    }

    #[tokio::test]
    async fn bad_windows_change_nothing() {
        let db_pool = testing::pool().await;
        let mentor = testing::user(&db_pool, "Mentor", Role::Mentor).await;
        testing::available(&db_pool, mentor, 0, time!(09:00), time!(17:00)).await;
        let caller = testing::caller(&db_pool, mentor).await;

        for bad in [window(0, "17:00", "09:00"), window(1, "10:00", "10:00"), window(7, "09:00", "10:00")] {
            let err = save(&db_pool, &caller, form(vec![bad])).await.unwrap_err();
            assert!(matches!(err.rejection(), Some(Rejection::Invalid(_))));
        }

        assert_eq!(load_availability(&db_pool, mentor).await.unwrap().len(), 1);
        assert_eq!(Profile::find(&db_pool, mentor).await.unwrap().unwrap().name.as_deref(), Some("Mentor"));
    }

    #[tokio::test]
    async fn students_keep_no_mentor_data() {
        let db_pool = testing::pool().await;
        let student = testing::user(&db_pool, "Student", Role::Student).await;
        let caller = testing::caller(&db_pool, student).await;

        let saved = save(&db_pool, &caller, form(vec![window(0, "09:00", "17:00")])).await.unwrap();
        assert!(saved.skills.is_empty());
        assert!(saved.availability.is_empty());
        assert!(load_availability(&db_pool, student).await.unwrap().is_empty());

        let err = save(&db_pool, &caller, ProfileForm::default()).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::MissingField("name")));
    }

    #[tokio::test]
    async fn uploads_point_the_profile_at_the_avatar() {
        let db_pool = testing::pool().await;
        let dir = tempfile::tempdir().unwrap();
        let avatars = AvatarStore::new(dir.path());
        let student = testing::user(&db_pool, "Student", Role::Student).await;
        let caller = testing::caller(&db_pool, student).await;

        let profile = upload_avatar(&db_pool, &avatars, &caller, "image/webp", b"webp").await.unwrap();
        assert_eq!(profile.profile_image_url, Some(format!("/avatars/{student}/avatar.webp")));

        let err = upload_avatar(&db_pool, &avatars, &caller, "application/pdf", b"pdf").await.unwrap_err();
        assert!(matches!(err.rejection(), Some(Rejection::Invalid(_))));
        let unchanged = Profile::find(&db_pool, student).await.unwrap().unwrap();
        assert_eq!(unchanged.profile_image_url, profile.profile_image_url);
    }
}

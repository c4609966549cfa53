use std::collections::HashMap;

use axum::{debug_handler, extract::{Path, Query, State}, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::AvailabilityWindow, AppResult, AppState, Rejection};

use super::{load_availability, load_skills};

/// An active mentor as the directory shows them.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct MentorView {
    pub id: Uuid,
    pub name: Option<String>,
    pub country: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    #[sqlx(skip)]
    pub skills: Vec<String>,
}

impl MentorView {
    fn matches(&self, filter: &MentorFilter) -> bool {
        let country = filter.country.as_deref().map(str::trim).filter(|x| !x.is_empty());
        if let Some(country) = country {
            if !self.country.as_deref().is_some_and(|x| x.eq_ignore_ascii_case(country)) {
                return false;
            }
        }

        let skill = filter.skill.as_deref().map(str::trim).filter(|x| !x.is_empty());
        if let Some(skill) = skill {
            if !self.skills.iter().any(|x| x == skill) {
                return false;
            }
        }

        let search = filter.search.as_deref().map(str::trim).filter(|x| !x.is_empty());
        match search.map(str::to_lowercase) {
            None => true,
            Some(needle) => {
                self.name.as_deref().is_some_and(|x| x.to_lowercase().contains(&needle))
                    || self.skills.iter().any(|x| x.to_lowercase().contains(&needle))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MentorFilter {
    pub country: Option<String>,
    pub search: Option<String>,
    pub skill: Option<String>,
}

const ACTIVE_MENTORS: &str = "SELECT id,name,country,bio,profile_image_url FROM profiles \
    WHERE role='mentor' AND is_active";

pub async fn list_mentors(db_pool: &SqlitePool, filter: &MentorFilter) -> sqlx::Result<Vec<MentorView>> {
    let mut mentors: Vec<MentorView> = sqlx::query_as(&format!("{ACTIVE_MENTORS} ORDER BY name COLLATE NOCASE, id"))
        .fetch_all(db_pool)
        .await?;

    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT k.mentor_id,k.skill FROM mentor_skills k \
         JOIN profiles p ON p.id=k.mentor_id \
         WHERE p.role='mentor' AND p.is_active ORDER BY k.skill",
    )
    .fetch_all(db_pool)
    .await?;

    let mut skills: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (mentor_id, skill) in rows {
        skills.entry(mentor_id).or_default().push(skill);
    }
    for mentor in &mut mentors {
        mentor.skills = skills.remove(&mentor.id).unwrap_or_default();
    }

    Ok(mentors.into_iter().filter(|x| x.matches(filter)).collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentorDetails {
    #[serde(flatten)]
    pub mentor: MentorView,
    pub availability: Vec<AvailabilityWindow>,
}

pub async fn get_mentor(db_pool: &SqlitePool, mentor_id: Uuid) -> AppResult<MentorDetails> {
    let Some(mut mentor): Option<MentorView> = sqlx::query_as(&format!("{ACTIVE_MENTORS} AND id=?"))
        .bind(mentor_id)
        .fetch_optional(db_pool)
        .await?
    else {
        return Err(Rejection::NotFound("mentor"))?;
    };

    mentor.skills = load_skills(db_pool, mentor_id).await?;
    let availability = load_availability(db_pool, mentor_id).await?;
    Ok(MentorDetails { mentor, availability })
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    Query(filter): Query<MentorFilter>,
) -> AppResult<Json<Vec<MentorView>>> {
    Ok(Json(list_mentors(&db_pool, &filter).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn one(
    State(db_pool): State<SqlitePool>,
    Path(mentor_id): Path<Uuid>,
) -> AppResult<Json<MentorDetails>> {
    Ok(Json(get_mentor(&db_pool, mentor_id).await?))
}

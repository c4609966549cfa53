use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{config::Config, db::{self, Profile, Role}, session::USER_ID, AppResult, AppState, Rejection};

use super::hash_password;

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub country: Option<String>,
    pub role: Option<Role>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, Rejection> {
    value
        .map(|x| x.trim().to_owned())
        .filter(|x| !x.is_empty())
        .ok_or(Rejection::MissingField(field))
}

pub async fn register_user(
    db_pool: &SqlitePool,
    form: RegisterForm,
    bootstrap_admin_email: Option<&str>,
) -> AppResult<Profile> {
    let email = required(form.email, "email")?.to_lowercase();
    let password = form.password.filter(|x| !x.is_empty()).ok_or(Rejection::MissingField("password"))?;
    let name = required(form.name, "name")?;
    let country = required(form.country, "country")?;
    let role = form.role.unwrap_or(Role::Student);

    if !email.contains('@') {
        return Err(Rejection::Invalid(format!("{email:?} is not an email address")))?;
    }
    if password.chars().count() < 6 {
        return Err(Rejection::Invalid("password must be at least 6 characters".to_owned()))?;
    }

    let id = Uuid::now_v7();
    let now = OffsetDateTime::now_utc();
    let is_admin = bootstrap_admin_email == Some(email.as_str());
    let password_hash = hash_password(&password)?;

    let mut tx = db::begin_write(db_pool).await?;
    let inserted = sqlx::query("INSERT INTO users (id,email,password_hash,created_at) VALUES (?,?,?,?)")
        .bind(id)
        .bind(&email)
        .bind(password_hash)
        .bind(now)
        .execute(&mut *tx)
        .await;
    match inserted {
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(Rejection::EmailTaken)?;
        }
        other => other?,
    };

    sqlx::query("INSERT INTO profiles (id,name,country,role,is_admin,created_at) VALUES (?,?,?,?,?,?)")
        .bind(id)
        .bind(&name)
        .bind(&country)
        .bind(role)
        .bind(is_admin)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %id, ?role, is_admin, "registered");

    Profile::find(db_pool, id).await?.ok_or(Rejection::NotFound("profile").into())
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    session: Session,
    Json(form): Json<RegisterForm>,
) -> AppResult<(StatusCode, Json<Profile>)> {
    let profile = register_user(&db_pool, form, config.bootstrap_admin_email.as_deref()).await?;

    session.cycle_id().await?;
    session.insert(USER_ID, profile.id).await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

#[cfg(test)]
mod tests {
    use crate::db::testing;

    use super::*;

    fn form(email: &str) -> RegisterForm {
        RegisterForm {
            email: Some(email.to_owned()),
            password: Some("correct horse".to_owned()),
            name: Some("Ada".to_owned()),
            country: Some("UK".to_owned()),
            role: Some(Role::Mentor),
        }
    }

    #[tokio::test]
    async fn register_creates_an_active_profile() {
        let db_pool = testing::pool().await;
        let profile = register_user(&db_pool, form("Ada@Example.com"), None).await.unwrap();

        assert_eq!(profile.name.as_deref(), Some("Ada"));
        assert_eq!(profile.role, Role::Mentor);
        assert!(profile.is_active);
        assert!(!profile.is_admin);

        let (email,): (String,) = sqlx::query_as("SELECT email FROM users WHERE id=?")
            .bind(profile.id)
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(email, "ada@example.com");
    }

    #[tokio::test]
    async fn register_rejects_missing_fields_and_duplicates() {
        let db_pool = testing::pool().await;

        let mut missing = form("a@example.com");
        missing.country = Some("  ".to_owned());
        let err = register_user(&db_pool, missing, None).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::MissingField("country")));

        register_user(&db_pool, form("a@example.com"), None).await.unwrap();
        let err = register_user(&db_pool, form("A@example.com"), None).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::EmailTaken));
    }

    #[tokio::test]
    async fn bootstrap_email_becomes_admin() {
        let db_pool = testing::pool().await;
        let profile = register_user(&db_pool, form("root@example.com"), Some("root@example.com"))
            .await
            .unwrap();
        assert!(profile.is_admin);
    }
}

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{db::Profile, session::USER_ID, AppResult, AppState, Rejection};

use super::verify_password;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginForm {
    email: Option<String>,
    password: Option<String>,
}

/// Resolves credentials to a profile. Deactivated accounts are refused with
/// their reason and no session is established.
pub async fn authenticate(db_pool: &SqlitePool, email: &str, password: &str) -> AppResult<Profile> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(Rejection::MissingField("email"))?;
    }
    if password.is_empty() {
        return Err(Rejection::MissingField("password"))?;
    }

    let Some((user_id, password_hash)): Option<(Uuid, String)> =
        sqlx::query_as("SELECT id,password_hash FROM users WHERE email=?")
            .bind(&email)
            .fetch_optional(db_pool)
            .await?
    else {
        return Err(Rejection::InvalidCredentials)?;
    };

    if !verify_password(password, &password_hash) {
        return Err(Rejection::InvalidCredentials)?;
    }

    let Some(profile) = Profile::find(db_pool, user_id).await? else {
        return Err(Rejection::NotFound("profile"))?;
    };

    if !profile.is_active {
        tracing::info!(%user_id, "login refused for deactivated account");
        return Err(Rejection::Deactivated(profile.deactivated_reason))?;
    }

    Ok(profile)
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(LoginForm { email, password }): Json<LoginForm>,
) -> AppResult<Json<Profile>> {
    let profile = authenticate(
        &db_pool,
        email.as_deref().unwrap_or_default(),
        password.as_deref().unwrap_or_default(),
    )
    .await?;

    session.cycle_id().await?;
    session.insert(USER_ID, profile.id).await?;

    tracing::info!(user_id = %profile.id, "welcome");
    Ok(Json(profile))
}

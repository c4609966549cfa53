use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    auth::Caller,
    db::{Profile, Role, PROFILE_COLUMNS},
    guard::Gate,
    AppResult, AppState, Rejection,
};

/// Every profile, newest first, optionally narrowed by name.
pub async fn list_users(db_pool: &SqlitePool, search: Option<&str>) -> sqlx::Result<Vec<Profile>> {
    match search.map(str::trim).filter(|x| !x.is_empty()) {
        Some(search) => {
            sqlx::query_as(&format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles WHERE name LIKE '%' || ? || '%' ORDER BY created_at DESC, id DESC"
            ))
            .bind(search)
            .fetch_all(db_pool)
            .await
        }
        None => {
            sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC, id DESC"))
                .fetch_all(db_pool)
                .await
        }
    }
}

/// Fields left unset keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub country: Option<String>,
    pub bio: Option<String>,
    pub role: Option<Role>,
    pub is_admin: Option<bool>,
}

async fn existing(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Profile> {
    Ok(Profile::find(db_pool, user_id).await?.ok_or(Rejection::NotFound("user"))?)
}

pub async fn update_user(db_pool: &SqlitePool, user_id: Uuid, update: UserUpdate) -> AppResult<Profile> {
    let mut profile = existing(db_pool, user_id).await?;
    let text = |value: Option<String>, current: Option<String>| match value {
        Some(x) if x.trim().is_empty() => None,
        Some(x) => Some(x.trim().to_owned()),
        None => current,
    };

    profile.name = text(update.name, profile.name);
    profile.country = text(update.country, profile.country);
    profile.bio = text(update.bio, profile.bio);
    profile.role = update.role.unwrap_or(profile.role);
    profile.is_admin = update.is_admin.unwrap_or(profile.is_admin);

    sqlx::query("UPDATE profiles SET name=?,country=?,bio=?,role=?,is_admin=? WHERE id=?")
        .bind(&profile.name)
        .bind(&profile.country)
        .bind(&profile.bio)
        .bind(profile.role)
        .bind(profile.is_admin)
        .bind(user_id)
        .execute(db_pool)
        .await?;

    tracing::info!(%user_id, role = ?profile.role, is_admin = profile.is_admin, "user updated");
    Ok(profile)
}

/// Removes the account and, through the foreign keys, everything it owns.
pub async fn delete_user(db_pool: &SqlitePool, caller: &Caller, user_id: Uuid) -> AppResult<()> {
    if user_id == caller.id() {
        return Err(Rejection::Invalid("you can't delete your own account".to_owned()))?;
    }

    let affected = sqlx::query("DELETE FROM users WHERE id=?")
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(Rejection::NotFound("user"))?;
    }

    tracing::info!(%user_id, by = %caller.id(), "user deleted");
    Ok(())
}

/// The reason is shown verbatim to the user at their next login.
pub async fn deactivate(db_pool: &SqlitePool, caller: &Caller, user_id: Uuid, reason: &str) -> AppResult<Profile> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Rejection::MissingField("reason"))?;
    }
    if user_id == caller.id() {
        return Err(Rejection::Invalid("you can't deactivate your own account".to_owned()))?;
    }
    existing(db_pool, user_id).await?;

    sqlx::query("UPDATE profiles SET is_active=FALSE, deactivated_reason=? WHERE id=?")
        .bind(reason)
        .bind(user_id)
        .execute(db_pool)
        .await?;

    tracing::info!(%user_id, by = %caller.id(), reason, "user deactivated");
    existing(db_pool, user_id).await
}

pub async fn activate(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Profile> {
    existing(db_pool, user_id).await?;
    sqlx::query("UPDATE profiles SET is_active=TRUE, deactivated_reason=NULL WHERE id=?")
        .bind(user_id)
        .execute(db_pool)
        .await?;

    tracing::info!(%user_id, "user activated");
    existing(db_pool, user_id).await
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeactivateForm {
    reason: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Query(SearchQuery { search }): Query<SearchQuery>,
) -> AppResult<Json<Vec<Profile>>> {
    caller.require(Gate::Admin)?;
    Ok(Json(list_users(&db_pool, search.as_deref()).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
    Json(form): Json<UserUpdate>,
) -> AppResult<Json<Profile>> {
    caller.require(Gate::Admin)?;
    Ok(Json(update_user(&db_pool, user_id, form).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.require(Gate::Admin)?;
    delete_user(&db_pool, &caller, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn deactivate_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
    Json(DeactivateForm { reason }): Json<DeactivateForm>,
) -> AppResult<Json<Profile>> {
    caller.require(Gate::Admin)?;
    let reason = reason.unwrap_or_default();
    Ok(Json(deactivate(&db_pool, &caller, user_id, &reason).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn activate_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Profile>> {
    caller.require(Gate::Admin)?;
    Ok(Json(activate(&db_pool, user_id).await?))
}

#[cfg(test)]
mod tests {
    use crate::{
        auth::{authenticate, register_user, RegisterForm},
        db::testing,
    };

    use super::*;

    async fn admin(db_pool: &SqlitePool) -> Caller {
        let id = testing::user(db_pool, "Admin", Role::Student).await;
        testing::make_admin(db_pool, id).await;
        testing::caller(db_pool, id).await
    }

    async fn registered(db_pool: &SqlitePool, email: &str) -> Profile {
        let form = RegisterForm {
            email: Some(email.to_owned()),
            password: Some("secret123".to_owned()),
            name: Some("Sam".to_owned()),
            country: Some("NZ".to_owned()),
            role: Some(Role::Student),
        };
        register_user(db_pool, form, None).await.unwrap()
    }

    #[tokio::test]
    async fn deactivated_users_see_the_reason_at_login() {
        let db_pool = testing::pool().await;
        let admin = admin(&db_pool).await;
        let sam = registered(&db_pool, "sam@example.com").await;

        let profile = deactivate(&db_pool, &admin, sam.id, "policy violation").await.unwrap();
        assert!(!profile.is_active);

        let err = authenticate(&db_pool, "sam@example.com", "secret123").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::Deactivated(Some("policy violation".to_owned()))));
        assert_eq!(err.rejection().unwrap().to_string(), "this account has been deactivated: policy violation");

        let profile = activate(&db_pool, sam.id).await.unwrap();
        assert!(profile.is_active);
        assert_eq!(profile.deactivated_reason, None);
        authenticate(&db_pool, "sam@example.com", "secret123").await.unwrap();
    }

    #[tokio::test]
    async fn deactivation_needs_a_reason() {
        let db_pool = testing::pool().await;
        let admin = admin(&db_pool).await;
        let sam = registered(&db_pool, "sam@example.com").await;

        let err = deactivate(&db_pool, &admin, sam.id, "  ").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::MissingField("reason")));

        let err = deactivate(&db_pool, &admin, admin.id(), "bored").await.unwrap_err();
        assert!(matches!(err.rejection(), Some(Rejection::Invalid(_))));

        let err = deactivate(&db_pool, &admin, Uuid::now_v7(), "gone").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotFound("user")));
    }

    #[tokio::test]
    async fn search_and_update() {
        let db_pool = testing::pool().await;
        admin(&db_pool).await;
        let sam = registered(&db_pool, "sam@example.com").await;

        let found = list_users(&db_pool, Some("sa")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(list_users(&db_pool, None).await.unwrap().len(), 2);

        let update = UserUpdate { role: Some(Role::Mentor), bio: Some("".to_owned()), ..Default::default() };
        let profile = update_user(&db_pool, sam.id, update).await.unwrap();
        assert_eq!(profile.role, Role::Mentor);
        assert_eq!(profile.name.as_deref(), Some("Sam"));
        assert_eq!(Profile::find(&db_pool, sam.id).await.unwrap().unwrap(), profile);
    }

    #[tokio::test]
    async fn deleting_cascades_but_never_yourself() {
        let db_pool = testing::pool().await;
        let admin = admin(&db_pool).await;
        let sam = registered(&db_pool, "sam@example.com").await;

        let err = delete_user(&db_pool, &admin, admin.id()).await.unwrap_err();
        assert!(matches!(err.rejection(), Some(Rejection::Invalid(_))));

        delete_user(&db_pool, &admin, sam.id).await.unwrap();
        assert!(Profile::find(&db_pool, sam.id).await.unwrap().is_none());
        let err = authenticate(&db_pool, "sam@example.com", "secret123").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::InvalidCredentials));

        let err = delete_user(&db_pool, &admin, sam.id).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotFound("user")));
    }
}

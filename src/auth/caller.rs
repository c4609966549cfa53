use axum::{debug_handler, extract::{FromRef, FromRequestParts}, http::request::Parts, Json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{db::Profile, guard::{self, Access, Gate}, session::USER_ID, AppError, AppResult, Rejection};

/// The authenticated user behind a request, handed explicitly to every
/// operation that acts on their behalf.
#[derive(Debug, Clone)]
pub struct Caller(pub Profile);

impl Caller {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn profile(&self) -> &Profile {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.0.is_admin
    }

    pub fn require(&self, gate: Gate) -> Result<(), Rejection> {
        match guard::decide(gate, Some(&self.0)) {
            Access::Allow => Ok(()),
            Access::Redirect(redirect) => Err(Rejection::Forbidden { redirect }),
        }
    }

    /// `None` when nobody is logged in. A deactivated account loses its
    /// session here, the same way login refuses it.
    pub async fn load(db_pool: &SqlitePool, session: &Session) -> AppResult<Option<Caller>> {
        let Some(user_id) = session.get::<Uuid>(USER_ID).await? else {
            return Ok(None);
        };
        let Some(profile) = Profile::find(db_pool, user_id).await? else {
            session.flush().await?;
            return Ok(None);
        };
        if !profile.is_active {
            session.flush().await?;
            return Err(Rejection::Deactivated(profile.deactivated_reason))?;
        }

        Ok(Some(Caller(profile)))
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::from(msg))?;
        let db_pool = SqlitePool::from_ref(state);

        Caller::load(&db_pool, &session)
            .await?
            .ok_or_else(|| Rejection::Unauthenticated.into())
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn me(caller: Caller) -> Json<Profile> {
    Json(caller.0)
}

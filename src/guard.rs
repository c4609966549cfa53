//! Which client paths need which kind of user, and where everyone else goes.

use axum::{debug_handler, extract::{Query, State}, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{auth::Caller, db::{Profile, Role}, AppResult, Rejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    Public,
    Authenticated,
    Student,
    Mentor,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Redirect(&'static str),
}

pub fn dashboard(role: Role) -> &'static str {
    match role {
        Role::Student => "/student/dashboard",
        Role::Mentor => "/mentor/dashboard",
    }
}

pub fn decide(gate: Gate, caller: Option<&Profile>) -> Access {
    if gate == Gate::Public {
        return Access::Allow;
    }
    let Some(caller) = caller else {
        return Access::Redirect("/login");
    };

    // admins are kept to the admin console
    if caller.is_admin {
        return match gate {
            Gate::Admin => Access::Allow,
            _ => Access::Redirect("/admin"),
        };
    }

    match (gate, caller.role) {
        (Gate::Authenticated, _)
        | (Gate::Student, Role::Student)
        | (Gate::Mentor, Role::Mentor) => Access::Allow,
        _ => Access::Redirect(dashboard(caller.role)),
    }
}

/// Gate for a client-visible path. Unknown paths are public (they 404 on the client).
pub fn gate_for(path: &str) -> Gate {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|x| !x.is_empty()).collect();

    match segments.as_slice() {
        [] | ["mentors"] | ["login"] | ["register"] => Gate::Public,
        ["student", "dashboard" | "sessions"] => Gate::Student,
        ["mentor", "dashboard" | "requests" | "sessions"] => Gate::Mentor,
        ["mentor", _] => Gate::Public,
        ["admin", ..] => Gate::Admin,
        ["profile"] | ["chat"] | ["book-session", _] | ["mentor-profile", _] => Gate::Authenticated,
        _ => Gate::Public,
    }
}

#[derive(Deserialize)]
pub(crate) struct AccessQuery {
    path: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccessDecision {
    gate: Gate,
    allow: bool,
    redirect: Option<&'static str>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn access(
    Query(AccessQuery { path }): Query<AccessQuery>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<AccessDecision>> {
    // a deactivated session is already flushed; treat it as logged out
    let caller = match Caller::load(&db_pool, &session).await {
        Ok(caller) => caller,
        Err(e) if matches!(e.rejection(), Some(Rejection::Deactivated(_))) => None,
        Err(e) => return Err(e),
    };
    let gate = gate_for(&path);

    Ok(Json(match decide(gate, caller.as_ref().map(Caller::profile)) {
        Access::Allow => AccessDecision { gate, allow: true, redirect: None },
        Access::Redirect(to) => AccessDecision { gate, allow: false, redirect: Some(to) },
    }))
}

mod lifecycle;
mod list;

use axum::{routing::get, Router};

use crate::AppState;

pub use lifecycle::{cancel, create, delete, NewSession};
pub use list::{all_sessions, sessions_for, SessionBuckets};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::mine))
}

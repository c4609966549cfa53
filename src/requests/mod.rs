mod queue;
mod resolve;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use queue::{all_requests, pending_for_mentor};
pub use resolve::{accept, decline};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(queue::pending))
        .route("/{id}/accept", post(resolve::accept_handler))
        .route("/{id}/decline", post(resolve::decline_handler))
}

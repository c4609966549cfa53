mod eligibility;
mod request;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use eligibility::{check_eligibility, slot_taken};
pub use request::{request_session, BookingForm};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(request::create))
        .route("/check", get(request::check_handler))
}

//! The admin console. Every handler here sits behind the admin gate.

mod bookings;
mod users;

use axum::{routing::{delete, get, post, put}, Router};

use crate::AppState;

pub use users::{activate, deactivate, delete_user, list_users, update_user, UserUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(users::list))
        .route("/users/{id}", put(users::update).delete(users::remove))
        .route("/users/{id}/deactivate", post(users::deactivate_handler))
        .route("/users/{id}/activate", post(users::activate_handler))
        .route("/requests", get(bookings::list_requests))
        .route("/requests/{id}/accept", post(bookings::accept_request))
        .route("/requests/{id}/decline", post(bookings::decline_request))
        .route("/sessions", get(bookings::list_sessions).post(bookings::create_session))
        .route("/sessions/{id}", delete(bookings::delete_session))
        .route("/sessions/{id}/cancel", post(bookings::cancel_session))
}

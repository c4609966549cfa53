use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn rejection(&self) -> Option<&Rejection> {
        self.0.downcast_ref::<Rejection>()
    }
}

/// Outcomes the user is told about directly. Anything else is a backend
/// failure and surfaces as a 500 with the backend's own message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("please fill in {0}")]
    MissingField(&'static str),
    #[error("{0}")]
    Invalid(String),

    #[error("that time is in the past")]
    PastTime,
    #[error("the mentor is not available at that time")]
    OutsideAvailability,
    #[error("that time slot is already booked")]
    SlotTaken,
    #[error("this request has already been resolved")]
    AlreadyResolved,

    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("this account has been deactivated: {}", .0.as_deref().unwrap_or("no reason given"))]
    Deactivated(Option<String>),
    #[error("please log in")]
    Unauthenticated,
    #[error("you can't go there")]
    Forbidden { redirect: &'static str },

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        use Rejection::*;
        match self {
            MissingField(_) | Invalid(_) => StatusCode::BAD_REQUEST,
            PastTime | OutsideAvailability => StatusCode::UNPROCESSABLE_ENTITY,
            SlotTaken | AlreadyResolved | EmailTaken => StatusCode::CONFLICT,
            InvalidCredentials | Unauthenticated => StatusCode::UNAUTHORIZED,
            Deactivated(_) | Forbidden { .. } => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            Rejection::Unauthenticated => Some("/login"),
            Rejection::Forbidden { redirect } => Some(*redirect),
            _ => None,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = match self.redirect() {
            Some(redirect) => json!({ "error": self.to_string(), "redirect": redirect }),
            None => json!({ "error": self.to_string() }),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(rejection) = self.rejection() {
            return rejection.clone().into_response();
        }

        tracing::error!(error = %self.0, backtrace = %self.0.backtrace(), "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(Rejection);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(sqlx::migrate::MigrateError);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(std::io::Error);

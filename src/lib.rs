pub mod admin;
pub mod appresult;
pub mod auth;
pub mod avatars;
pub mod booking;
pub mod chats;
pub mod config;
pub mod db;
pub mod feed;
pub mod guard;
pub mod profiles;
pub mod requests;
pub mod session;
pub mod sessions;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::FromRef,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::get,
    Router,
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult, Rejection};

use crate::{avatars::AvatarStore, config::Config, feed::ChangeFeed};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub feed: ChangeFeed,
    pub avatars: AvatarStore,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> AppState {
        AppState {
            db_pool,
            feed: ChangeFeed::new(256),
            avatars: AvatarStore::new(&config.avatar_dir),
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.cookie_secure)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_inactivity_minutes)));

    let mut app = Router::new()
        .nest("/api/auth", auth::router())
        .route("/api/access", get(guard::access))
        .nest("/api/bookings", booking::router())
        .nest("/api/requests", requests::router())
        .nest("/api/sessions", sessions::router())
        .nest("/api/mentors", profiles::mentors_router())
        .nest("/api/profile", profiles::router())
        .nest("/api/chats", chats::router())
        .nest("/api/admin", admin::router())
        .nest_service(avatars::PUBLIC_PREFIX, ServeDir::new(state.avatars.root()))
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = &config.allowed_origin {
        let origin: HeaderValue = origin
            .parse()
            .with_context(|| format!("ALLOWED_ORIGIN {origin:?} is not a valid origin"))?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([CONTENT_TYPE]),
        );
    }

    Ok(app)
}

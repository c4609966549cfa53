mod chat;
mod cursor;
mod msg;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use chat::{list, open, ChatSummary};
pub use cursor::{Observed, SeqCursor};
pub use msg::{messages, send};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(chat::list_handler).post(chat::open_handler))
        .route("/{id}/messages", get(msg::list_handler).post(msg::send_handler))
        .route("/{id}/ws", get(ws::chat_ws))
}

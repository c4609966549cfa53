use axum::{
    debug_handler,
    extract::{ws::Message, Path, Query, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    auth::Caller,
    db::ChatMessage,
    feed::{ChangeEvent, ChangeFeed, Notification, Subscription},
    guard::Gate,
    AppResult, AppState, Rejection,
};

use super::{
    chat::load_for,
    cursor::{Observed, SeqCursor},
    msg::{backlog, send, AfterQuery},
};

#[derive(Debug, Deserialize)]
struct ClientFrame {
    text: String,
}

/// Relays one chat's messages to one socket, in sequence order.
struct Relay {
    db_pool: SqlitePool,
    chat_id: Uuid,
    cursor: SeqCursor,
}

impl Relay {
    async fn push<S>(outbox: &mut S, message: ChatMessage) -> AppResult<()>
    where
        S: Sink<Message, Error = axum::Error> + Unpin,
    {
        let frame = serde_json::to_string(&ChangeEvent::MessageInserted { message })?;
        outbox.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    /// Sends everything after the cursor straight from the database.
    async fn catch_up<S>(&mut self, outbox: &mut S) -> AppResult<()>
    where
        S: Sink<Message, Error = axum::Error> + Unpin,
    {
        for message in backlog(&self.db_pool, self.chat_id, self.cursor.last()).await? {
            self.cursor.advance(message.seq);
            Relay::push(outbox, message).await?;
        }
        Ok(())
    }

    async fn handle<S>(&mut self, notification: Notification, outbox: &mut S) -> AppResult<()>
    where
        S: Sink<Message, Error = axum::Error> + Unpin,
    {
        let chat_id = self.chat_id;
        match notification {
            Notification::Event(ChangeEvent::MessageInserted { message }) => match self.cursor.observe(message.seq) {
                Observed::Deliver => Relay::push(outbox, message).await,
                Observed::Duplicate => Ok(()),
                Observed::Gap => {
                    tracing::debug!(%chat_id, last = self.cursor.last(), seq = message.seq, "gap in feed, refetching");
                    self.catch_up(outbox).await
                }
            },
            Notification::Lagged => {
                tracing::debug!(%chat_id, last = self.cursor.last(), "feed lagged, refetching");
                self.catch_up(outbox).await
            }
        }
    }

    /// The subscription is taken before the backlog is read, so an insert
    /// landing in between shows up as a duplicate instead of going missing.
    async fn run<S>(mut self, mut subscription: Subscription, mut outbox: S) -> AppResult<()>
    where
        S: Sink<Message, Error = axum::Error> + Unpin,
    {
        self.catch_up(&mut outbox).await?;
        while let Some(notification) = subscription.next().await {
            self.handle(notification, &mut outbox).await?;
        }
        Ok(())
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn chat_ws(
    Path(chat_id): Path<Uuid>,
    Query(AfterQuery { after }): Query<AfterQuery>,
    State(db_pool): State<SqlitePool>,
    State(feed): State<ChangeFeed>,
    caller: Caller,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    caller.require(Gate::Authenticated)?;
    let mut conn = db_pool.acquire().await?;
    load_for(&mut conn, &caller, chat_id).await?;
    drop(conn);

    Ok(ws.on_upgrade(async move |socket| {
        tracing::info!(%chat_id, user_id = %caller.id(), "chat socket opened");
        let subscription = feed.subscribe(chat_id);
        let (outbox, mut inbox) = socket.split();

        let relay = Relay {
            db_pool: db_pool.clone(),
            chat_id,
            cursor: SeqCursor::new(after.unwrap_or(0)),
        };
        let mut relay_task = tokio::spawn(relay.run(subscription, outbox));

        loop {
            tokio::select! {
                frame = inbox.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(ClientFrame { text }) = serde_json::from_str(text.as_str()) else {
                            continue;
                        };
                        if let Err(e) = send(&db_pool, &feed, &caller, chat_id, &text).await {
                            tracing::warn!(%chat_id, error = %e.0, "message from socket refused");
                            if let Some(Rejection::Deactivated(_)) = e.rejection() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                result = &mut relay_task => {
                    if let Ok(Err(e)) = result {
                        tracing::debug!(%chat_id, error = %e.0, "chat socket relay ended");
                    }
                    break;
                }
            }
        }

        relay_task.abort();
        tracing::info!(%chat_id, user_id = %caller.id(), "chat socket closed");
    }))
}

use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::Caller,
    db::{self, ChatMessage},
    feed::{ChangeEvent, ChangeFeed},
    guard::Gate,
    AppResult, AppState, Rejection,
};

use super::chat::load_for;

/// Messages of a chat after `after`, in sequence order. No access check.
pub(crate) async fn backlog(db_pool: &SqlitePool, chat_id: Uuid, after: i64) -> sqlx::Result<Vec<ChatMessage>> {
    sqlx::query_as(
        "SELECT m.id,m.chat_id,m.seq,m.sender_id,COALESCE(p.name,'User') AS sender_name,m.text,m.created_at \
         FROM messages m LEFT JOIN profiles p ON p.id=m.sender_id \
         WHERE m.chat_id=? AND m.seq>? ORDER BY m.seq",
    )
    .bind(chat_id)
    .bind(after)
    .fetch_all(db_pool)
    .await
}

pub async fn messages(db_pool: &SqlitePool, caller: &Caller, chat_id: Uuid, after: Option<i64>) -> AppResult<Vec<ChatMessage>> {
    let mut conn = db_pool.acquire().await?;
    load_for(&mut conn, caller, chat_id).await?;
    drop(conn);
    Ok(backlog(db_pool, chat_id, after.unwrap_or(0)).await?)
}

/// Appends a message, moves the chat preview along, and tells the feed.
pub async fn send(db_pool: &SqlitePool, feed: &ChangeFeed, caller: &Caller, chat_id: Uuid, text: &str) -> AppResult<ChatMessage> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Rejection::MissingField("message"))?;
    }

    let mut tx = db::begin_write(db_pool).await?;
    load_for(&mut tx, caller, chat_id).await?;

    // a socket keeps the caller it was opened with, so look again
    let (is_active, reason): (bool, Option<String>) =
        sqlx::query_as("SELECT is_active,deactivated_reason FROM profiles WHERE id=?")
            .bind(caller.id())
            .fetch_one(&mut *tx)
            .await?;
    if !is_active {
        return Err(Rejection::Deactivated(reason))?;
    }

    let created_at = OffsetDateTime::now_utc();
    sqlx::query("UPDATE chats SET last_message=?, last_message_at=? WHERE id=?")
        .bind(text)
        .bind(created_at)
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;

    let (seq,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(seq),0)+1 FROM messages WHERE chat_id=?")
        .bind(chat_id)
        .fetch_one(&mut *tx)
        .await?;

    let message = ChatMessage {
        id: Uuid::now_v7(),
        chat_id,
        seq,
        sender_id: caller.id(),
        sender_name: caller.profile().display_name().to_owned(),
        text: text.to_owned(),
        created_at,
    };
    sqlx::query("INSERT INTO messages (id,chat_id,seq,sender_id,text,created_at) VALUES (?,?,?,?,?,?)")
        .bind(message.id)
        .bind(message.chat_id)
        .bind(message.seq)
        .bind(message.sender_id)
        .bind(&message.text)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::debug!(%chat_id, seq, sender_id = %message.sender_id, "message sent");
    feed.publish(ChangeEvent::MessageInserted { message: message.clone() });
    Ok(message)
}

#[derive(Debug, Deserialize)]
pub(crate) struct AfterQuery {
    pub(crate) after: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendForm {
    pub(crate) text: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(chat_id): Path<Uuid>,
    Query(AfterQuery { after }): Query<AfterQuery>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    caller.require(Gate::Authenticated)?;
    Ok(Json(messages(&db_pool, &caller, chat_id, after).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_handler(
    State(db_pool): State<SqlitePool>,
    State(feed): State<ChangeFeed>,
    caller: Caller,
    Path(chat_id): Path<Uuid>,
    Json(SendForm { text }): Json<SendForm>,
) -> AppResult<(StatusCode, Json<ChatMessage>)> {
    caller.require(Gate::Authenticated)?;
    let message = send(&db_pool, &feed, &caller, chat_id, &text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use crate::{
        chats::open,
        db::{testing, Role},
        feed::Notification,
    };

    use super::*;

    struct Pair {
        db_pool: SqlitePool,
        student: Caller,
        mentor: Caller,
        chat_id: Uuid,
    }

    async fn pair() -> Pair {
        let db_pool = testing::pool().await;
        let student = testing::user(&db_pool, "Student", Role::Student).await;
        let mentor = testing::user(&db_pool, "Mentor", Role::Mentor).await;
        let student = testing::caller(&db_pool, student).await;
        let mentor = testing::caller(&db_pool, mentor).await;
        let chat_id = open(&db_pool, &student, mentor.id()).await.unwrap().id;
        Pair { db_pool, student, mentor, chat_id }
    }

    #[tokio::test]
    async fn messages_get_consecutive_seqs() {
        let Pair { db_pool, student, mentor, chat_id } = pair().await;
        let feed = ChangeFeed::new(8);
        let mut subscription = feed.subscribe(chat_id);

        let first = send(&db_pool, &feed, &student, chat_id, "  hi  ").await.unwrap();
        let second = send(&db_pool, &feed, &mentor, chat_id, "hello").await.unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
        assert_eq!(first.text, "hi");
        assert_eq!(second.sender_name, "Mentor");

        let Some(Notification::Event(ChangeEvent::MessageInserted { message })) = subscription.next().await else {
            panic!("expected the first insert");
        };
        assert_eq!(message, first);

        let ids = |list: Vec<ChatMessage>| list.into_iter().map(|x| (x.id, x.seq, x.text)).collect::<Vec<_>>();
        let all = messages(&db_pool, &student, chat_id, None).await.unwrap();
        assert_eq!(ids(all), vec![(first.id, 1, "hi".to_owned()), (second.id, 2, "hello".to_owned())]);
        let newer = messages(&db_pool, &mentor, chat_id, Some(1)).await.unwrap();
        assert_eq!(ids(newer), vec![(second.id, 2, "hello".to_owned())]);
    }

    #[tokio::test]
    async fn blank_messages_are_refused() {
        let Pair { db_pool, student, chat_id, .. } = pair().await;
        let feed = ChangeFeed::new(8);

        let err = send(&db_pool, &feed, &student, chat_id, " \n ").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::MissingField("message")));
        assert!(backlog(&db_pool, chat_id, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deactivated_senders_are_refused() {
        let Pair { db_pool, student, chat_id, .. } = pair().await;
        let feed = ChangeFeed::new(8);
        send(&db_pool, &feed, &student, chat_id, "before").await.unwrap();

        sqlx::query("UPDATE profiles SET is_active=FALSE, deactivated_reason='spam' WHERE id=?")
            .bind(student.id())
            .execute(&db_pool)
            .await
            .unwrap();

        let err = send(&db_pool, &feed, &student, chat_id, "after").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::Deactivated(Some("spam".to_owned()))));
        assert_eq!(backlog(&db_pool, chat_id, 0).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_on_a_file_database_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("chat.db").display());
        let db_pool = db::connect(&url).await.unwrap();

        let student = testing::user(&db_pool, "Student", Role::Student).await;
        let mentor = testing::user(&db_pool, "Mentor", Role::Mentor).await;
        let student = testing::caller(&db_pool, student).await;
        let chat_id = open(&db_pool, &student, mentor).await.unwrap().id;
        let feed = ChangeFeed::new(128);

        let texts: Vec<String> = (0..48).map(|i| format!("message {i}")).collect();
        let results = futures_util::future::join_all(
            texts.iter().map(|text| send(&db_pool, &feed, &student, chat_id, text)),
        )
        .await;
        for result in results {
            result.unwrap();
        }

        let seqs: Vec<i64> = backlog(&db_pool, chat_id, 0).await.unwrap().into_iter().map(|x| x.seq).collect();
        assert_eq!(seqs, (1..=48).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn outsiders_cannot_read_or_write() {
        let Pair { db_pool, chat_id, .. } = pair().await;
        let feed = ChangeFeed::new(8);
        let outsider = testing::user(&db_pool, "Outsider", Role::Student).await;
        let outsider = testing::caller(&db_pool, outsider).await;

        let err = send(&db_pool, &feed, &outsider, chat_id, "hi").await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotFound("chat")));
        let err = messages(&db_pool, &outsider, chat_id, None).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotFound("chat")));
    }
}

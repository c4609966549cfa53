use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::Caller,
    db::{Chat, Profile, Role},
    guard::Gate,
    AppResult, AppState, Rejection,
};

pub(crate) const CHAT_COLUMNS: &str = "id,mentor_id,student_id,last_message,last_message_at,created_at";

/// A chat as its participant sees it in the list, with the other side's face.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ChatSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub chat: Chat,
    pub other_id: Uuid,
    pub other_name: Option<String>,
    pub other_image_url: Option<String>,
}

/// Loads a chat the caller takes part in. Other people's chats look missing.
pub(crate) async fn load_for(conn: &mut SqliteConnection, caller: &Caller, chat_id: Uuid) -> AppResult<Chat> {
    let chat: Option<Chat> = sqlx::query_as(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id=?"))
        .bind(chat_id)
        .fetch_optional(&mut *conn)
        .await?;

    match chat {
        Some(chat) if chat.has_participant(caller.id()) => Ok(chat),
        _ => Err(Rejection::NotFound("chat"))?,
    }
}

/// The chat between the caller and `other_id`, created on first use.
pub async fn open(db_pool: &SqlitePool, caller: &Caller, other_id: Uuid) -> AppResult<Chat> {
    let other = Profile::find(db_pool, other_id).await?.ok_or(Rejection::NotFound("user"))?;
    let (mentor_id, student_id) = match (caller.profile().role, other.role) {
        (Role::Mentor, Role::Student) => (caller.id(), other.id),
        (Role::Student, Role::Mentor) => (other.id, caller.id()),
        _ => return Err(Rejection::Invalid("chats are between a mentor and a student".to_owned()))?,
    };

    let created = sqlx::query(
        "INSERT INTO chats (id,mentor_id,student_id,created_at) VALUES (?,?,?,?) \
         ON CONFLICT (mentor_id,student_id) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(mentor_id)
    .bind(student_id)
    .bind(OffsetDateTime::now_utc())
    .execute(db_pool)
    .await?
    .rows_affected();
    if created > 0 {
        tracing::info!(%mentor_id, %student_id, "chat opened");
    }

    Ok(sqlx::query_as(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE mentor_id=? AND student_id=?"))
        .bind(mentor_id)
        .bind(student_id)
        .fetch_one(db_pool)
        .await?)
}

/// The caller's chats, most recently active first. Chats with no messages yet
/// go last.
pub async fn list(db_pool: &SqlitePool, caller: &Caller) -> sqlx::Result<Vec<ChatSummary>> {
    sqlx::query_as(
        "SELECT c.id,c.mentor_id,c.student_id,c.last_message,c.last_message_at,c.created_at,\
         o.id AS other_id,o.name AS other_name,o.profile_image_url AS other_image_url \
         FROM chats c \
         JOIN profiles o ON o.id = CASE WHEN c.mentor_id=?1 THEN c.student_id ELSE c.mentor_id END \
         WHERE c.mentor_id=?1 OR c.student_id=?1 \
         ORDER BY c.last_message_at IS NULL, c.last_message_at DESC, c.created_at DESC",
    )
    .bind(caller.id())
    .fetch_all(db_pool)
    .await
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenForm {
    with: Uuid,
}

#[debug_handler(state = AppState)]
pub(crate) async fn open_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(OpenForm { with }): Json<OpenForm>,
) -> AppResult<Json<Chat>> {
    caller.require(Gate::Authenticated)?;
    Ok(Json(open(&db_pool, &caller, with).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<Vec<ChatSummary>>> {
    caller.require(Gate::Authenticated)?;
    Ok(Json(list(&db_pool, &caller).await?))
}

#[cfg(test)]
mod tests {
    use crate::{chats::send, db::testing, feed::ChangeFeed};

    use super::*;

    #[tokio::test]
    async fn open_is_get_or_create() {
        let db_pool = testing::pool().await;
        let student = testing::user(&db_pool, "Student", Role::Student).await;
        let mentor = testing::user(&db_pool, "Mentor", Role::Mentor).await;
        let student = testing::caller(&db_pool, student).await;
        let mentor = testing::caller(&db_pool, mentor).await;

        let first = open(&db_pool, &student, mentor.id()).await.unwrap();
        let second = open(&db_pool, &mentor, student.id()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.mentor_id, mentor.id());
        assert_eq!(first.student_id, student.id());

        let other_student = testing::user(&db_pool, "Other", Role::Student).await;
        let err = open(&db_pool, &student, other_student).await.unwrap_err();
        assert!(matches!(err.rejection(), Some(Rejection::Invalid(_))));

        let err = open(&db_pool, &student, Uuid::now_v7()).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotFound("user")));
    }

    #[tokio::test]
    async fn list_puts_recent_chats_first() {
        let db_pool = testing::pool().await;
        let feed = ChangeFeed::new(8);
        let mentor = testing::user(&db_pool, "Mentor", Role::Mentor).await;
        let mentor = testing::caller(&db_pool, mentor).await;
        let mut chats = Vec::new();
        for name in ["Quiet", "Early", "Late"] {
            let student = testing::user(&db_pool, name, Role::Student).await;
            chats.push(open(&db_pool, &mentor, student).await.unwrap());
        }

        send(&db_pool, &feed, &mentor, chats[1].id, "first").await.unwrap();
        send(&db_pool, &feed, &mentor, chats[2].id, "second").await.unwrap();

        let listed = list(&db_pool, &mentor).await.unwrap();
        let names: Vec<_> = listed.iter().map(|x| x.other_name.as_deref().unwrap_or_default()).collect();
        assert_eq!(names, vec!["Late", "Early", "Quiet"]);
        assert_eq!(listed[0].chat.last_message.as_deref(), Some("second"));
        assert_eq!(listed[2].chat.last_message_at, None);
    }
}

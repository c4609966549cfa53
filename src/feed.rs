use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::db::ChatMessage;

/// Row-level change notifications. Only message inserts are published.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    MessageInserted { message: ChatMessage },
}

impl ChangeEvent {
    pub fn table(&self) -> &'static str {
        match self {
            ChangeEvent::MessageInserted { .. } => "messages",
        }
    }

    pub fn chat_id(&self) -> Uuid {
        match self {
            ChangeEvent::MessageInserted { message } => message.chat_id,
        }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> ChangeFeed {
        ChangeFeed { tx: broadcast::channel(capacity).0 }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // nobody listening is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, chat_id: Uuid) -> Subscription {
        Subscription { rx: self.tx.subscribe(), chat_id }
    }
}

#[derive(Debug, PartialEq)]
pub enum Notification {
    Event(ChangeEvent),
    /// The receiver fell behind and events were dropped.
    Lagged,
}

pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    chat_id: Uuid,
}

impl Subscription {
    /// Next notification for this chat, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.chat_id() == self.chat_id => return Some(Notification::Event(event)),
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => return Some(Notification::Lagged),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

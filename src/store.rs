//! Message store: durable, ordered persistence of direct messages.

use std::time::Instant;

use async_trait::async_trait;

use crate::error::{ChatError, ChatResult};
use crate::storage::{Db, DeleteOutcome, MessageRow, NewMessageRow};
use crate::types::{now_millis, Message, MessageContent, MessageId, UserId};

/// Durable message persistence.
///
/// `create` is atomic: after it returns (or fails) the message either exists
/// or it does not. A create that cannot commit before `deadline` fails and
/// leaves nothing behind. `history` is a fresh query each time, so repeating
/// it is always safe.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: MessageContent,
        deadline: Option<Instant>,
    ) -> ChatResult<Message>;

    /// Messages between `a` and `b` sorted by `created_at`, then id.
    async fn history(&self, a: &UserId, b: &UserId) -> ChatResult<Vec<Message>>;

    /// Hard-delete `id` if `requester` sent it.
    async fn delete_own(&self, id: MessageId, requester: &UserId) -> ChatResult<()>;
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId(row.id),
            sender_id: UserId(row.sender_id),
            receiver_id: UserId(row.receiver_id),
            content: MessageContent {
                text: row.text,
                image_ref: row.image_ref,
                audio_ref: row.audio_ref,
            },
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct SqliteMessageStore {
    db: Db,
}

impl SqliteMessageStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn create(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: MessageContent,
        deadline: Option<Instant>,
    ) -> ChatResult<Message> {
        let content = content.normalized();
        let row = NewMessageRow {
            sender_id: sender.0.clone(),
            receiver_id: receiver.0.clone(),
            text: content.text,
            image_ref: content.image_ref,
            audio_ref: content.audio_ref,
        };
        let now = now_millis();
        let stored = self.db.run(move |s| s.insert_message(&row, now, deadline)).await?;
        Ok(stored.into())
    }

    async fn history(&self, a: &UserId, b: &UserId) -> ChatResult<Vec<Message>> {
        let (a, b) = (a.0.clone(), b.0.clone());
        let rows = self
            .db
            .run(move |s| s.list_conversation_messages(&a, &b))
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn delete_own(&self, id: MessageId, requester: &UserId) -> ChatResult<()> {
        let requester = requester.0.clone();
        let outcome = self
            .db
            .run(move |s| s.delete_own_message(id.0, &requester))
            .await?;
        match outcome {
            DeleteOutcome::Deleted => Ok(()),
            DeleteOutcome::NotFound => Err(ChatError::NotFound),
            DeleteOutcome::Forbidden => Err(ChatError::Forbidden),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn store() -> SqliteMessageStore {
        SqliteMessageStore::new(Db::new(Storage::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn history_is_ordered_and_scoped_to_the_pair() {
        let store = store();
        let (a, b, c) = (UserId::from("a"), UserId::from("b"), UserId::from("c"));

        let mut expected = Vec::new();
        for i in 0..5 {
            let (from, to) = if i % 2 == 0 { (&a, &b) } else { (&b, &a) };
            expected.push(store.create(from, to, MessageContent::text(format!("m{i}")), None).await.unwrap().id);
            store.create(&a, &c, MessageContent::text("noise"), None).await.unwrap();
        }

        let history = store.history(&a, &b).await.unwrap();
        let ids: Vec<_> = history.iter().map(|m| m.id).collect();
        assert_eq!(ids, expected);
        assert!(history.iter().all(|m| m.is_between(&a, &b)));
        assert!(history
            .windows(2)
            .all(|w| (w[0].created_at, w[0].id) <= (w[1].created_at, w[1].id)));

        // Restartable: a second query yields the same sequence.
        assert_eq!(store.history(&b, &a).await.unwrap(), history);
    }

    #[tokio::test]
    async fn create_stores_blank_fields_as_absent() {
        let store = store();
        let content = MessageContent {
            text: Some(" ".to_string()),
            image_ref: Some("https://cdn/x.png".to_string()),
            audio_ref: None,
        };
        let message = store
            .create(&UserId::from("a"), &UserId::from("b"), content, None)
            .await
            .unwrap();
        assert_eq!(message.content.text, None);
        assert_eq!(message.content.image_ref.as_deref(), Some("https://cdn/x.png"));
    }

    #[tokio::test]
    async fn delete_own_enforces_sender() {
        let store = store();
        let (a, b) = (UserId::from("a"), UserId::from("b"));
        let message = store.create(&a, &b, MessageContent::text("hi"), None).await.unwrap();

        assert!(matches!(
            store.delete_own(message.id, &b).await,
            Err(ChatError::Forbidden)
        ));
        assert_eq!(store.history(&a, &b).await.unwrap().len(), 1);

        store.delete_own(message.id, &a).await.unwrap();
        assert!(store.history(&a, &b).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_own(message.id, &a).await,
            Err(ChatError::NotFound)
        ));
    }
}

//! Delivery pipeline: persist first, then push live.
//!
//! A message is never pushed to a connection unless it is already
//! retrievable through history. Whether the push lands is advisory only.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ChatError, ChatResult};
use crate::logging;
use crate::presence::PresenceRegistry;
use crate::store::MessageStore;
use crate::types::{LiveEvent, Message, MessageContent, UserId};

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: Message,
    /// Whether at least one of the receiver's live connections accepted it.
    pub delivered: bool,
}

pub struct DeliveryPipeline {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
    store_timeout: Duration,
}

impl DeliveryPipeline {
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: Arc<PresenceRegistry>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            presence,
            store_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Persist `content` from `sender` to `receiver`, then push it to the
    /// receiver's live connections.
    ///
    /// Fails with `InvalidContent` before touching the store when the content
    /// is empty, and with `StoreUnavailable` when persistence fails or does
    /// not finish within the store timeout. An offline receiver is not an
    /// error.
    pub async fn send_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: MessageContent,
    ) -> ChatResult<SendOutcome> {
        if content.is_empty() {
            return Err(ChatError::InvalidContent);
        }

        // An insert still running when the timeout fires rolls back at the
        // same deadline.
        let deadline = Instant::now() + self.store_timeout;
        let create = self.store.create(sender, receiver, content, Some(deadline));
        let message = match tokio::time::timeout(self.store_timeout, create).await {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => {
                tracing::error!(
                    "send: persisting message from {} failed: {}",
                    logging::user_id(sender.as_str()),
                    e
                );
                return Err(match e {
                    ChatError::StoreUnavailable(_) => e,
                    other => ChatError::StoreUnavailable(other.to_string()),
                });
            }
            Err(_) => {
                tracing::error!(
                    "send: store did not answer within {}ms",
                    self.store_timeout.as_millis()
                );
                return Err(ChatError::StoreUnavailable(format!(
                    "store timed out after {}ms",
                    self.store_timeout.as_millis()
                )));
            }
        };

        let delivered = self.presence.send_to(
            receiver,
            LiveEvent::NewMessage {
                message: message.clone(),
            },
        );

        tracing::info!(
            "send: {} from {} to {} ({})",
            logging::msg_id(message.id.0),
            logging::user_id(sender.as_str()),
            logging::user_id(receiver.as_str()),
            if delivered { "delivered" } else { "stored for later" }
        );

        Ok(SendOutcome { message, delivered })
    }
}

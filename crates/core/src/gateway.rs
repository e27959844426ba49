//! Persistence gateway seam.
//!
//! All durability is delegated to an external collaborator behind this
//! trait; the core owns no on-disk format. The relay calls `save_message`
//! off the broadcast path, and the session layer calls `fetch_messages` on
//! join and on reconnect resync.

use async_trait::async_trait;

use crate::error::DeliveryResult;
use crate::message::ChatMessage;

/// External durable store for chat messages.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Fetch the ordered message history of a room.
    ///
    /// `page` selects older history when the gateway paginates; `None`
    /// returns the most recent page.
    async fn fetch_messages(
        &self,
        chat_id: &str,
        page: Option<u32>,
    ) -> DeliveryResult<Vec<ChatMessage>>;

    /// Persist a message, returning a copy with the assigned id.
    async fn save_message(
        &self,
        chat_id: &str,
        message: &ChatMessage,
    ) -> DeliveryResult<ChatMessage>;
}

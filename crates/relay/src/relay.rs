//! Message relay: per-room fan-out plus asynchronous persistence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use partyline_core::{ChatMessage, DeliveryError, DeliveryResult, PersistenceGateway, ServerEvent};

use crate::registry::{ConnectionId, RoomRegistry};

/// Default bound on one persistence save; a gateway that never resolves
/// must not leave the sender's message permanently pending.
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts a send from one connection and fans it out to the other members
/// of the room, forwarding the message to the persistence gateway off the
/// broadcast path.
pub struct MessageRelay {
    registry: Arc<RoomRegistry>,
    gateway: Arc<dyn PersistenceGateway>,
    save_timeout: Duration,
}

impl MessageRelay {
    pub fn new(registry: Arc<RoomRegistry>, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            registry,
            gateway,
            save_timeout: DEFAULT_SAVE_TIMEOUT,
        }
    }

    pub fn with_save_timeout(mut self, save_timeout: Duration) -> Self {
        self.save_timeout = save_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Publish a message to a room.
    ///
    /// Fan-out happens under the room lock, so all members observe the
    /// messages of one room in the order `publish` was invoked. Members
    /// whose connections are gone are skipped silently and reaped. The
    /// origin connection is skipped — it already holds an optimistic copy,
    /// and its reconciliation buffer dedups any echo regardless.
    ///
    /// The persistence save is spawned off the caller's path; its outcome
    /// reaches the origin as `message_confirmed` or `save_failed`.
    ///
    /// Publishing to a room no connection has joined is a protocol error:
    /// nothing is delivered or persisted, and `NotJoined` is returned so
    /// the caller can tell the sender instead of leaving its optimistic
    /// copy pending forever.
    pub async fn publish(
        &self,
        chat_id: &str,
        message: ChatMessage,
        origin: ConnectionId,
    ) -> DeliveryResult<()> {
        let Some(room) = self.registry.existing_room(chat_id).await else {
            warn!(chat_id, "publish to room with no members");
            return Err(DeliveryError::not_joined(chat_id));
        };

        let mut origin_tx: Option<mpsc::Sender<ServerEvent>> = None;
        {
            let mut room = room.lock().await;
            let event = ServerEvent::MessageDelivered {
                chat_id: chat_id.to_string(),
                message: message.clone(),
            };

            let mut gone = Vec::new();
            for (connection_id, member) in room.members.iter() {
                if *connection_id == origin {
                    origin_tx = Some(member.tx.clone());
                    continue;
                }
                match member.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*connection_id),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // Best-effort fan-out: a member that cannot keep up
                        // misses this delivery and resyncs on reconnect.
                        warn!(chat_id, %connection_id, "member channel full, skipping delivery");
                    }
                }
            }
            for connection_id in gone {
                room.members.remove(&connection_id);
                debug!(chat_id, %connection_id, "reaped dead member");
            }
        }

        self.spawn_save(chat_id.to_string(), message, origin_tx);
        Ok(())
    }

    /// Relay a typing signal to the other members of a room.
    pub async fn publish_typing(
        &self,
        chat_id: &str,
        user_id: &str,
        is_typing: bool,
        origin: ConnectionId,
    ) {
        let Some(room) = self.registry.existing_room(chat_id).await else {
            return;
        };

        let event = ServerEvent::Typing {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
            is_typing,
        };

        let room = room.lock().await;
        for (connection_id, member) in room.members.iter() {
            if *connection_id == origin {
                continue;
            }
            let _ = member.tx.try_send(event.clone());
        }
    }

    /// Drive the persistence gateway with a bounded timeout and route the
    /// outcome back to the origin connection.
    fn spawn_save(
        &self,
        chat_id: String,
        message: ChatMessage,
        origin_tx: Option<mpsc::Sender<ServerEvent>>,
    ) {
        let gateway = self.gateway.clone();
        let save_timeout = self.save_timeout;

        tokio::spawn(async move {
            let outcome = timeout(save_timeout, gateway.save_message(&chat_id, &message)).await;

            let event = match outcome {
                Ok(Ok(saved)) => {
                    debug!(chat_id, message_id = ?saved.id, "message persisted");
                    ServerEvent::MessageConfirmed {
                        chat_id: chat_id.clone(),
                        message: saved,
                    }
                }
                Ok(Err(err)) => {
                    warn!(chat_id, error = %err, "persistence save failed");
                    let mut failed = message;
                    failed.mark_failed();
                    ServerEvent::SaveFailed {
                        chat_id: chat_id.clone(),
                        message: failed,
                    }
                }
                Err(_) => {
                    warn!(chat_id, "persistence save timed out");
                    let mut failed = message;
                    failed.mark_failed();
                    ServerEvent::SaveFailed {
                        chat_id: chat_id.clone(),
                        message: failed,
                    }
                }
            };

            if let Some(tx) = origin_tx {
                if tx.send(event).await.is_err() {
                    debug!(chat_id, "origin connection gone before save completed");
                }
            }
        });
    }
}

//! Session manager: the boundary between the UI layer and the transport.
//!
//! Owns the client side of every joined room: reconciliation buffers,
//! typing state, and the remote-typist roster. Constructed with an
//! explicit session context (the local user's identity) rather than
//! reading ambient global state, and with the outbound half of the
//! connection's event channel — the physical connect/reconnect lifecycle
//! belongs to the embedding transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use partyline_core::{
    validate_content, ChatMessage, ClientEvent, DeliveryError, DeliveryResult,
    PersistenceGateway, Sender, ServerEvent,
};

use crate::buffer::ReconciliationBuffer;
use crate::typing::{TypingRoster, TypingTracker};

/// Default bound on a history fetch from the persistence gateway.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of inbound event handling that the UI layer must act on.
///
/// Everything else (deliveries, confirmations, presence) is absorbed into
/// session state; a failed send is the one event that cannot be recovered
/// silently, because losing the user's text is unacceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The persistence save failed; the optimistic entry was rolled back
    /// and the original content should be restored to the input field.
    SendFailed { chat_id: String, content: String },
}

/// Client session over one logical connection.
pub struct SessionManager {
    identity: Sender,
    out: mpsc::Sender<ClientEvent>,
    gateway: Arc<dyn PersistenceGateway>,
    buffers: HashMap<String, ReconciliationBuffer>,
    typing: TypingTracker,
    roster: TypingRoster,
    fetch_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        identity: Sender,
        out: mpsc::Sender<ClientEvent>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let typing = TypingTracker::new(out.clone());
        Self {
            identity,
            out,
            gateway,
            buffers: HashMap::new(),
            typing,
            roster: TypingRoster::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Shrink the timing windows; used by tests.
    pub fn with_timing(mut self, fetch_timeout: Duration, typing_idle: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self.typing = TypingTracker::with_idle_after(self.out.clone(), typing_idle);
        self
    }

    pub fn identity(&self) -> &Sender {
        &self.identity
    }

    /// Join a room: register with the relay and fill the local log from
    /// the persistence gateway.
    pub async fn join_room(&mut self, chat_id: &str) -> DeliveryResult<()> {
        self.out
            .send(ClientEvent::JoinRoom {
                chat_id: chat_id.to_string(),
            })
            .await
            .map_err(|_| DeliveryError::transport("connection closed"))?;

        let buffer = self
            .buffers
            .entry(chat_id.to_string())
            .or_insert_with(|| ReconciliationBuffer::new(chat_id));

        let history = Self::fetch_history(&self.gateway, chat_id, self.fetch_timeout).await?;
        buffer.resync(history);
        Ok(())
    }

    /// Send a message: validate, show optimistically, emit to the relay,
    /// and force the typing state back to idle.
    ///
    /// Returns the optimistic message so the caller can correlate later
    /// notices. If the outbound channel is already closed the optimistic
    /// entry is rolled back immediately — it could never be confirmed.
    pub async fn send_message(
        &mut self,
        chat_id: &str,
        content: &str,
    ) -> DeliveryResult<ChatMessage> {
        validate_content(content)?;

        let buffer = self
            .buffers
            .get_mut(chat_id)
            .ok_or_else(|| DeliveryError::not_joined(chat_id))?;

        let message = ChatMessage::pending(chat_id, self.identity.clone(), content);
        buffer.append_optimistic(message.clone());

        self.typing.stop(chat_id).await;

        let send = self
            .out
            .send(ClientEvent::SendMessage {
                chat_id: chat_id.to_string(),
                content: content.to_string(),
                client_timestamp: message.created_at,
            })
            .await;

        if send.is_err() {
            if let Some(buffer) = self.buffers.get_mut(chat_id) {
                buffer.rollback(&message);
            }
            return Err(DeliveryError::transport("connection closed"));
        }

        Ok(message)
    }

    /// Keystroke activity in a room's input field.
    pub async fn keystroke(&self, chat_id: &str) {
        self.typing.keystroke(chat_id).await;
    }

    /// Explicit stop-typing, e.g. the input field lost focus.
    pub async fn stop_typing(&self, chat_id: &str) {
        self.typing.stop(chat_id).await;
    }

    /// Dispatch an inbound event from the relay.
    pub async fn handle_event(&mut self, event: ServerEvent) -> Option<SessionNotice> {
        match event {
            ServerEvent::MessageDelivered { chat_id, message } => {
                match self.buffers.get_mut(&chat_id) {
                    Some(buffer) => {
                        buffer.merge_incoming(message);
                    }
                    None => debug!(chat_id, "delivery for room not joined, dropped"),
                }
                None
            }
            ServerEvent::MessageConfirmed { chat_id, message } => {
                if let Some(buffer) = self.buffers.get_mut(&chat_id) {
                    buffer.apply_confirmation(&message);
                }
                None
            }
            ServerEvent::SaveFailed { chat_id, message } => {
                let restored = self
                    .buffers
                    .get_mut(&chat_id)
                    .and_then(|buffer| buffer.rollback(&message));
                restored.map(|content| SessionNotice::SendFailed { chat_id, content })
            }
            ServerEvent::Typing {
                chat_id,
                user_id,
                is_typing,
            } => {
                if user_id != self.identity.id {
                    self.roster.apply(&chat_id, &user_id, is_typing);
                }
                None
            }
            ServerEvent::Joined { chat_id } => {
                debug!(chat_id, "join acknowledged");
                None
            }
            ServerEvent::Hello { connection_id } => {
                debug!(connection_id, "connection established");
                None
            }
            ServerEvent::Error { message } => {
                warn!(message, "relay reported an error");
                None
            }
        }
    }

    /// Recover after the transport reconnected: replay every join and pull
    /// the history gap that opened while disconnected.
    pub async fn reconnect(&mut self) -> DeliveryResult<()> {
        let rooms: Vec<String> = self.buffers.keys().cloned().collect();
        for chat_id in rooms {
            self.out
                .send(ClientEvent::JoinRoom {
                    chat_id: chat_id.clone(),
                })
                .await
                .map_err(|_| DeliveryError::transport("connection closed"))?;

            let history = Self::fetch_history(&self.gateway, &chat_id, self.fetch_timeout).await?;
            if let Some(buffer) = self.buffers.get_mut(&chat_id) {
                buffer.resync(history);
            }
        }
        Ok(())
    }

    /// The message log for a room, in display order.
    pub fn messages(&self, chat_id: &str) -> &[ChatMessage] {
        self.buffers
            .get(chat_id)
            .map(|buffer| buffer.messages())
            .unwrap_or(&[])
    }

    /// Remote users currently typing in a room.
    pub fn typists(&mut self, chat_id: &str) -> Vec<String> {
        self.roster.typists(chat_id)
    }

    pub fn joined_rooms(&self) -> Vec<&str> {
        self.buffers.keys().map(String::as_str).collect()
    }

    async fn fetch_history(
        gateway: &Arc<dyn PersistenceGateway>,
        chat_id: &str,
        fetch_timeout: Duration,
    ) -> DeliveryResult<Vec<ChatMessage>> {
        match timeout(fetch_timeout, gateway.fetch_messages(chat_id, None)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::transport("history fetch timed out")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use partyline_relay::MemoryGateway;

    fn alice() -> Sender {
        Sender::new("alice", "Alice").with_avatar("https://cdn.example/alice.png")
    }

    fn manager_with(
        gateway: Arc<MemoryGateway>,
    ) -> (SessionManager, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (SessionManager::new(alice(), tx, gateway), rx)
    }

    #[tokio::test]
    async fn join_emits_event_and_loads_history() {
        let gateway = Arc::new(MemoryGateway::new());
        let seeded = ChatMessage::pending("r1", Sender::new("bob", "Bob"), "earlier");
        gateway.save_message("r1", &seeded).await.unwrap();

        let (mut session, mut rx) = manager_with(gateway);
        session.join_room("r1").await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            ClientEvent::JoinRoom { chat_id } if chat_id == "r1"
        ));
        assert_eq!(session.messages("r1").len(), 1);
        assert_eq!(session.messages("r1")[0].content, "earlier");
    }

    #[tokio::test]
    async fn send_message_is_optimistic_and_stops_typing() {
        let (mut session, mut rx) = manager_with(Arc::new(MemoryGateway::new()));
        session.join_room("r1").await.unwrap();
        let _ = rx.recv().await; // join event

        session.keystroke("r1").await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ClientEvent::Typing { is_typing: true, .. }
        ));

        let sent = session.send_message("r1", "hi").await.unwrap();
        assert!(sent.is_pending());
        assert_eq!(session.messages("r1").len(), 1);

        // Send cancels typing before the message goes out.
        assert!(matches!(
            rx.recv().await.unwrap(),
            ClientEvent::Typing { is_typing: false, .. }
        ));
        match rx.recv().await.unwrap() {
            ClientEvent::SendMessage { chat_id, content, .. } => {
                assert_eq!(chat_id, "r1");
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_requires_join_and_valid_content() {
        let (mut session, _rx) = manager_with(Arc::new(MemoryGateway::new()));

        assert!(matches!(
            session.send_message("r1", "hi").await.unwrap_err(),
            DeliveryError::NotJoined { .. }
        ));
        assert!(matches!(
            session.send_message("r1", "   ").await.unwrap_err(),
            DeliveryError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn save_failure_rolls_back_and_restores_content() {
        let (mut session, mut rx) = manager_with(Arc::new(MemoryGateway::new()));
        session.join_room("r1").await.unwrap();
        let _ = rx.recv().await;

        let sent = session.send_message("r1", "hi").await.unwrap();
        assert_eq!(session.messages("r1").len(), 1);

        let notice = session
            .handle_event(ServerEvent::SaveFailed {
                chat_id: "r1".to_string(),
                message: sent,
            })
            .await;

        assert_eq!(
            notice,
            Some(SessionNotice::SendFailed {
                chat_id: "r1".to_string(),
                content: "hi".to_string(),
            })
        );
        assert!(session.messages("r1").is_empty());
    }

    #[tokio::test]
    async fn relay_echo_of_own_message_is_deduplicated() {
        let (mut session, mut rx) = manager_with(Arc::new(MemoryGateway::new()));
        session.join_room("r1").await.unwrap();
        let _ = rx.recv().await;

        let sent = session.send_message("r1", "hi").await.unwrap();

        // The relay echoes the message back ~40ms later.
        let mut echo = sent.clone();
        echo.created_at = echo.created_at + ChronoDuration::milliseconds(40);
        session
            .handle_event(ServerEvent::MessageDelivered {
                chat_id: "r1".to_string(),
                message: echo,
            })
            .await;

        assert_eq!(session.messages("r1").len(), 1);
    }

    #[tokio::test]
    async fn confirmation_promotes_the_optimistic_entry() {
        let (mut session, mut rx) = manager_with(Arc::new(MemoryGateway::new()));
        session.join_room("r1").await.unwrap();
        let _ = rx.recv().await;

        let sent = session.send_message("r1", "hi").await.unwrap();
        let mut confirmed = sent.clone();
        confirmed.confirm("msg-1");

        session
            .handle_event(ServerEvent::MessageConfirmed {
                chat_id: "r1".to_string(),
                message: confirmed,
            })
            .await;

        let entry = &session.messages("r1")[0];
        assert!(entry.is_confirmed());
        assert_eq!(entry.id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn typing_events_update_roster_except_own() {
        let (mut session, mut rx) = manager_with(Arc::new(MemoryGateway::new()));
        session.join_room("r1").await.unwrap();
        let _ = rx.recv().await;

        session
            .handle_event(ServerEvent::Typing {
                chat_id: "r1".to_string(),
                user_id: "bob".to_string(),
                is_typing: true,
            })
            .await;
        session
            .handle_event(ServerEvent::Typing {
                chat_id: "r1".to_string(),
                user_id: "alice".to_string(), // own echo, ignored
                is_typing: true,
            })
            .await;

        assert_eq!(session.typists("r1"), vec!["bob"]);

        session
            .handle_event(ServerEvent::Typing {
                chat_id: "r1".to_string(),
                user_id: "bob".to_string(),
                is_typing: false,
            })
            .await;
        assert!(session.typists("r1").is_empty());
    }

    #[tokio::test]
    async fn reconnect_rejoins_rooms_and_pulls_missed_messages() {
        let gateway = Arc::new(MemoryGateway::new());
        let (mut session, mut rx) = manager_with(gateway.clone());
        session.join_room("r1").await.unwrap();
        let _ = rx.recv().await;

        // Published while this client was disconnected.
        let missed = ChatMessage::pending("r1", Sender::new("bob", "Bob"), "you there?");
        gateway.save_message("r1", &missed).await.unwrap();

        session.reconnect().await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            ClientEvent::JoinRoom { chat_id } if chat_id == "r1"
        ));
        assert_eq!(session.messages("r1").len(), 1);
        assert_eq!(session.messages("r1")[0].content, "you there?");
    }

    #[tokio::test]
    async fn closed_connection_rolls_back_the_optimistic_entry() {
        let (mut session, rx) = manager_with(Arc::new(MemoryGateway::new()));
        session.join_room("r1").await.unwrap();
        drop(rx);

        let err = session.send_message("r1", "hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport { .. }));
        assert!(session.messages("r1").is_empty());
    }
}

//! WebSocket boundary: one connection, one outbound channel, one dispatch
//! loop.
//!
//! Identity arrives with the upgrade request — the session/auth layer in
//! front of this server is the external collaborator that vouches for it.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use partyline_core::{validate_content, ChatMessage, ClientEvent, DeliveryState, Sender, ServerEvent};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    user_id: String,
    display_name: String,
    avatar_url: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Response {
    let identity = Sender {
        id: params.user_id,
        display_name: params.display_name,
        avatar_url: params.avatar_url,
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Sender) {
    let connection_id = Uuid::new_v4();
    let (mut ws_sender, mut receiver) = socket.split();

    // All outbound traffic funnels through this channel; the relay holds a
    // clone per joined room, so one sender task owns the socket write half.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(state.outbound_buffer());
    let sender_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize server event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let hello = ServerEvent::Hello {
        connection_id: connection_id.to_string(),
    };
    let _ = out_tx.send(hello).await;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, connection_id, &identity, &state, &out_tx).await;
                }
                Err(err) => {
                    debug!(user_id = %identity.id, error = %err, "unparseable client event");
                    let _ = out_tx
                        .send(ServerEvent::Error {
                            message: "invalid event format".to_string(),
                        })
                        .await;
                }
            },
            Ok(Message::Close(_)) => {
                debug!(user_id = %identity.id, %connection_id, "client closed connection");
                break;
            }
            Err(err) => {
                warn!(user_id = %identity.id, error = %err, "websocket error");
                break;
            }
            _ => {
                // Ping/pong/binary are handled by the transport layer.
            }
        }
    }

    // Membership is reconstructed from the joins the client replays after
    // reconnecting; nothing survives the connection.
    state.registry().leave(connection_id).await;
    drop(out_tx);
    let _ = sender_task.await;
    debug!(user_id = %identity.id, %connection_id, "connection finished");
}

async fn handle_client_event(
    event: ClientEvent,
    connection_id: Uuid,
    identity: &Sender,
    state: &AppState,
    out_tx: &mpsc::Sender<ServerEvent>,
) {
    match event {
        ClientEvent::JoinRoom { chat_id } => {
            state
                .registry()
                .join(connection_id, &chat_id, &identity.id, out_tx.clone())
                .await;
            let _ = out_tx.send(ServerEvent::Joined { chat_id }).await;
        }
        ClientEvent::SendMessage {
            chat_id,
            content,
            client_timestamp,
        } => {
            if let Err(err) = validate_content(&content) {
                let _ = out_tx
                    .send(ServerEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
                return;
            }

            // The client's timestamp is kept as the message's creation
            // time: receivers dedup against the sender's optimistic copy
            // by timestamp proximity.
            let message = ChatMessage {
                id: None,
                chat_id: chat_id.clone(),
                sender: identity.clone(),
                content,
                created_at: client_timestamp,
                delivery: DeliveryState::Pending,
            };
            if let Err(err) = state.relay().publish(&chat_id, message, connection_id).await {
                // Send without a prior join: tell the sender instead of
                // leaving its optimistic copy pending forever.
                let _ = out_tx
                    .send(ServerEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
            }
        }
        ClientEvent::Typing { chat_id, is_typing } => {
            state
                .relay()
                .publish_typing(&chat_id, &identity.id, is_typing, connection_id)
                .await;
        }
    }
}

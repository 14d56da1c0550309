pub mod handlers;
pub mod host;
pub mod player;
pub mod session;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::{SessionError, SessionResult};
use crate::protocol::{ClientMessage, ServerMessage, SessionSnapshot};
use crate::state::{AppState, SessionJoin};
use crate::types::{PlayerId, PlayerToken, SessionCode};

/// The player a connection speaks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub session_code: SessionCode,
    pub player_id: PlayerId,
    /// Which attachment of the player this connection holds
    pub attach_epoch: u64,
}

/// Per-connection state. A connection is bound to at most one player in
/// one session at a time.
#[derive(Debug)]
pub struct ConnectionContext {
    pub connection_id: String,
    pub membership: Option<Membership>,
    pub room_rx: Option<broadcast::Receiver<ServerMessage>>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self {
            connection_id: ulid::Ulid::new().to_string(),
            membership: None,
            room_rx: None,
        }
    }

    /// Bind this connection to the player in `joined` and start relaying its room.
    /// Returns the parts the caller replies with.
    pub fn attach(&mut self, joined: SessionJoin) -> (SessionSnapshot, PlayerId, PlayerToken) {
        let SessionJoin {
            session_code,
            player_id,
            player_token,
            attach_epoch,
            snapshot,
            room_rx,
        } = joined;
        self.membership = Some(Membership {
            session_code,
            player_id: player_id.clone(),
            attach_epoch,
        });
        self.room_rx = Some(room_rx);
        (snapshot, player_id, player_token)
    }

    pub fn detach(&mut self) -> Option<Membership> {
        self.room_rx = None;
        self.membership.take()
    }

    /// The bound membership, if it is for `session_code`
    pub fn member_of(&self, session_code: &str) -> SessionResult<Membership> {
        match &self.membership {
            Some(m) if m.session_code.eq_ignore_ascii_case(session_code.trim()) => Ok(m.clone()),
            _ => Err(SessionError::UnauthorizedAction(
                "Connection is not a member of this session".to_string(),
            )),
        }
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn an operation error into a reply. Stale submissions are dropped.
pub(crate) fn reply_error(err: SessionError) -> Option<ServerMessage> {
    if err.is_reportable() {
        tracing::warn!("Rejected request: {}", err);
        Some(ServerMessage::error(&err))
    } else {
        tracing::debug!("Dropped request: {}", err);
        None
    }
}

/// The transport behind `ctx` is gone: unbind it and start the player's
/// grace window
pub async fn release_connection(state: &Arc<AppState>, ctx: &mut ConnectionContext) {
    if let Some(membership) = ctx.detach() {
        state
            .disconnect_player(
                &membership.session_code,
                &membership.player_id,
                membership.attach_epoch,
            )
            .await;
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut ctx = ConnectionContext::new();
    tracing::info!("WebSocket connected: {}", ctx.connection_id);

    loop {
        tokio::select! {
            // Room events for the session this connection belongs to
            room_msg = async {
                match &mut ctx.room_rx {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending::<Result<ServerMessage, RecvError>>().await,
                }
            } => {
                match room_msg {
                    Ok(msg) => {
                        if !send_json(&mut sender, &msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // The next snapshot carries the full state again
                        tracing::warn!(
                            "Connection {} lagged, skipped {} room messages",
                            ctx.connection_id,
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Connection {}: session closed", ctx.connection_id);
                        ctx.detach();
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handlers::handle_message(client_msg, &mut ctx, &state).await,
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(ServerMessage::error(&SessionError::MalformedRequest(
                                    format!("Invalid message format: {}", e),
                                )))
                            }
                        };

                        if let Some(response) = response {
                            if !send_json(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    release_connection(&state, &mut ctx).await;
    tracing::info!("WebSocket connection closed: {}", ctx.connection_id);
}

use super::AppState;
use crate::broadcast::SnapshotKind;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::types::*;
use tokio::sync::broadcast;

const MAX_DISPLAY_NAME_CHARS: usize = 24;
const MAX_CHAT_CHARS: usize = 280;

/// Everything a connection needs after entering a session
#[derive(Debug)]
pub struct SessionJoin {
    pub session_code: SessionCode,
    pub player_id: PlayerId,
    pub player_token: PlayerToken,
    /// Identifies this attachment; a later resume supersedes it
    pub attach_epoch: u64,
    pub snapshot: SessionSnapshot,
    pub room_rx: broadcast::Receiver<ServerMessage>,
}

/// Trim a display name; blank names get a generated guest name
pub(super) fn normalize_display_name(raw: &str) -> SessionResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Ok(guest_name());
    }
    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(SessionError::MalformedRequest(format!(
            "Display name must be at most {} characters",
            MAX_DISPLAY_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn guest_name() -> String {
    petname::petname(2, " ")
        .filter(|name| name.chars().count() <= MAX_DISPLAY_NAME_CHARS)
        .unwrap_or_else(|| "Guest".to_string())
}

impl AppState {
    /// Join a lobby as a new player
    pub async fn join_session(&self, code: &str, display_name: &str) -> SessionResult<SessionJoin> {
        let display_name = normalize_display_name(display_name)?;
        let mut session = self.lock_session(code).await?;

        if session.phase != GamePhase::Lobby {
            return Err(SessionError::InvalidPhase {
                action: "join",
                phase: session.phase,
            });
        }
        if session.players.len() >= session.capacity(&self.config) {
            return Err(SessionError::SessionFull(session.code.clone()));
        }

        let player = Player::new(display_name, false);
        let player_id = player.id.clone();
        let player_token = player.token.clone();
        let attach_epoch = player.attach_epoch;
        tracing::info!("Session {}: {} joined", session.code, player.display_name);
        session.players.push(player);
        session.touch();

        let room_rx = session.subscribe();
        let snapshot = session.emit_snapshot(SnapshotKind::Updated);

        Ok(SessionJoin {
            session_code: session.code.clone(),
            player_id,
            player_token,
            attach_epoch,
            snapshot,
            room_rx,
        })
    }

    /// Re-attach a detached player by their secret token
    pub async fn resume_session(&self, code: &str, token: &str) -> SessionResult<SessionJoin> {
        let mut session = self.lock_session(code).await?;

        let player_id = session
            .player_by_token(token)
            .map(|p| p.id.clone())
            .ok_or_else(|| SessionError::UnauthorizedAction("Unknown player token".to_string()))?;

        let mut attach_epoch = 0;
        if let Some(player) = session.player_mut(&player_id) {
            player.connected = true;
            player.attach_epoch += 1;
            attach_epoch = player.attach_epoch;
            tracing::info!("Session {}: {} resumed", code, player.display_name);
        }
        session.touch();

        let room_rx = session.subscribe();
        let snapshot = session.emit_snapshot(SnapshotKind::Updated);

        // A returning player may have been the last one the ready check waited on
        self.maybe_start_countdown(&mut session);

        Ok(SessionJoin {
            session_code: session.code.clone(),
            player_id,
            player_token: token.to_string(),
            attach_epoch,
            snapshot,
            room_rx,
        })
    }

    /// Remove a player right away
    pub async fn leave_session(&self, code: &str, player_id: &str) -> SessionResult<()> {
        let mut session = self.lock_session(code).await?;
        if !session.contains(player_id) {
            return Err(SessionError::UnauthorizedAction(
                "Not a member of this session".to_string(),
            ));
        }
        self.depart(&mut session, player_id).await;
        Ok(())
    }

    /// Transport dropped: keep the seat for the grace window, then remove.
    /// Ignored when `attach_epoch` is not the player's current attachment,
    /// i.e. the player already resumed on another connection.
    pub async fn disconnect_player(&self, code: &str, player_id: &str, attach_epoch: u64) {
        let Ok(mut session) = self.lock_session(code).await else {
            return;
        };

        let current = session.player(player_id).map(|p| p.attach_epoch);
        if current != Some(attach_epoch) {
            tracing::debug!(
                "Session {}: ignoring disconnect of superseded connection for {}",
                code,
                player_id
            );
            return;
        }

        if self.config.reconnect_grace.is_zero() {
            self.depart(&mut session, player_id).await;
            return;
        }

        let Some(player) = session.player_mut(player_id) else {
            return;
        };
        player.connected = false;
        player.attach_epoch += 1;
        let epoch = player.attach_epoch;
        tracing::info!(
            "Session {}: {} disconnected, holding seat for {:?}",
            code,
            player.display_name,
            self.config.reconnect_grace
        );
        session.emit_snapshot(SnapshotKind::Updated);

        let state = self.clone();
        let code = code.to_string();
        let player_id = player_id.to_string();
        let grace = self.config.reconnect_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            state.expire_detached(&code, &player_id, epoch).await;
        });
    }

    async fn expire_detached(&self, code: &str, player_id: &str, epoch: u64) {
        let Ok(mut session) = self.lock_session(code).await else {
            return;
        };
        let expired = session
            .player(player_id)
            .is_some_and(|p| !p.connected && p.attach_epoch == epoch);
        if expired {
            tracing::info!("Session {}: grace window for {} expired", code, player_id);
            self.depart(&mut session, player_id).await;
        }
    }

    /// Mark a player ready; may start the countdown
    pub async fn set_ready(&self, code: &str, player_id: &str) -> SessionResult<()> {
        let mut session = self.lock_session(code).await?;
        if session.phase != GamePhase::Lobby {
            return Err(SessionError::InvalidPhase {
                action: "ready up",
                phase: session.phase,
            });
        }
        let player = session
            .player_mut(player_id)
            .ok_or_else(|| SessionError::UnauthorizedAction("Not a member of this session".to_string()))?;
        player.is_ready = true;
        session.touch();
        session.emit_snapshot(SnapshotKind::Updated);

        self.maybe_start_countdown(&mut session);
        Ok(())
    }

    /// Host-only: switch category and redraw questions
    pub async fn update_category(
        &self,
        code: &str,
        player_id: &str,
        category: Category,
    ) -> SessionResult<()> {
        let mut session = self.lock_session(code).await?;
        if !session.is_host(player_id) {
            return Err(SessionError::UnauthorizedAction(
                "Only the host can change the category".to_string(),
            ));
        }
        if session.phase != GamePhase::Lobby {
            return Err(SessionError::InvalidPhase {
                action: "change category",
                phase: session.phase,
            });
        }

        session.category = category;
        session.questions = self.bank.select(category, self.config.questions_per_session);
        for player in session.players.iter_mut() {
            player.is_ready = false;
        }
        session.touch();
        tracing::info!("Session {}: category changed to {}", code, category);
        session.emit_snapshot(SnapshotKind::CategoryUpdated);
        Ok(())
    }

    /// Append a chat message and relay it to the room
    pub async fn send_chat(&self, code: &str, player_id: &str, text: &str) -> SessionResult<ChatMessage> {
        let message = text.trim();
        let length = message.chars().count();
        if length == 0 || length > MAX_CHAT_CHARS {
            return Err(SessionError::MalformedRequest(format!(
                "Chat messages must be 1-{} characters",
                MAX_CHAT_CHARS
            )));
        }

        let mut session = self.lock_session(code).await?;
        let player_name = session
            .player(player_id)
            .map(|p| p.display_name.clone())
            .ok_or_else(|| SessionError::UnauthorizedAction("Not a member of this session".to_string()))?;

        let chat = ChatMessage {
            id: ulid::Ulid::new().to_string(),
            player_id: player_id.to_string(),
            player_name,
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        session.chat_log.push(chat.clone());
        session.touch();
        session.emit(ServerMessage::NewChatMessage {
            message: chat.clone(),
        });
        Ok(chat)
    }
}

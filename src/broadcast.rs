//! Room emission for sessions. Everything here is called with the session
//! lock held, so subscribers see messages in mutation order.

use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::state::Session;

/// Which snapshot-carrying event to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Updated,
    Started,
    NextQuestion,
    Over,
    CategoryUpdated,
    ReturnToLobby,
}

impl SnapshotKind {
    fn wrap(self, snapshot: SessionSnapshot) -> ServerMessage {
        match self {
            SnapshotKind::Updated => ServerMessage::SessionUpdated { snapshot },
            SnapshotKind::Started => ServerMessage::SessionStarted { snapshot },
            SnapshotKind::NextQuestion => ServerMessage::NextQuestion { snapshot },
            SnapshotKind::Over => ServerMessage::SessionOver { snapshot },
            SnapshotKind::CategoryUpdated => ServerMessage::CategoryUpdated { snapshot },
            SnapshotKind::ReturnToLobby => ServerMessage::ReturnToLobby { snapshot },
        }
    }
}

impl Session {
    /// Bump the version and take a snapshot of the result
    pub fn next_snapshot(&mut self) -> SessionSnapshot {
        self.version += 1;
        SessionSnapshot::from(&*self)
    }

    /// Send a message to every subscriber of this session
    pub fn emit(&self, msg: ServerMessage) {
        // No receivers connected is fine
        let _ = self.room.send(msg);
    }

    /// Emit a fresh snapshot wrapped as `kind`, returning it
    pub fn emit_snapshot(&mut self, kind: SnapshotKind) -> SessionSnapshot {
        let snapshot = self.next_snapshot();
        tracing::debug!(
            "Session {} v{}: {:?} ({:?}, question {})",
            self.code,
            snapshot.version,
            kind,
            self.phase,
            self.progression_index
        );
        self.emit(kind.wrap(snapshot.clone()));
        snapshot
    }

    /// Narrow score/response-time events for one player
    pub fn emit_player_progress(&self, player_id: &str) {
        let Some(player) = self.player(player_id) else {
            return;
        };
        self.emit(ServerMessage::ScoreUpdate {
            player_id: player.id.clone(),
            score: player.score,
        });
        self.emit(ServerMessage::ResponseTimeUpdate {
            player_id: player.id.clone(),
            response_times: player.response_times.clone(),
        });
    }

    /// Re-emit score and response times for the whole roster so late
    /// subscribers converge before the next question
    pub fn emit_progress_updates(&self) {
        for player in &self.players {
            self.emit_player_progress(&player.id);
        }
    }
}

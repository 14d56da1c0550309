use crate::state::Session;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateSession {
        mode: GameMode,
        category: Category,
        display_name: String,
    },
    JoinSession {
        session_code: SessionCode,
        display_name: String,
    },
    /// Re-attach to a player after a dropped connection
    ResumeSession {
        session_code: SessionCode,
        player_token: PlayerToken,
    },
    LeaveSession {
        session_code: SessionCode,
    },
    SetReady {
        session_code: SessionCode,
    },
    SubmitAnswer {
        session_code: SessionCode,
        player_id: PlayerId,
        /// None (or empty) when the question timer ran out
        #[serde(default)]
        answer: Option<String>,
        time_remaining: f64,
        /// Client-side score bookkeeping; the server recomputes both
        #[serde(default)]
        points: Option<u32>,
        #[serde(default)]
        total_score: Option<u32>,
        #[serde(default)]
        elapsed_seconds: Option<f64>,
        #[serde(default)]
        all_elapsed_seconds: Option<Vec<f64>>,
        /// Index the client believes is active; mismatches are dropped as stale
        #[serde(default)]
        question_index: Option<usize>,
    },
    PlayerFinished {
        session_code: SessionCode,
        player_id: PlayerId,
    },
    SendChatMessage {
        session_code: SessionCode,
        text: String,
    },
    UpdateCategory {
        session_code: SessionCode,
        category: Category,
    },
    RequestRematch {
        session_code: SessionCode,
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent to the creator only
    SessionCreated {
        snapshot: SessionSnapshot,
        player_id: PlayerId,
        player_token: PlayerToken,
    },
    /// Sent to the joining player only
    SessionJoined {
        snapshot: SessionSnapshot,
        player_id: PlayerId,
        player_token: PlayerToken,
    },
    /// Sent to a player who re-attached within the grace window
    SessionResumed {
        snapshot: SessionSnapshot,
        player_id: PlayerId,
    },
    SessionUpdated {
        snapshot: SessionSnapshot,
    },
    SessionStarted {
        snapshot: SessionSnapshot,
    },
    NextQuestion {
        snapshot: SessionSnapshot,
    },
    SessionOver {
        snapshot: SessionSnapshot,
    },
    CategoryUpdated {
        snapshot: SessionSnapshot,
    },
    ReturnToLobby {
        snapshot: SessionSnapshot,
    },
    ScoreUpdate {
        player_id: PlayerId,
        score: u32,
    },
    ResponseTimeUpdate {
        player_id: PlayerId,
        response_times: Vec<f64>,
    },
    PlayerFinished {
        player_id: PlayerId,
    },
    NewChatMessage {
        message: ChatMessage,
    },
    RematchRequested {
        player_id: PlayerId,
    },
    Error {
        code: String,
        reason: String,
    },
}

impl ServerMessage {
    /// The snapshot carried by this message, if any
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            ServerMessage::SessionCreated { snapshot, .. }
            | ServerMessage::SessionJoined { snapshot, .. }
            | ServerMessage::SessionResumed { snapshot, .. }
            | ServerMessage::SessionUpdated { snapshot }
            | ServerMessage::SessionStarted { snapshot }
            | ServerMessage::NextQuestion { snapshot }
            | ServerMessage::SessionOver { snapshot }
            | ServerMessage::CategoryUpdated { snapshot }
            | ServerMessage::ReturnToLobby { snapshot } => Some(snapshot),
            _ => None,
        }
    }

    pub fn error(err: &crate::error::SessionError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Public player info (no reconnection token)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub display_name: String,
    pub score: u32,
    pub is_host: bool,
    pub is_ready: bool,
    pub has_finished: bool,
    pub rematch_ready: bool,
    pub response_times: Vec<f64>,
    pub connected: bool,
}

impl From<&Player> for PlayerSnapshot {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            display_name: p.display_name.clone(),
            score: p.score,
            is_host: p.is_host,
            is_ready: p.is_ready,
            has_finished: p.has_finished,
            rematch_ready: p.rematch_ready,
            response_times: p.response_times.clone(),
            connected: p.connected,
        }
    }
}

/// Full wire-safe copy of a session. Sets become sequences in roster order,
/// the score map becomes ordered `[playerId, score]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_code: SessionCode,
    pub version: u64,
    pub mode: GameMode,
    pub category: Category,
    pub questions: Vec<Question>,
    pub question_seconds: u32,
    pub players: Vec<PlayerSnapshot>,
    pub progression_index: usize,
    pub phase: GamePhase,
    pub countdown_ticks: Option<u32>,
    pub answered_this_round: Vec<PlayerId>,
    pub finished_players: Vec<PlayerId>,
    pub scores: Vec<(PlayerId, u32)>,
    pub question_started_at: String,
    pub started_at: String,
    pub completion_time: Option<f64>,
    pub chat_log: Vec<ChatMessage>,
}

impl SessionSnapshot {
    pub fn player(&self, player_id: &str) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.progression_index)
    }
}

impl From<&Session> for SessionSnapshot {
    fn from(s: &Session) -> Self {
        // Roster order keeps the sequences stable between snapshots
        let in_roster_order = |set: &std::collections::HashSet<PlayerId>| -> Vec<PlayerId> {
            s.players
                .iter()
                .filter(|p| set.contains(&p.id))
                .map(|p| p.id.clone())
                .collect()
        };

        Self {
            session_code: s.code.clone(),
            version: s.version,
            mode: s.mode,
            category: s.category,
            questions: s.questions.clone(),
            question_seconds: s.question_seconds,
            players: s.players.iter().map(PlayerSnapshot::from).collect(),
            progression_index: s.progression_index,
            phase: s.phase,
            countdown_ticks: s.countdown_ticks,
            answered_this_round: in_roster_order(&s.answered_this_round),
            finished_players: in_roster_order(&s.finished_players),
            scores: s.players.iter().map(|p| (p.id.clone(), p.score)).collect(),
            question_started_at: s.question_started_at.to_rfc3339(),
            started_at: s.started_at.to_rfc3339(),
            completion_time: s.completion_time,
            chat_log: s.chat_log.clone(),
        }
    }
}

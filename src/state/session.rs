//! The session record: one game, its roster and its progression.

use crate::config::GameConfig;
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

/// Capacity of a session's room channel
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Shared handle to a session; all mutation happens under the mutex
pub type SessionHandle = Arc<Mutex<Session>>;

pub struct Session {
    pub code: SessionCode,
    pub mode: GameMode,
    pub category: Category,
    pub questions: Vec<Question>,
    pub question_seconds: u32,
    /// Join order; index 0 is the host
    pub players: Vec<Player>,
    pub progression_index: usize,
    pub phase: GamePhase,
    pub countdown_ticks: Option<u32>,
    pub answered_this_round: HashSet<PlayerId>,
    pub finished_players: HashSet<PlayerId>,
    pub question_started_at: DateTime<Utc>,
    /// Start of the session (creation or last rematch), basis of `completion_time`
    pub started_at: DateTime<Utc>,
    pub completion_time: Option<f64>,
    pub chat_log: Vec<ChatMessage>,
    /// Bumped for every emitted snapshot
    pub version: u64,
    /// Bumped whenever pending timers must stop acting on this session
    pub generation: u64,
    /// Set once the session has been destroyed; late handle holders must not touch it
    pub closed: bool,
    pub last_activity: Instant,
    pub(crate) room: broadcast::Sender<ServerMessage>,
}

impl Session {
    pub fn new(
        code: SessionCode,
        mode: GameMode,
        category: Category,
        questions: Vec<Question>,
        question_seconds: u32,
        host: Player,
    ) -> Self {
        let (room, _rx) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        let now = Utc::now();
        Self {
            code,
            mode,
            category,
            questions,
            question_seconds,
            players: vec![host],
            progression_index: 0,
            phase: GamePhase::Lobby,
            countdown_ticks: None,
            answered_this_round: HashSet::new(),
            finished_players: HashSet::new(),
            question_started_at: now,
            started_at: now,
            completion_time: None,
            chat_log: Vec::new(),
            version: 0,
            generation: 0,
            closed: false,
            last_activity: Instant::now(),
            room,
        }
    }

    /// Subscribe to everything emitted for this session from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.room.subscribe()
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn player_by_token(&self, token: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.token == token)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.player(player_id).is_some_and(|p| p.is_host)
    }

    /// Players needed before a countdown may start
    pub fn required_players(&self, config: &GameConfig) -> usize {
        match self.mode {
            GameMode::Solo => 1,
            GameMode::HeadToHead => 2,
            GameMode::Group => config.group_min_players,
        }
    }

    pub fn capacity(&self, config: &GameConfig) -> usize {
        match self.mode {
            GameMode::Solo => 1,
            GameMode::HeadToHead => 2,
            GameMode::Group => config.max_group_size,
        }
    }

    pub fn has_required_players(&self, config: &GameConfig) -> bool {
        let required = self.required_players(config);
        match self.mode {
            GameMode::HeadToHead => self.players.len() == required,
            _ => self.players.len() >= required,
        }
    }

    /// Every player is ready and has a live connection
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.is_ready && p.connected)
    }

    pub fn all_answered(&self) -> bool {
        !self.players.is_empty() && self.answered_this_round.len() == self.players.len()
    }

    pub fn all_finished(&self) -> bool {
        !self.players.is_empty() && self.finished_players.len() == self.players.len()
    }

    pub fn all_rematch_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.rematch_ready)
    }

    pub fn is_last_question(&self) -> bool {
        self.progression_index + 1 >= self.questions.len()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.progression_index)
    }

    /// Seconds since the current question became active
    pub fn seconds_since_question_start(&self) -> f64 {
        (Utc::now() - self.question_started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Take a player out of the roster and every set that refers to them.
    /// Promotes the new first player if the host left.
    pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(index);

        self.answered_this_round.remove(player_id);
        self.finished_players.remove(player_id);

        if player.is_host {
            if let Some(next) = self.players.first_mut() {
                next.is_host = true;
                tracing::info!(
                    "Session {}: host left, {} is the new host",
                    self.code,
                    next.display_name
                );
            }
        }

        Some(player)
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Invalidate every pending timer for this session
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

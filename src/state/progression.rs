//! Phase transitions and the timers that drive them.

use super::{AppState, Session};
use crate::broadcast::SnapshotKind;
use crate::error::{SessionError, SessionResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::Utc;

/// Result of a `requestRematch`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchStatus {
    /// Flag recorded, still waiting on the opponent
    Waiting,
    /// Everyone agreed; the session is back in the lobby
    Restarted,
}

impl Session {
    fn begin_countdown(&mut self, ticks: u32) {
        self.phase = GamePhase::Countdown;
        self.countdown_ticks = Some(ticks);
    }

    /// `started_at` is left alone: completion time counts the lobby wait too
    fn start_game(&mut self) {
        self.phase = GamePhase::InProgress;
        self.countdown_ticks = None;
        self.progression_index = 0;
        self.answered_this_round.clear();
        self.finished_players.clear();
        self.question_started_at = Utc::now();
        self.completion_time = None;
    }

    fn begin_transition(&mut self) {
        self.phase = GamePhase::Transitioning;
    }

    fn advance_question(&mut self) {
        self.progression_index += 1;
        self.question_started_at = Utc::now();
        self.phase = GamePhase::InProgress;
    }

    fn finish_game(&mut self) {
        self.phase = GamePhase::GameOver;
        self.answered_this_round.clear();
        let elapsed = (Utc::now() - self.started_at).num_milliseconds().max(0);
        self.completion_time = Some(elapsed as f64 / 1000.0);
    }

    /// Too few players left mid-game: back to a clean lobby
    fn rollback_to_lobby(&mut self) {
        self.phase = GamePhase::Lobby;
        self.countdown_ticks = None;
        self.progression_index = 0;
        self.answered_this_round.clear();
        self.finished_players.clear();
        self.completion_time = None;
        for player in self.players.iter_mut() {
            player.reset_progress();
        }
        self.bump_generation();
    }

    fn reset_for_rematch(&mut self, questions: Vec<Question>) {
        self.questions = questions;
        self.phase = GamePhase::Lobby;
        self.countdown_ticks = None;
        self.progression_index = 0;
        self.answered_this_round.clear();
        self.finished_players.clear();
        self.chat_log.clear();
        self.completion_time = None;
        self.started_at = Utc::now();
        for player in self.players.iter_mut() {
            player.reset_progress();
        }
        self.bump_generation();
    }
}

impl AppState {
    /// Lobby -> Countdown once the roster is complete and everyone is ready.
    /// Never restarts a running countdown.
    pub(crate) fn maybe_start_countdown(&self, session: &mut Session) {
        if session.phase != GamePhase::Lobby
            || session.countdown_ticks.is_some()
            || !session.has_required_players(&self.config)
            || !session.all_ready()
        {
            return;
        }

        let ticks = self.config.countdown_ticks;
        tracing::info!("Session {}: everyone ready, counting down from {}", session.code, ticks);

        if ticks == 0 {
            session.start_game();
            session.emit_snapshot(SnapshotKind::Started);
            return;
        }

        session.begin_countdown(ticks);
        session.emit_snapshot(SnapshotKind::Updated);
        self.spawn_countdown(session.code.clone(), session.generation);
    }

    fn spawn_countdown(&self, code: SessionCode, generation: u64) {
        let state = self.clone();
        let tick = self.config.countdown_tick;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                if !state.on_countdown_tick(&code, generation).await {
                    break;
                }
            }
        });
    }

    /// One countdown step. Returns whether the countdown keeps running.
    async fn on_countdown_tick(&self, code: &str, generation: u64) -> bool {
        let Some(mut session) = self.lock_for_timer(code, generation).await else {
            return false;
        };
        if session.phase != GamePhase::Countdown {
            return false;
        }

        let remaining = session.countdown_ticks.unwrap_or(1).saturating_sub(1);
        if remaining == 0 {
            session.start_game();
            tracing::info!("Session {}: game started", code);
            session.emit_snapshot(SnapshotKind::Started);
            return false;
        }

        session.countdown_ticks = Some(remaining);
        session.emit_snapshot(SnapshotKind::Updated);
        true
    }

    /// Everyone answered the current question
    pub(crate) fn on_round_complete(&self, session: &mut Session) {
        // Emptied as soon as it fills, before the index moves
        session.answered_this_round.clear();

        if session.is_last_question() && session.mode.finish_rule() == FinishRule::AllFinished {
            // Wait for every player to report `playerFinished`
            session.emit_snapshot(SnapshotKind::Updated);
            if session.all_finished() {
                self.finish(session);
            }
            return;
        }

        session.begin_transition();
        session.emit_snapshot(SnapshotKind::Updated);
        self.spawn_settle(session.code.clone(), session.generation);
    }

    fn spawn_settle(&self, code: SessionCode, generation: u64) {
        let state = self.clone();
        let delay = self.config.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.on_settle_elapsed(&code, generation).await;
        });
    }

    async fn on_settle_elapsed(&self, code: &str, generation: u64) {
        let Some(mut session) = self.lock_for_timer(code, generation).await else {
            return;
        };
        if session.phase != GamePhase::Transitioning {
            return;
        }

        session.emit_progress_updates();

        if session.is_last_question() {
            self.finish(&mut session);
            return;
        }

        session.advance_question();
        tracing::debug!(
            "Session {}: advancing to question {}",
            code,
            session.progression_index
        );
        session.emit_snapshot(SnapshotKind::NextQuestion);
    }

    fn finish(&self, session: &mut Session) {
        session.finish_game();
        tracing::info!(
            "Session {}: game over after {:.1}s",
            session.code,
            session.completion_time.unwrap_or_default()
        );
        session.emit_snapshot(SnapshotKind::Over);
    }

    /// A player reports having answered every question
    pub async fn player_finished(&self, code: &str, player_id: &str) -> SessionResult<()> {
        let mut session = self.lock_session(code).await?;
        if session.phase == GamePhase::Lobby || session.phase == GamePhase::Countdown {
            return Err(SessionError::InvalidPhase {
                action: "finish",
                phase: session.phase,
            });
        }

        let total = session.questions.len();
        let player = session
            .player_mut(player_id)
            .ok_or_else(|| SessionError::UnauthorizedAction("Not a member of this session".to_string()))?;
        if player.response_times.len() < total {
            return Err(SessionError::MalformedRequest(format!(
                "Finished after {} of {} questions",
                player.response_times.len(),
                total
            )));
        }
        if player.has_finished {
            return Ok(());
        }
        player.has_finished = true;
        session.finished_players.insert(player_id.to_string());
        session.touch();

        tracing::info!("Session {}: {} finished", code, player_id);
        session.emit(ServerMessage::PlayerFinished {
            player_id: player_id.to_string(),
        });

        if session.phase == GamePhase::InProgress
            && session.mode.finish_rule() == FinishRule::AllFinished
            && session.all_finished()
        {
            self.finish(&mut session);
        } else {
            session.emit_snapshot(SnapshotKind::Updated);
        }
        Ok(())
    }

    /// Flag a rematch request; restarts the session once both players agree
    pub async fn request_rematch(&self, code: &str, player_id: &str) -> SessionResult<RematchStatus> {
        let mut session = self.lock_session(code).await?;
        if !session.mode.supports_rematch() || session.players.len() != 2 {
            return Err(SessionError::RematchUnavailable);
        }
        if session.phase != GamePhase::GameOver {
            return Err(SessionError::InvalidPhase {
                action: "request a rematch",
                phase: session.phase,
            });
        }

        let player = session
            .player_mut(player_id)
            .ok_or_else(|| SessionError::UnauthorizedAction("Not a member of this session".to_string()))?;
        if player.rematch_ready {
            return Ok(RematchStatus::Waiting);
        }
        player.rematch_ready = true;
        session.touch();
        session.emit(ServerMessage::RematchRequested {
            player_id: player_id.to_string(),
        });

        if !session.all_rematch_ready() {
            session.emit_snapshot(SnapshotKind::Updated);
            return Ok(RematchStatus::Waiting);
        }

        let questions = self
            .bank
            .select(session.category, self.config.questions_per_session);
        session.reset_for_rematch(questions);
        tracing::info!("Session {}: rematch, back to lobby", code);
        session.emit_snapshot(SnapshotKind::ReturnToLobby);
        Ok(RematchStatus::Restarted)
    }

    /// Remove a player and repair whatever their absence breaks
    pub(crate) async fn depart(&self, session: &mut Session, player_id: &str) {
        let Some(player) = session.remove_player(player_id) else {
            return;
        };
        tracing::info!("Session {}: {} left", session.code, player.display_name);
        session.touch();

        if session.players.is_empty() {
            self.destroy_session(session).await;
            return;
        }

        if session.phase.is_running() && !session.has_required_players(&self.config) {
            tracing::info!(
                "Session {}: not enough players left, back to lobby",
                session.code
            );
            session.rollback_to_lobby();
            session.emit_snapshot(SnapshotKind::Updated);
            return;
        }

        session.emit_snapshot(SnapshotKind::Updated);

        let phase = session.phase;
        match phase {
            GamePhase::InProgress if session.all_answered() => self.on_round_complete(session),
            GamePhase::InProgress
                if session.mode.finish_rule() == FinishRule::AllFinished
                    && session.all_finished() =>
            {
                self.finish(session)
            }
            GamePhase::Lobby => self.maybe_start_countdown(session),
            _ => {}
        }
    }
}

//! Client-side mirror of a session: the last snapshot plus the local
//! optimistic state a player's UI needs between server updates.

use crate::protocol::{ClientMessage, PlayerSnapshot, ServerMessage, SessionSnapshot};
use crate::types::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct ClientProjection {
    player_id: Option<PlayerId>,
    snapshot: Option<SessionSnapshot>,
    /// Answer picked locally, not yet confirmed by a snapshot
    selected_answer: Option<String>,
    /// Question index the in-flight answer was submitted for
    pending_index: Option<usize>,
    /// Set the instant the local player submits
    is_transitioning: bool,
}

impl ClientProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_player(player_id: impl Into<PlayerId>) -> Self {
        Self {
            player_id: Some(player_id.into()),
            ..Self::default()
        }
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn selected_answer(&self) -> Option<&str> {
        self.selected_answer.as_deref()
    }

    pub fn pending_index(&self) -> Option<usize> {
        self.pending_index
    }

    /// Optimistic flag, or the server already moved the session on
    pub fn is_transitioning(&self) -> bool {
        self.is_transitioning
            || self
                .snapshot
                .as_ref()
                .is_some_and(|s| s.phase == GamePhase::Transitioning)
    }

    /// Feed one server message. Returns whether the mirror changed.
    pub fn apply(&mut self, msg: &ServerMessage) -> bool {
        match msg {
            ServerMessage::SessionCreated {
                snapshot, player_id, ..
            }
            | ServerMessage::SessionJoined {
                snapshot, player_id, ..
            }
            | ServerMessage::SessionResumed {
                snapshot, player_id, ..
            } => {
                self.player_id = Some(player_id.clone());
                self.apply_snapshot(snapshot.clone())
            }
            ServerMessage::ScoreUpdate { player_id, score } => {
                let patched = self.patch_player(player_id, |p| p.score = *score);
                self.patch_scores(player_id, *score);
                patched
            }
            ServerMessage::ResponseTimeUpdate {
                player_id,
                response_times,
            } => self.patch_player(player_id, |p| p.response_times = response_times.clone()),
            ServerMessage::PlayerFinished { player_id } => {
                let patched = self.patch_player(player_id, |p| p.has_finished = true);
                if let Some(s) = self.snapshot.as_mut() {
                    if patched && !s.finished_players.contains(player_id) {
                        s.finished_players.push(player_id.clone());
                    }
                }
                patched
            }
            ServerMessage::RematchRequested { player_id } => {
                self.patch_player(player_id, |p| p.rematch_ready = true)
            }
            ServerMessage::NewChatMessage { message } => match self.snapshot.as_mut() {
                Some(s) if !s.chat_log.iter().any(|m| m.id == message.id) => {
                    s.chat_log.push(message.clone());
                    true
                }
                _ => false,
            },
            ServerMessage::Error { .. } => false,
            other => match other.snapshot() {
                Some(snapshot) => self.apply_snapshot(snapshot.clone()),
                None => false,
            },
        }
    }

    /// Replace the mirror unless `snapshot` is older than what we hold.
    /// Clears the local prediction once the server has moved past it.
    pub fn apply_snapshot(&mut self, snapshot: SessionSnapshot) -> bool {
        if let Some(current) = &self.snapshot {
            if current.session_code == snapshot.session_code && snapshot.version < current.version {
                tracing::debug!(
                    "Discarding snapshot v{} (holding v{})",
                    snapshot.version,
                    current.version
                );
                return false;
            }
        }

        let still_pending = self.pending_index == Some(snapshot.progression_index)
            && matches!(
                snapshot.phase,
                GamePhase::InProgress | GamePhase::Transitioning
            );
        if !still_pending {
            self.clear_prediction();
        }

        self.snapshot = Some(snapshot);
        true
    }

    /// Record a local answer and build the message to send.
    /// `None` when there is no active question or it was already answered.
    pub fn submit_answer(
        &mut self,
        answer: Option<String>,
        time_remaining: f64,
        elapsed_seconds: f64,
    ) -> Option<ClientMessage> {
        let player_id = self.player_id.clone()?;
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.phase != GamePhase::InProgress || self.has_answered() {
            return None;
        }

        let msg = ClientMessage::SubmitAnswer {
            session_code: snapshot.session_code.clone(),
            player_id,
            answer: answer.clone(),
            time_remaining,
            points: None,
            total_score: None,
            elapsed_seconds: Some(elapsed_seconds),
            all_elapsed_seconds: None,
            question_index: Some(snapshot.progression_index),
        };

        self.pending_index = Some(snapshot.progression_index);
        self.selected_answer = answer;
        self.is_transitioning = true;
        Some(msg)
    }

    pub fn current_player(&self) -> Option<&PlayerSnapshot> {
        let id = self.player_id.as_deref()?;
        self.snapshot.as_ref()?.player(id)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.snapshot.as_ref()?.current_question()
    }

    pub fn response_times(&self) -> &[f64] {
        self.current_player()
            .map(|p| p.response_times.as_slice())
            .unwrap_or_default()
    }

    /// Ticks left on the pre-game countdown, if one is running
    pub fn countdown_display(&self) -> Option<u32> {
        self.snapshot.as_ref()?.countdown_ticks
    }

    pub fn has_answered(&self) -> bool {
        let Some(snapshot) = &self.snapshot else {
            return false;
        };
        if self.pending_index == Some(snapshot.progression_index) {
            return true;
        }
        // The answered set empties once everyone is in, so fall back to the
        // player's own response count
        self.player_id.as_ref().is_some_and(|id| {
            snapshot.answered_this_round.contains(id)
                || snapshot
                    .player(id)
                    .is_some_and(|p| p.response_times.len() > snapshot.progression_index)
        })
    }

    /// Whole seconds left on the active question at `now`
    pub fn time_left(&self, now: DateTime<Utc>) -> u32 {
        let Some(snapshot) = &self.snapshot else {
            return 0;
        };
        if snapshot.phase != GamePhase::InProgress {
            return 0;
        }
        let Ok(started) = DateTime::parse_from_rfc3339(&snapshot.question_started_at) else {
            return snapshot.question_seconds;
        };
        let elapsed = (now - started.with_timezone(&Utc)).num_seconds().max(0) as u64;
        (snapshot.question_seconds as u64).saturating_sub(elapsed) as u32
    }

    fn clear_prediction(&mut self) {
        self.selected_answer = None;
        self.pending_index = None;
        self.is_transitioning = false;
    }

    fn patch_player(&mut self, player_id: &str, patch: impl FnOnce(&mut PlayerSnapshot)) -> bool {
        let Some(player) = self
            .snapshot
            .as_mut()
            .and_then(|s| s.players.iter_mut().find(|p| p.id == player_id))
        else {
            return false;
        };
        patch(player);
        true
    }

    fn patch_scores(&mut self, player_id: &str, score: u32) {
        if let Some(entry) = self
            .snapshot
            .as_mut()
            .and_then(|s| s.scores.iter_mut().find(|(id, _)| id == player_id))
        {
            entry.1 = score;
        }
    }
}

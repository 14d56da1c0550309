use super::{AppState, Session};
use crate::broadcast::SnapshotKind;
use crate::error::{SessionError, SessionResult};
use crate::types::*;

const BASE_POINTS: u32 = 10;
const MAX_SPEED_BONUS: u32 = 5;
/// One bonus point per this many seconds left on the clock
const SPEED_BONUS_STEP: u32 = 3;
/// Claimed and measured remaining time may differ this much before it is logged
const CLOCK_TOLERANCE_SECS: f64 = 2.0;

/// Points for an answer given `time_remaining` whole-or-fractional seconds
/// left of a `budget`-second question
pub fn award_points(correct: bool, time_remaining: f64, budget: u32) -> u32 {
    if !correct {
        return 0;
    }
    let remaining = if time_remaining.is_finite() {
        time_remaining.clamp(0.0, budget as f64).floor() as u32
    } else {
        0
    };
    BASE_POINTS + (remaining / SPEED_BONUS_STEP).min(MAX_SPEED_BONUS)
}

/// One `submitAnswer`, as far as the server trusts it
#[derive(Debug, Clone, Default)]
pub struct AnswerSubmission {
    /// None or empty when the client timer ran out
    pub answer: Option<String>,
    pub time_remaining: f64,
    pub elapsed_seconds: Option<f64>,
    pub question_index: Option<usize>,
    /// Client-side bookkeeping, only compared for logging
    pub reported_points: Option<u32>,
    pub reported_total: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub points: u32,
    pub total_score: u32,
    pub elapsed_seconds: f64,
    /// Everyone has answered the current question
    pub round_complete: bool,
}

impl Session {
    /// Validate and apply one answer. Leaves the session untouched on error.
    pub fn record_answer(
        &mut self,
        player_id: &str,
        submission: &AnswerSubmission,
    ) -> SessionResult<AnswerOutcome> {
        let player = self
            .player(player_id)
            .ok_or_else(|| SessionError::UnauthorizedAction("Not a member of this session".to_string()))?;

        if self.phase != GamePhase::InProgress {
            return Err(SessionError::StaleSubmission(format!(
                "answer arrived during {:?}",
                self.phase
            )));
        }
        if self.answered_this_round.contains(player_id) {
            return Err(SessionError::StaleSubmission(format!(
                "{} already answered question {}",
                player_id, self.progression_index
            )));
        }
        if player.response_times.len() > self.progression_index {
            return Err(SessionError::StaleSubmission(format!(
                "{} already has a response for question {}",
                player_id, self.progression_index
            )));
        }
        if let Some(index) = submission.question_index {
            if index != self.progression_index {
                return Err(SessionError::StaleSubmission(format!(
                    "answer for question {} but question {} is active",
                    index, self.progression_index
                )));
            }
        }

        let question = self
            .current_question()
            .ok_or_else(|| SessionError::StaleSubmission("no active question".to_string()))?;
        let correct = submission
            .answer
            .as_deref()
            .is_some_and(|a| !a.is_empty() && a == question.correct_answer);

        // The client's clock is authoritative; the server's is a cross-check
        let measured = self.seconds_since_question_start();
        let server_remaining = (self.question_seconds as f64 - measured).max(0.0);
        if submission.time_remaining - server_remaining > CLOCK_TOLERANCE_SECS {
            tracing::debug!(
                "Session {}: {} claims {:.1}s left, server measured {:.1}s",
                self.code,
                player_id,
                submission.time_remaining,
                server_remaining
            );
        }
        let points = award_points(correct, submission.time_remaining, self.question_seconds);

        let elapsed_seconds = submission
            .elapsed_seconds
            .filter(|e| e.is_finite() && *e >= 0.0)
            .unwrap_or(measured);

        let player = self
            .player_mut(player_id)
            .ok_or_else(|| SessionError::UnauthorizedAction("Not a member of this session".to_string()))?;
        player.score += points;
        player.response_times.push(elapsed_seconds);
        let total_score = player.score;

        if submission.reported_points.is_some_and(|p| p != points)
            || submission.reported_total.is_some_and(|t| t != total_score)
        {
            tracing::debug!(
                "Session {}: client score for {} disagrees (client {:?}/{:?}, server {}/{})",
                self.code,
                player_id,
                submission.reported_points,
                submission.reported_total,
                points,
                total_score
            );
        }

        self.answered_this_round.insert(player_id.to_string());

        Ok(AnswerOutcome {
            correct,
            points,
            total_score,
            elapsed_seconds,
            round_complete: self.all_answered(),
        })
    }
}

impl AppState {
    /// Score an answer, emit the narrow updates and the snapshot, then let
    /// the progression controller react if the round is complete
    pub async fn submit_answer(
        &self,
        code: &str,
        player_id: &str,
        submission: AnswerSubmission,
    ) -> SessionResult<AnswerOutcome> {
        let mut session = self.lock_session(code).await?;

        let outcome = session.record_answer(player_id, &submission).map_err(|e| {
            if !e.is_reportable() {
                tracing::debug!("Session {}: dropping submission: {}", code, e);
            }
            e
        })?;
        session.touch();

        tracing::info!(
            "Session {}: {} answered question {} ({}, +{})",
            code,
            player_id,
            session.progression_index,
            if outcome.correct { "correct" } else { "wrong" },
            outcome.points
        );

        session.emit_player_progress(player_id);
        session.emit_snapshot(SnapshotKind::Updated);

        if outcome.round_complete {
            self.on_round_complete(&mut session);
        }

        Ok(outcome)
    }
}

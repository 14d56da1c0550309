//! Player message handlers
//!
//! Everything here acts for the player the connection is bound to; the
//! dispatch layer has already checked membership.

use crate::protocol::ServerMessage;
use crate::state::{AnswerSubmission, AppState};
use std::sync::Arc;

use super::{reply_error, Membership};

pub async fn handle_set_ready(state: &Arc<AppState>, membership: &Membership) -> Option<ServerMessage> {
    match state
        .set_ready(&membership.session_code, &membership.player_id)
        .await
    {
        Ok(()) => None,
        Err(e) => reply_error(e),
    }
}

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    membership: &Membership,
    submission: AnswerSubmission,
) -> Option<ServerMessage> {
    match state
        .submit_answer(&membership.session_code, &membership.player_id, submission)
        .await
    {
        // Score and snapshot reach the player through the room
        Ok(_) => None,
        Err(e) => reply_error(e),
    }
}

pub async fn handle_player_finished(
    state: &Arc<AppState>,
    membership: &Membership,
) -> Option<ServerMessage> {
    match state
        .player_finished(&membership.session_code, &membership.player_id)
        .await
    {
        Ok(()) => None,
        Err(e) => reply_error(e),
    }
}

pub async fn handle_request_rematch(
    state: &Arc<AppState>,
    membership: &Membership,
) -> Option<ServerMessage> {
    match state
        .request_rematch(&membership.session_code, &membership.player_id)
        .await
    {
        Ok(status) => {
            tracing::debug!(
                "Rematch request from {} in {}: {:?}",
                membership.player_id,
                membership.session_code,
                status
            );
            None
        }
        Err(e) => reply_error(e),
    }
}

//! WebSocket message dispatch
//!
//! Membership is checked here, then messages are dispatched to the
//! session, player and host handler modules.

use crate::error::SessionError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::{host, player, reply_error, session, ConnectionContext};

/// Resolve the connection's membership for a session or reply with an error
macro_rules! require_member {
    ($ctx:expr, $code:expr) => {
        match $ctx.member_of(&$code) {
            Ok(membership) => membership,
            Err(e) => return reply_error(e),
        }
    };
}

/// Reject messages that claim to act for a different player
macro_rules! check_acting_player {
    ($membership:expr, $claimed:expr) => {
        if $membership.player_id != $claimed {
            return reply_error(SessionError::UnauthorizedAction(
                "Cannot act on behalf of another player".to_string(),
            ));
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    ctx: &mut ConnectionContext,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Session membership
        ClientMessage::CreateSession {
            mode,
            category,
            display_name,
        } => session::handle_create(state, ctx, mode, category, display_name).await,

        ClientMessage::JoinSession {
            session_code,
            display_name,
        } => session::handle_join(state, ctx, session_code, display_name).await,

        ClientMessage::ResumeSession {
            session_code,
            player_token,
        } => session::handle_resume(state, ctx, session_code, player_token).await,

        ClientMessage::LeaveSession { session_code } => {
            require_member!(ctx, session_code);
            session::handle_leave(state, ctx).await
        }

        ClientMessage::SendChatMessage { session_code, text } => {
            let membership = require_member!(ctx, session_code);
            session::handle_chat(state, &membership, text).await
        }

        // Player messages
        ClientMessage::SetReady { session_code } => {
            let membership = require_member!(ctx, session_code);
            player::handle_set_ready(state, &membership).await
        }

        ClientMessage::SubmitAnswer {
            session_code,
            player_id,
            answer,
            time_remaining,
            points,
            total_score,
            elapsed_seconds,
            all_elapsed_seconds: _,
            question_index,
        } => {
            let membership = require_member!(ctx, session_code);
            check_acting_player!(membership, player_id);
            let submission = crate::state::AnswerSubmission {
                answer,
                time_remaining,
                elapsed_seconds,
                question_index,
                reported_points: points,
                reported_total: total_score,
            };
            player::handle_submit_answer(state, &membership, submission).await
        }

        ClientMessage::PlayerFinished {
            session_code,
            player_id,
        } => {
            let membership = require_member!(ctx, session_code);
            check_acting_player!(membership, player_id);
            player::handle_player_finished(state, &membership).await
        }

        ClientMessage::RequestRematch {
            session_code,
            player_id,
        } => {
            let membership = require_member!(ctx, session_code);
            check_acting_player!(membership, player_id);
            player::handle_request_rematch(state, &membership).await
        }

        // Host-only (the host check needs the roster, so it happens in state)
        ClientMessage::UpdateCategory {
            session_code,
            category,
        } => {
            let membership = require_member!(ctx, session_code);
            host::handle_update_category(state, &membership, category).await
        }
    }
}

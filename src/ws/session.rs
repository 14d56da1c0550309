//! Session membership handlers: create, join, resume, leave and chat.

use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::state::{AppState, SessionJoin};
use crate::types::{Category, GameMode, PlayerId, PlayerToken};
use std::sync::Arc;

use super::{reply_error, ConnectionContext, Membership};

/// Bind the connection to `joined`, then give up the seat it held before.
/// Called only after the new seat is secured.
async fn switch_to(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    joined: SessionJoin,
) -> (SessionSnapshot, PlayerId, PlayerToken) {
    let previous = ctx.detach();
    if let Some(old) = previous {
        if old.session_code != joined.session_code || old.player_id != joined.player_id {
            tracing::info!(
                "Connection {} switching sessions, leaving {}",
                ctx.connection_id,
                old.session_code
            );
            // The old session may already be gone
            let _ = state.leave_session(&old.session_code, &old.player_id).await;
        }
    }
    ctx.attach(joined)
}

pub async fn handle_create(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    mode: GameMode,
    category: Category,
    display_name: String,
) -> Option<ServerMessage> {
    if mode == GameMode::Solo {
        return reply_error(crate::error::SessionError::MalformedRequest(
            "Solo games are not hosted by the server".to_string(),
        ));
    }
    match state.create_session(mode, category, &display_name).await {
        Ok(joined) => {
            let (snapshot, player_id, player_token) = switch_to(state, ctx, joined).await;
            Some(ServerMessage::SessionCreated {
                snapshot,
                player_id,
                player_token,
            })
        }
        Err(e) => reply_error(e),
    }
}

pub async fn handle_join(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    session_code: String,
    display_name: String,
) -> Option<ServerMessage> {
    let code = session_code.trim().to_uppercase();
    if ctx.member_of(&code).is_ok() {
        // Already in this session; just resend the state
        return match state.snapshot(&code).await {
            Ok(snapshot) => Some(ServerMessage::SessionUpdated { snapshot }),
            Err(e) => reply_error(e),
        };
    }

    // The current seat is only given up once the new one is secured
    match state.join_session(&code, &display_name).await {
        Ok(joined) => {
            let (snapshot, player_id, player_token) = switch_to(state, ctx, joined).await;
            Some(ServerMessage::SessionJoined {
                snapshot,
                player_id,
                player_token,
            })
        }
        Err(e) => reply_error(e),
    }
}

pub async fn handle_resume(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    session_code: String,
    player_token: String,
) -> Option<ServerMessage> {
    let code = session_code.trim().to_uppercase();
    match state.resume_session(&code, &player_token).await {
        Ok(joined) => {
            let (snapshot, player_id, _) = switch_to(state, ctx, joined).await;
            Some(ServerMessage::SessionResumed {
                snapshot,
                player_id,
            })
        }
        Err(e) => reply_error(e),
    }
}

pub async fn handle_leave(state: &Arc<AppState>, ctx: &mut ConnectionContext) -> Option<ServerMessage> {
    let membership = ctx.detach()?;
    match state
        .leave_session(&membership.session_code, &membership.player_id)
        .await
    {
        Ok(()) => None,
        Err(e) => reply_error(e),
    }
}

pub async fn handle_chat(
    state: &Arc<AppState>,
    membership: &Membership,
    text: String,
) -> Option<ServerMessage> {
    match state
        .send_chat(&membership.session_code, &membership.player_id, &text)
        .await
    {
        Ok(_) => None,
        Err(e) => reply_error(e),
    }
}

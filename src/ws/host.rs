//! Host-only command handlers
//!
//! Whether the member is the host is decided by the session roster, which
//! can change on departure, so `AppState` makes that check under the lock.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::Category;
use std::sync::Arc;

use super::{reply_error, Membership};

pub async fn handle_update_category(
    state: &Arc<AppState>,
    membership: &Membership,
    category: Category,
) -> Option<ServerMessage> {
    tracing::info!(
        "{} requests category {} in {}",
        membership.player_id,
        category,
        membership.session_code
    );
    match state
        .update_category(&membership.session_code, &membership.player_id, category)
        .await
    {
        Ok(()) => None,
        Err(e) => reply_error(e),
    }
}

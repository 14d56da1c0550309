mod answer;
mod lobby;
mod progression;
mod registry;
mod session;

pub use answer::{award_points, AnswerOutcome, AnswerSubmission};
pub use lobby::SessionJoin;
pub use progression::RematchStatus;
pub use registry::spawn_session_reaper;
pub use session::{Session, SessionHandle};

use crate::config::GameConfig;
use crate::error::{SessionError, SessionResult};
use crate::questions::QuestionBank;
use crate::types::SessionCode;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, RwLock};

/// Shared application state: the session registry plus the static
/// collaborators every session draws from.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions by code. Never hold this lock while waiting on a session lock.
    pub sessions: Arc<RwLock<HashMap<SessionCode, SessionHandle>>>,
    pub config: Arc<GameConfig>,
    pub bank: Arc<QuestionBank>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(GameConfig::default(), QuestionBank::builtin())
    }

    pub fn with_config(config: GameConfig, bank: QuestionBank) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            bank: Arc::new(bank),
        }
    }

    /// Lock a live session for one mutation step
    pub(crate) async fn lock_session(&self, code: &str) -> SessionResult<OwnedMutexGuard<Session>> {
        let handle = self.get_session(code).await?;
        let session = handle.lock_owned().await;
        if session.closed {
            return Err(SessionError::SessionNotFound(code.to_string()));
        }
        Ok(session)
    }

    /// Like `lock_session`, but for timers: `None` once the session is gone
    /// or has moved past `generation`.
    pub(crate) async fn lock_for_timer(
        &self,
        code: &str,
        generation: u64,
    ) -> Option<OwnedMutexGuard<Session>> {
        let session = self.lock_session(code).await.ok()?;
        if session.generation != generation {
            tracing::debug!(
                "Session {}: dropping stale timer (generation {} != {})",
                code,
                generation,
                session.generation
            );
            return None;
        }
        Some(session)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

use super::lobby::{normalize_display_name, SessionJoin};
use super::{AppState, Session, SessionHandle};
use crate::error::{SessionError, SessionResult};
use crate::protocol::SessionSnapshot;
use crate::types::*;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Safe character set for session codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

fn generate_session_code() -> SessionCode {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

impl AppState {
    /// Create a multiplayer session with the caller as host
    pub async fn create_session(
        &self,
        mode: GameMode,
        category: Category,
        display_name: &str,
    ) -> SessionResult<SessionJoin> {
        if mode == GameMode::Solo {
            return Err(SessionError::MalformedRequest(
                "Solo games are not hosted by the server".to_string(),
            ));
        }

        let display_name = normalize_display_name(display_name)?;
        let host = Player::new(display_name, true);
        let questions = self
            .bank
            .select(category, self.config.questions_per_session);

        let mut sessions = self.sessions.write().await;

        // Collisions are rare with ~887M codes, but check anyway
        let code = loop {
            let code = generate_session_code();
            if !sessions.contains_key(&code) {
                break code;
            }
        };

        let mut session = Session::new(
            code.clone(),
            mode,
            category,
            questions,
            self.config.question_seconds,
            host,
        );
        let room_rx = session.subscribe();
        let snapshot = session.next_snapshot();
        let host = &session.players[0];
        let joined = SessionJoin {
            session_code: code.clone(),
            player_id: host.id.clone(),
            player_token: host.token.clone(),
            attach_epoch: host.attach_epoch,
            snapshot,
            room_rx,
        };

        tracing::info!(
            "Session {} created ({:?}, {}) by {}",
            code,
            mode,
            category,
            host.display_name
        );

        sessions.insert(code, Arc::new(Mutex::new(session)));
        Ok(joined)
    }

    /// Look up a session handle by code
    pub async fn get_session(&self, code: &str) -> SessionResult<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(code.to_string()))
    }

    /// Current snapshot of a session, without bumping its version
    pub async fn snapshot(&self, code: &str) -> SessionResult<SessionSnapshot> {
        let session = self.lock_session(code).await?;
        Ok(SessionSnapshot::from(&*session))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close a session and drop it from the registry. Its room channel closes
    /// once the last handle is released.
    pub(crate) async fn destroy_session(&self, session: &mut Session) {
        session.closed = true;
        session.bump_generation();
        self.sessions.write().await.remove(&session.code);
        tracing::info!("Session {} destroyed", session.code);
    }

    /// Destroy every session idle for longer than the configured timeout.
    /// Returns the codes that were removed.
    pub async fn reap_idle_sessions(&self) -> Vec<SessionCode> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let mut reaped = Vec::new();

        for handle in handles {
            let mut session = handle.lock().await;
            if session.closed || session.last_activity.elapsed() < self.config.session_idle_timeout {
                continue;
            }
            tracing::info!(
                "Session {} idle for {:?}, reaping",
                session.code,
                session.last_activity.elapsed()
            );
            self.destroy_session(&mut session).await;
            reaped.push(session.code.clone());
        }

        reaped
    }
}

/// Spawn the background task that reaps idle sessions
pub fn spawn_session_reaper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.reaper_interval);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let reaped = state.reap_idle_sessions().await;
            if !reaped.is_empty() {
                tracing::debug!("Reaped {} idle session(s)", reaped.len());
            }
        }
    });
}

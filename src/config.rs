//! Runtime configuration loaded from environment variables (and `.env`).

use std::path::PathBuf;
use std::time::Duration;

/// Server-level settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Directory with the built client, served as fallback
    pub static_dir: PathBuf,
    /// Optional JSON file replacing the built-in question bank
    pub question_bank_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("BIND_ADDR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let port = env_parse("PORT", 3000);

        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("static"));

        let question_bank_path = std::env::var("QUESTION_BANK_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            bind_addr,
            port,
            static_dir,
            question_bank_path,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Game rules and timings
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub questions_per_session: usize,
    /// Answer budget per question, the basis of the speed bonus
    pub question_seconds: u32,
    pub countdown_ticks: u32,
    pub countdown_tick: Duration,
    /// Pause between "everyone answered" and the next question
    pub settle_delay: Duration,
    /// How long a dropped player may resume before being removed (zero = remove at once)
    pub reconnect_grace: Duration,
    pub group_min_players: usize,
    pub max_group_size: usize,
    pub session_idle_timeout: Duration,
    pub reaper_interval: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            questions_per_session: 10,
            question_seconds: 15,
            countdown_ticks: 3,
            countdown_tick: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
            reconnect_grace: Duration::from_secs(15),
            group_min_players: 2,
            max_group_size: 8,
            session_idle_timeout: Duration::from_secs(3600),
            reaper_interval: Duration::from_secs(60),
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            questions_per_session: env_parse("QUESTIONS_PER_SESSION", defaults.questions_per_session)
                .max(1),
            question_seconds: env_parse("QUESTION_SECONDS", defaults.question_seconds).max(1),
            countdown_ticks: env_parse("COUNTDOWN_TICKS", defaults.countdown_ticks),
            countdown_tick: Duration::from_millis(env_parse(
                "COUNTDOWN_TICK_MS",
                defaults.countdown_tick.as_millis() as u64,
            )),
            settle_delay: Duration::from_millis(env_parse(
                "SETTLE_DELAY_MS",
                defaults.settle_delay.as_millis() as u64,
            )),
            reconnect_grace: Duration::from_secs(env_parse(
                "RECONNECT_GRACE_SECS",
                defaults.reconnect_grace.as_secs(),
            )),
            group_min_players: env_parse("GROUP_MIN_PLAYERS", defaults.group_min_players).max(2),
            max_group_size: env_parse("MAX_GROUP_SIZE", defaults.max_group_size),
            session_idle_timeout: Duration::from_secs(env_parse(
                "SESSION_IDLE_TIMEOUT_SECS",
                defaults.session_idle_timeout.as_secs(),
            )),
            reaper_interval: Duration::from_secs(
                env_parse("REAPER_INTERVAL_SECS", defaults.reaper_interval.as_secs()).max(1),
            ),
        };

        if config.max_group_size < config.group_min_players {
            tracing::warn!(
                "MAX_GROUP_SIZE ({}) is below GROUP_MIN_PLAYERS ({}), raising it",
                config.max_group_size,
                config.group_min_players
            );
            return Self {
                max_group_size: config.group_min_players,
                ..config
            };
        }

        config
    }
}

/// Parse an env var, falling back to `default` when unset or invalid
fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid value {:?} for {}, using default {}", raw, key, default);
                default
            }
        },
        Err(_) => default,
    }
}

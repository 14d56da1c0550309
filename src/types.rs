use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type SessionCode = String;
pub type PlayerId = String;
pub type PlayerToken = String;
pub type QuestionId = String;
pub type ChatMessageId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    /// Played entirely on the client, never registered on the server
    Solo,
    #[serde(alias = "1v1")]
    HeadToHead,
    Group,
}

/// How a mode decides that the game is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishRule {
    /// Everyone answered the final question
    AllAnswered,
    /// Everyone sent `playerFinished`
    AllFinished,
}

impl GameMode {
    pub fn finish_rule(&self) -> FinishRule {
        match self {
            GameMode::Group => FinishRule::AllFinished,
            GameMode::Solo | GameMode::HeadToHead => FinishRule::AllAnswered,
        }
    }

    pub fn supports_rematch(&self) -> bool {
        *self == GameMode::HeadToHead
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Football,
    Basketball,
    Tennis,
    Olympics,
    Mixed,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Football,
        Category::Basketball,
        Category::Tennis,
        Category::Olympics,
        Category::Mixed,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Football => write!(f, "football"),
            Self::Basketball => write!(f, "basketball"),
            Self::Tennis => write!(f, "tennis"),
            Self::Olympics => write!(f, "olympics"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    Lobby,
    Countdown,
    InProgress,
    Transitioning,
    GameOver,
}

impl GamePhase {
    /// Phases in which a departure can leave the session short of players
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            GamePhase::Countdown | GamePhase::InProgress | GamePhase::Transitioning
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub category: Category,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    /// Secret used to re-attach after a dropped connection; never broadcast
    pub token: PlayerToken,
    pub display_name: String,
    pub score: u32,
    pub is_host: bool,
    pub is_ready: bool,
    pub has_finished: bool,
    pub rematch_ready: bool,
    /// Seconds taken per answered question, in question order
    pub response_times: Vec<f64>,
    pub connected: bool,
    /// Bumped on every detach/resume so a stale grace timer can tell it lost the race
    pub attach_epoch: u64,
}

impl Player {
    pub fn new(display_name: String, is_host: bool) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            token: ulid::Ulid::new().to_string(),
            display_name,
            score: 0,
            is_host,
            is_ready: false,
            has_finished: false,
            rematch_ready: false,
            response_times: Vec::new(),
            connected: true,
            attach_epoch: 0,
        }
    }

    /// Back to the state of a freshly joined player (keeps identity and host flag)
    pub fn reset_progress(&mut self) {
        self.score = 0;
        self.is_ready = false;
        self.has_finished = false;
        self.rematch_ready = false;
        self.response_times.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: ChatMessageId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub message: String,
    pub timestamp: String,
}

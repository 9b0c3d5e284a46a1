use thiserror::Error;

/// Failures crossing the standup service boundary.
///
/// The first group are domain outcomes the caller is expected to turn into a
/// message for the user; `Database` and `Chat` are infrastructure failures.
#[derive(Debug, Error)]
pub enum StandupError {
    #[error("user {0} is not subscribed")]
    UserNotFound(String),

    #[error("no pending standup for user {0}")]
    NoPendingStandup(String),

    #[error("question index {0} is out of range")]
    CorruptState(i32),

    #[error("report {0} not found")]
    ReportNotFound(i32),

    #[error("report {0} is already closed")]
    ReportClosed(i32),

    #[error("standup state changed while the answer was being recorded")]
    StaleState,

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("chat delivery failed: {0}")]
    Chat(#[from] SlackError),
}

impl StandupError {
    pub fn is_domain(&self) -> bool {
        !matches!(self, StandupError::Database(_) | StandupError::Chat(_))
    }
}

/// Failures talking to the Slack Web API.
#[derive(Debug, Error)]
pub enum SlackError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

    #[error("{0} returned an unexpected response")]
    Malformed(String),
}

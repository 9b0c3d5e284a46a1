pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod messages;
pub mod models;
pub mod repository;
pub mod schema;
pub mod slack;
pub mod standup;
pub mod subscription;

#[cfg(test)]
pub(crate) mod test_support;

use rocket::FromForm;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct SlackEvent {
    pub r#type: String,
    pub token: Option<String>,
    pub challenge: Option<String>,
    pub team_id: Option<String>,
    pub event: Option<EventDetails>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EventDetails {
    pub r#type: String,
    pub user: Option<String>,
    pub text: Option<String>,
    pub channel: Option<String>,
    pub channel_type: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl EventDetails {
    /// Messages we posted ourselves (or any other bot did) come back as
    /// events too and must not be treated as answers.
    pub fn is_from_bot(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    /// A plain message typed by a person, not an edit, join or bot post.
    pub fn is_user_message(&self) -> bool {
        self.r#type == "message" && self.subtype.is_none() && !self.is_from_bot()
    }
}

#[derive(Debug, FromForm)]
pub struct SlackSlashEvent {
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub command: String,
    pub text: Option<String>,
    pub response_url: Option<String>,
    pub trigger_id: Option<String>,
}

/// Interactivity requests arrive as a form with one JSON-encoded field.
#[derive(Debug, FromForm)]
pub struct SlackInteractionForm {
    pub payload: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SlackResource {
    pub id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct InteractionMessage {
    pub ts: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct InteractionAction {
    pub action_id: String,
    pub value: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct InteractionPayload {
    pub r#type: String,
    pub user: SlackResource,
    pub team: Option<SlackResource>,
    pub channel: Option<SlackResource>,
    pub message: Option<InteractionMessage>,
    #[serde(default)]
    pub actions: Vec<InteractionAction>,
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over
/// `fallback_level`.
pub fn init_tracing(fallback_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

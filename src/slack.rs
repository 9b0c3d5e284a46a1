use crate::error::SlackError;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;

const API_BASE: &str = "https://slack.com/api";
const POST_MESSAGE: &str = "chat.postMessage";
const UPDATE_MESSAGE: &str = "chat.update";
const OPEN_CONVERSATION: &str = "conversations.open";
const USER_INFO: &str = "users.info";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests older than this are rejected even with a valid signature.
pub const SIGNATURE_MAX_AGE_SECS: i64 = 60 * 5;

type HmacSha256 = Hmac<Sha256>;

/// Address of a message that was posted, as needed to edit it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserProfile {
    pub name: String,
    pub real_name: Option<String>,
    pub email: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.real_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

/// What the standup workflow needs from the chat platform. Message payloads
/// are opaque JSON built by `messages`.
pub trait ChatClient: Send + Sync {
    fn send_direct_message(&self, user: &str, message: &Value)
        -> Result<PostedMessage, SlackError>;

    fn post_to_channel(&self, channel: &str, message: &Value)
        -> Result<PostedMessage, SlackError>;

    fn update_message(&self, channel: &str, ts: &str, message: &Value) -> Result<(), SlackError>;

    fn user_profile(&self, user: &str) -> Result<UserProfile, SlackError>;
}

/// Slack Web API client authenticated with a bot token.
pub struct SlackClient {
    token: String,
    api_base: String,
    http: reqwest::blocking::Client,
}

impl SlackClient {
    pub fn new(token: &str) -> Result<SlackClient, SlackError> {
        SlackClient::with_api_base(token, API_BASE)
    }

    pub fn with_api_base(token: &str, api_base: &str) -> Result<SlackClient, SlackError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(SlackClient {
            token: token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn call(&self, method: &str, payload: &Value) -> Result<Value, SlackError> {
        let response: Value = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.token)
            .json(payload)
            .send()?
            .error_for_status()?
            .json()?;

        check_ok(method, response)
    }

    fn open_direct_channel(&self, user: &str) -> Result<String, SlackError> {
        let response = self.call(OPEN_CONVERSATION, &json!({ "users": user }))?;
        response
            .pointer("/channel/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SlackError::Malformed(OPEN_CONVERSATION.to_string()))
    }
}

impl ChatClient for SlackClient {
    fn send_direct_message(
        &self,
        user: &str,
        message: &Value,
    ) -> Result<PostedMessage, SlackError> {
        let channel = self.open_direct_channel(user)?;
        self.post_to_channel(&channel, message)
    }

    fn post_to_channel(&self, channel: &str, message: &Value) -> Result<PostedMessage, SlackError> {
        let response = self.call(POST_MESSAGE, &with_field(message, "channel", channel))?;
        let posted = posted_message(&response)?;
        tracing::debug!(channel = %posted.channel, ts = %posted.ts, "posted message");
        Ok(posted)
    }

    fn update_message(&self, channel: &str, ts: &str, message: &Value) -> Result<(), SlackError> {
        let payload = with_field(&with_field(message, "channel", channel), "ts", ts);
        self.call(UPDATE_MESSAGE, &payload)?;
        Ok(())
    }

    fn user_profile(&self, user: &str) -> Result<UserProfile, SlackError> {
        let response: Value = self
            .http
            .get(format!("{}/{}", self.api_base, USER_INFO))
            .query(&[("user", user)])
            .bearer_auth(&self.token)
            .send()?
            .error_for_status()?
            .json()?;

        let response = check_ok(USER_INFO, response)?;
        let info: SlackUserInfo = serde_json::from_value(response["user"].clone())
            .map_err(|_| SlackError::Malformed(USER_INFO.to_string()))?;
        Ok(info.into())
    }
}

#[derive(Deserialize)]
struct SlackUserInfo {
    name: String,
    real_name: Option<String>,
    #[serde(default)]
    profile: SlackUserProfileFields,
}

#[derive(Deserialize, Default)]
struct SlackUserProfileFields {
    real_name: Option<String>,
    email: Option<String>,
}

impl From<SlackUserInfo> for UserProfile {
    fn from(info: SlackUserInfo) -> UserProfile {
        UserProfile {
            name: info.name,
            real_name: info.real_name.or(info.profile.real_name),
            email: info.profile.email,
        }
    }
}

fn check_ok(method: &str, response: Value) -> Result<Value, SlackError> {
    if response.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(response);
    }

    let error = response
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    Err(SlackError::Api {
        method: method.to_string(),
        error,
    })
}

fn posted_message(response: &Value) -> Result<PostedMessage, SlackError> {
    match (
        response.get("channel").and_then(Value::as_str),
        response.get("ts").and_then(Value::as_str),
    ) {
        (Some(channel), Some(ts)) => Ok(PostedMessage {
            channel: channel.to_string(),
            ts: ts.to_string(),
        }),
        _ => Err(SlackError::Malformed(POST_MESSAGE.to_string())),
    }
}

fn with_field(message: &Value, key: &str, value: &str) -> Value {
    let mut payload = message.clone();
    if let Some(fields) = payload.as_object_mut() {
        fields.insert(key.to_string(), json!(value));
    }
    payload
}

/// Computes the `X-Slack-Signature` value for a request body.
pub fn sign(secret: &str, timestamp: &str, body: &str) -> String {
    let digest = signer(secret, timestamp, body).finalize().into_bytes();
    format!("v0={}", hex::encode(digest))
}

/// Checks a request against its `X-Slack-Request-Timestamp` and
/// `X-Slack-Signature` headers. `now` is the current unix time in seconds.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    body: &str,
    signature: &str,
    now: i64,
) -> bool {
    let sent_at = match timestamp.parse::<i64>() {
        Ok(sent_at) => sent_at,
        Err(_) => return false,
    };
    if (now - sent_at).abs() > SIGNATURE_MAX_AGE_SECS {
        return false;
    }

    let expected = match signature.strip_prefix("v0=").map(hex::decode) {
        Some(Ok(bytes)) => bytes,
        _ => return false,
    };

    signer(secret, timestamp, body).verify_slice(&expected).is_ok()
}

fn signer(secret: &str, timestamp: &str, body: &str) -> HmacSha256 {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 takes keys of any length"),
    };
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body.as_bytes());
    mac
}

//! Fixtures shared by the unit tests.

use crate::config::Settings;
use crate::db::establish_connection;
use crate::error::SlackError;
use crate::models::{NewUser, Report, User, Workspace};
use crate::repository::{reports, users, workspaces};
use crate::slack::{ChatClient, PostedMessage, UserProfile};
use crate::standup::{Clock, StandupService};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use diesel::sqlite::SqliteConnection;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const REPORT_CHANNEL: &str = "C-REPORTS";

pub fn connection() -> SqliteConnection {
    establish_connection(":memory:").unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Write time for fixtures and direct repository calls.
pub fn timestamp() -> NaiveDateTime {
    date(2024, 1, 10).and_hms_opt(9, 0, 0).unwrap()
}

pub fn workspace(conn: &mut SqliteConnection, team_id: &str) -> Workspace {
    workspaces::get_or_create(conn, team_id, REPORT_CHANNEL, "09:30", "UTC", timestamp()).unwrap()
}

pub fn user(conn: &mut SqliteConnection, workspace: &Workspace, external_id: &str) -> User {
    let now = timestamp();
    let display_name = format!("Name {}", external_id);
    users::create(
        conn,
        &NewUser {
            workspace_id: workspace.id,
            external_user_id: external_id,
            display_name: &display_name,
            email: None,
            timezone: None,
            active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .unwrap()
}

/// An open, unanswered report.
pub fn report(conn: &mut SqliteConnection, user: &User, date: NaiveDate) -> Report {
    reports::get_or_create(conn, user.id, date, timestamp()).unwrap()
}

pub fn settings() -> Settings {
    Settings {
        slack_bot_token: "xoxb-test".to_string(),
        slack_signing_secret: "secret".to_string(),
        slack_default_channel: "C-DEFAULT".to_string(),
        database_url: ":memory:".to_string(),
        default_standup_time: "09:30".to_string(),
        default_timezone: chrono_tz::UTC,
        admin_token: None,
        skip_notification_to_channel: false,
        log_level: "debug".to_string(),
        port: 8800,
    }
}

pub fn service(now: DateTime<Utc>) -> StandupService<RecordingChat> {
    service_with(settings(), now)
}

pub fn service_with(settings: Settings, now: DateTime<Utc>) -> StandupService<RecordingChat> {
    StandupService::with_clock(
        settings,
        RecordingChat::default(),
        Box::new(FixedClock::new(now)),
    )
}

/// A clock tests can move. Clones share the same instant.
#[derive(Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> FixedClock {
        FixedClock {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// In-memory `ChatClient` that records what would have been sent. Any
/// recipient or channel passed to `fail_for` gets an API error instead.
#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<u32>,
    direct: Mutex<Vec<(String, Value)>>,
    posts: Mutex<Vec<(String, Value)>>,
    updates: Mutex<Vec<(String, String, Value)>>,
    failing: Mutex<HashSet<String>>,
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl RecordingChat {
    pub fn fail_for(&self, target: &str) {
        self.failing.lock().unwrap().insert(target.to_string());
    }

    pub fn recover(&self, target: &str) {
        self.failing.lock().unwrap().remove(target);
    }

    pub fn set_profile(&self, user: &str, profile: UserProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(user.to_string(), profile);
    }

    pub fn direct_messages(&self) -> Vec<(String, Value)> {
        self.direct.lock().unwrap().clone()
    }

    pub fn channel_posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, String, Value)> {
        self.updates.lock().unwrap().clone()
    }

    fn check(&self, method: &str, target: &str) -> Result<(), SlackError> {
        if self.failing.lock().unwrap().contains(target) {
            return Err(SlackError::Api {
                method: method.to_string(),
                error: "channel_not_found".to_string(),
            });
        }
        Ok(())
    }

    fn next_ts(&self) -> String {
        let mut sent = self.sent.lock().unwrap();
        *sent += 1;
        format!("{}.000", sent)
    }
}

impl ChatClient for RecordingChat {
    fn send_direct_message(
        &self,
        user: &str,
        message: &Value,
    ) -> Result<PostedMessage, SlackError> {
        self.check("chat.postMessage", user)?;
        self.direct
            .lock()
            .unwrap()
            .push((user.to_string(), message.clone()));
        Ok(PostedMessage {
            channel: format!("D-{}", user),
            ts: self.next_ts(),
        })
    }

    fn post_to_channel(&self, channel: &str, message: &Value) -> Result<PostedMessage, SlackError> {
        self.check("chat.postMessage", channel)?;
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), message.clone()));
        Ok(PostedMessage {
            channel: channel.to_string(),
            ts: self.next_ts(),
        })
    }

    fn update_message(&self, channel: &str, ts: &str, message: &Value) -> Result<(), SlackError> {
        self.check("chat.update", channel)?;
        self.updates
            .lock()
            .unwrap()
            .push((channel.to_string(), ts.to_string(), message.clone()));
        Ok(())
    }

    fn user_profile(&self, user: &str) -> Result<UserProfile, SlackError> {
        self.check("users.info", user)?;
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles.get(user).cloned().unwrap_or_else(|| UserProfile {
            name: user.to_lowercase(),
            real_name: Some(format!("Name {}", user)),
            email: None,
        }))
    }
}

use crate::schema::{pending_states, reports, users, workspaces};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;

/// Number of answer slots in one standup cycle.
pub const N_QUESTIONS: usize = 4;

/// The ordered answer slots of a standup. The position of a variant in
/// `Question::ALL` is the `current_question_index` stored in a pending state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Question {
    Feeling,
    Yesterday,
    Today,
    Blockers,
}

impl Question {
    pub const ALL: [Question; N_QUESTIONS] = [
        Question::Feeling,
        Question::Yesterday,
        Question::Today,
        Question::Blockers,
    ];

    pub fn from_index(index: i32) -> Option<Question> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Question::ALL.get(i).copied())
    }

    pub fn index(self) -> i32 {
        match self {
            Question::Feeling => 0,
            Question::Yesterday => 1,
            Question::Today => 2,
            Question::Blockers => 3,
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            Question::Feeling => "feeling",
            Question::Yesterday => "yesterday",
            Question::Today => "today",
            Question::Blockers => "blockers",
        }
    }

    pub fn is_last(self) -> bool {
        self.index() as usize == N_QUESTIONS - 1
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = workspaces)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Workspace {
    pub id: i32,
    pub external_team_id: String,
    pub report_channel_id: String,
    pub default_time: String,
    pub timezone: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = workspaces)]
pub struct NewWorkspace<'a> {
    pub external_team_id: &'a str,
    pub report_channel_id: &'a str,
    pub default_time: &'a str,
    pub timezone: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = workspaces)]
pub struct WorkspaceChanges {
    pub report_channel_id: Option<String>,
    pub default_time: Option<String>,
    pub timezone: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub workspace_id: i32,
    pub external_user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub timezone: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub workspace_id: i32,
    pub external_user_id: &'a str,
    pub display_name: &'a str,
    pub email: Option<&'a str>,
    pub timezone: Option<&'a str>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub display_name: Option<String>,
    pub email: Option<Option<String>>,
    pub timezone: Option<Option<String>>,
    pub active: Option<bool>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = reports)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Report {
    pub id: i32,
    pub user_id: i32,
    pub report_date: NaiveDate,
    pub feeling: Option<String>,
    pub yesterday: Option<String>,
    pub today: Option<String>,
    pub blockers: Option<String>,
    pub skipped: bool,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Report {
    /// A report is closed once it was completed or skipped; its answers
    /// are frozen from then on.
    pub fn is_closed(&self) -> bool {
        self.skipped || self.completed_at.is_some()
    }

    pub fn answer(&self, question: Question) -> Option<&str> {
        let value = match question {
            Question::Feeling => &self.feeling,
            Question::Yesterday => &self.yesterday,
            Question::Today => &self.today,
            Question::Blockers => &self.blockers,
        };
        value.as_deref()
    }
}

#[derive(Insertable)]
#[diesel(table_name = reports)]
pub struct NewReport {
    pub user_id: i32,
    pub report_date: NaiveDate,
    pub skipped: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = reports)]
pub struct ReportChanges {
    pub feeling: Option<Option<String>>,
    pub yesterday: Option<Option<String>>,
    pub today: Option<Option<String>>,
    pub blockers: Option<Option<String>>,
    pub skipped: Option<bool>,
    pub completed_at: Option<Option<NaiveDateTime>>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = pending_states)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PendingState {
    pub id: i32,
    pub user_id: i32,
    pub pending_report_date: NaiveDate,
    pub current_question_index: i32,
    pub prompt_channel: Option<String>,
    pub prompt_ts: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PendingState {
    /// Where the last question of this cycle was posted, if it was recorded.
    pub fn prompt(&self) -> Option<(&str, &str)> {
        match (&self.prompt_channel, &self.prompt_ts) {
            (Some(channel), Some(ts)) => Some((channel.as_str(), ts.as_str())),
            _ => None,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = pending_states)]
pub struct NewPendingState<'a> {
    pub user_id: i32,
    pub pending_report_date: NaiveDate,
    pub current_question_index: i32,
    pub prompt_channel: Option<&'a str>,
    pub prompt_ts: Option<&'a str>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

//! The standup state machine.
//!
//! A user is either idle (no pending state) or waiting on one of the
//! `N_QUESTIONS` answers for a report date. Dispatch is the only way into a
//! cycle; completing or skipping the report deletes the pending state and
//! ends it. Nothing is cached between calls: every operation reloads what it
//! needs from the database.

use crate::config::Settings;
use crate::dispatch::{decide, local_date, resolve_timezone, DispatchDecision};
use crate::error::StandupError;
use crate::messages::{self, ReportSummary};
use crate::models::{NewReport, Question, User, Workspace};
use crate::repository::{pending_states, reports, users, workspaces};
use crate::slack::{ChatClient, PostedMessage};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use diesel::sqlite::SqliteConnection;
use serde_json::Value;
use std::collections::HashMap;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The answer was stored; `question_index` is the question to ask next.
    NextQuestion { question_index: i32 },
    /// That was the last answer and the report is complete.
    Completed { report_id: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipOutcome {
    pub report_id: i32,
    pub report_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Posted { channel: String },
    Failed { message: String },
}

pub struct StandupService<C: ChatClient> {
    settings: Settings,
    chat: C,
    clock: Box<dyn Clock>,
}

impl<C: ChatClient> StandupService<C> {
    pub fn new(settings: Settings, chat: C) -> StandupService<C> {
        StandupService::with_clock(settings, chat, Box::new(SystemClock))
    }

    pub fn with_clock(settings: Settings, chat: C, clock: Box<dyn Clock>) -> StandupService<C> {
        StandupService {
            settings,
            chat,
            clock,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn chat(&self) -> &C {
        &self.chat
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// One dispatch tick over every active user. A failure for one user is
    /// logged and the loop moves on; only failing to list the users aborts.
    pub fn send_pending_standups(&self, conn: &mut SqliteConnection) -> Result<(), StandupError> {
        let now = self.clock.now();
        let active = users::list_active(conn)?;
        let mut workspace_cache: HashMap<i32, Option<Workspace>> = HashMap::new();
        let (mut opened, mut failed) = (0, 0);

        for user in &active {
            match self.dispatch_user(conn, user, &mut workspace_cache, now) {
                Ok(true) => opened += 1,
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    tracing::error!(user = %user.external_user_id, error = %e, "dispatch failed");
                }
            }
        }

        tracing::info!(users = active.len(), opened, failed, "dispatch finished");
        Ok(())
    }

    fn dispatch_user(
        &self,
        conn: &mut SqliteConnection,
        user: &User,
        workspace_cache: &mut HashMap<i32, Option<Workspace>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StandupError> {
        if !workspace_cache.contains_key(&user.workspace_id) {
            let workspace = workspaces::get_by_id(conn, user.workspace_id)?;
            workspace_cache.insert(user.workspace_id, workspace);
        }
        let workspace = workspace_cache.get(&user.workspace_id).and_then(Option::as_ref);

        let tz = resolve_timezone(user, workspace, self.settings.default_timezone);
        let today = local_date(now, tz);

        let todays_report = reports::get_by_user_and_date(conn, user.id, today)?;
        let latest_report = reports::get_latest_by_user(conn, user.id)?;
        let pending = pending_states::get_by_user(conn, user.id)?;
        let decision = decide(
            today,
            todays_report.as_ref(),
            latest_report.as_ref(),
            pending.as_ref(),
        );

        let date = match decision.pending_date() {
            Some(date) => date,
            None => {
                tracing::debug!(user = %user.external_user_id, ?decision, "nothing to dispatch");
                return Ok(false);
            }
        };

        let message = match decision {
            DispatchDecision::CatchUp { missed_date } => messages::missed_standup(missed_date),
            _ => messages::standup_start(),
        };

        // The state is only written once the DM went out, so a failed send
        // leaves the user untouched for the next tick.
        let posted = self.chat.send_direct_message(&user.external_user_id, &message)?;

        // An answer or skip may have landed while the DM was in flight. Only
        // write when the state is still the one `decide` looked at.
        let written_at = now.naive_utc();
        let written = conn.immediate_transaction(|conn| {
            if pending_states::get_by_user(conn, user.id)? != pending {
                return Ok::<_, StandupError>(false);
            }

            // A catch-up cycle refills the missed day, so its report has to be
            // open again before answers can land in it.
            if let DispatchDecision::CatchUp { missed_date } = decision {
                if let Some(report) = reports::get_by_user_and_date(conn, user.id, missed_date)? {
                    reports::reopen(conn, report.id, written_at)?;
                }
            }

            pending_states::create_or_replace(
                conn,
                user.id,
                date,
                Some((&posted.channel, &posted.ts)),
                written_at,
            )?;
            Ok(true)
        })?;

        if !written {
            tracing::warn!(
                user = %user.external_user_id,
                %date,
                "cycle changed while the prompt was being sent"
            );
            return Ok(false);
        }

        tracing::info!(
            user = %user.external_user_id,
            %date,
            catch_up = matches!(decision, DispatchDecision::CatchUp { .. }),
            "opened standup"
        );
        Ok(true)
    }

    /// Stores `answer` in the slot of the current question and moves the
    /// cycle forward, completing the report after the last question.
    pub fn handle_user_answer(
        &self,
        conn: &mut SqliteConnection,
        external_user_id: &str,
        answer: &str,
    ) -> Result<AnswerOutcome, StandupError> {
        let now = self.clock.now().naive_utc();

        let outcome = conn.immediate_transaction(|conn| {
            let user = find_user(conn, external_user_id)?;
            let state = pending_states::get_by_user(conn, user.id)?
                .ok_or_else(|| StandupError::NoPendingStandup(external_user_id.to_string()))?;

            let index = state.current_question_index;
            let question = Question::from_index(index).ok_or(StandupError::CorruptState(index))?;

            let report = reports::get_or_create(conn, user.id, state.pending_report_date, now)?;
            if report.is_closed()
                || !reports::record_answer(conn, report.id, question, answer, now)?
            {
                return Err(StandupError::ReportClosed(report.id));
            }

            if !pending_states::advance(conn, state.id, index, now)? {
                return Err(StandupError::StaleState);
            }

            tracing::debug!(
                user = %external_user_id,
                report_id = report.id,
                question = question.field(),
                "recorded answer"
            );

            if question.is_last() {
                reports::mark_completed(conn, report.id, now)?;
                pending_states::delete_for_user(conn, user.id)?;
                Ok(AnswerOutcome::Completed {
                    report_id: report.id,
                })
            } else {
                Ok(AnswerOutcome::NextQuestion {
                    question_index: index + 1,
                })
            }
        })?;

        if let AnswerOutcome::Completed { report_id } = outcome {
            tracing::info!(user = %external_user_id, report_id, "standup completed");
        }
        Ok(outcome)
    }

    /// Closes the pending cycle as skipped. Answers given so far are kept.
    pub fn handle_skip_today(
        &self,
        conn: &mut SqliteConnection,
        external_user_id: &str,
    ) -> Result<SkipOutcome, StandupError> {
        let now = self.clock.now().naive_utc();

        let (user, outcome) = conn.immediate_transaction(|conn| {
            let user = find_user(conn, external_user_id)?;
            let state = pending_states::get_by_user(conn, user.id)?
                .ok_or_else(|| StandupError::NoPendingStandup(external_user_id.to_string()))?;
            let date = state.pending_report_date;

            let report_id = match reports::get_by_user_and_date(conn, user.id, date)? {
                Some(report) => {
                    if !reports::mark_skipped(conn, report.id, now)? {
                        return Err(StandupError::ReportClosed(report.id));
                    }
                    report.id
                }
                None => {
                    reports::create(
                        conn,
                        &NewReport {
                            user_id: user.id,
                            report_date: date,
                            skipped: true,
                            created_at: now,
                            updated_at: now,
                        },
                    )?
                    .id
                }
            };

            pending_states::delete_for_user(conn, user.id)?;
            Ok((
                user,
                SkipOutcome {
                    report_id,
                    report_date: date,
                },
            ))
        })?;

        tracing::info!(
            user = %external_user_id,
            report_id = outcome.report_id,
            date = %outcome.report_date,
            "standup skipped"
        );

        if self.settings.skip_notification_to_channel {
            if let Err(e) = self.notify_skip(conn, &user) {
                tracing::warn!(user = %external_user_id, error = %e, "could not post skip notice");
            }
        }

        Ok(outcome)
    }

    fn notify_skip(&self, conn: &mut SqliteConnection, user: &User) -> Result<(), StandupError> {
        let channel = self.report_channel(conn, user)?;
        self.chat.post_to_channel(
            &channel,
            &messages::skip_notice(&user.display_name, &user.external_user_id),
        )?;
        Ok(())
    }

    /// Posts a report summary to its workspace channel. Delivery failures are
    /// returned as `PostOutcome::Failed`; only missing rows and storage
    /// errors come back as `Err`.
    pub fn post_report_to_channel(
        &self,
        conn: &mut SqliteConnection,
        report_id: i32,
    ) -> Result<PostOutcome, StandupError> {
        let report =
            reports::get_by_id(conn, report_id)?.ok_or(StandupError::ReportNotFound(report_id))?;
        let user = users::get_by_id(conn, report.user_id)?
            .ok_or_else(|| StandupError::UserNotFound(report.user_id.to_string()))?;
        let workspace = workspaces::get_by_id(conn, user.workspace_id)?;

        let channel = match &workspace {
            Some(workspace) => workspace.report_channel_id.clone(),
            None => self.settings.slack_default_channel.clone(),
        };
        let tz = resolve_timezone(&user, workspace.as_ref(), self.settings.default_timezone);
        let posted_at = match report.completed_at {
            Some(at) => Utc.from_utc_datetime(&at),
            None => self.clock.now(),
        };

        let summary = ReportSummary {
            user_name: &user.display_name,
            external_user_id: &user.external_user_id,
            feeling: report.answer(Question::Feeling),
            yesterday: report.answer(Question::Yesterday),
            today: report.answer(Question::Today),
            blockers: report.answer(Question::Blockers),
            timestamp: posted_at.with_timezone(&tz),
        };

        match self
            .chat
            .post_to_channel(&channel, &messages::report_summary(&summary))
        {
            Ok(_) => {
                tracing::info!(report_id, %channel, "report posted");
                Ok(PostOutcome::Posted { channel })
            }
            Err(e) => {
                tracing::error!(report_id, %channel, error = %e, "could not post report");
                Ok(PostOutcome::Failed {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Builds the prompt for `question_index` of the user's open cycle. The
    /// "yesterday" question quotes what the user planned in their previous
    /// report.
    pub fn question_prompt(
        &self,
        conn: &mut SqliteConnection,
        external_user_id: &str,
        question_index: i32,
    ) -> Result<Value, StandupError> {
        let user = find_user(conn, external_user_id)?;
        let state = pending_states::get_by_user(conn, user.id)?
            .ok_or_else(|| StandupError::NoPendingStandup(external_user_id.to_string()))?;

        let previous_today = if question_index == Question::Yesterday.index() {
            reports::get_latest_before(conn, user.id, state.pending_report_date)?
                .and_then(|report| report.today)
        } else {
            None
        };

        Ok(messages::question(question_index, previous_today.as_deref()))
    }

    /// Where the current question of the user's cycle was posted, with the
    /// index it asked.
    pub fn pending_prompt(
        &self,
        conn: &mut SqliteConnection,
        external_user_id: &str,
    ) -> Result<Option<(PostedMessage, i32)>, StandupError> {
        let user = find_user(conn, external_user_id)?;
        let state = pending_states::get_by_user(conn, user.id)?;

        Ok(state.and_then(|state| {
            state.prompt().map(|(channel, ts)| {
                (
                    PostedMessage {
                        channel: channel.to_string(),
                        ts: ts.to_string(),
                    },
                    state.current_question_index,
                )
            })
        }))
    }

    pub fn record_prompt(
        &self,
        conn: &mut SqliteConnection,
        external_user_id: &str,
        posted: &PostedMessage,
    ) -> Result<bool, StandupError> {
        let user = find_user(conn, external_user_id)?;
        Ok(pending_states::set_prompt(
            conn,
            user.id,
            &posted.channel,
            &posted.ts,
            self.clock.now().naive_utc(),
        )?)
    }

    fn report_channel(
        &self,
        conn: &mut SqliteConnection,
        user: &User,
    ) -> Result<String, StandupError> {
        Ok(match workspaces::get_by_id(conn, user.workspace_id)? {
            Some(workspace) => workspace.report_channel_id,
            None => self.settings.slack_default_channel.clone(),
        })
    }
}

fn find_user(conn: &mut SqliteConnection, external_user_id: &str) -> Result<User, StandupError> {
    users::get_by_external_id(conn, external_user_id)?
        .ok_or_else(|| StandupError::UserNotFound(external_user_id.to_string()))
}

//! Slack Block Kit payloads for everything the bot says.
//!
//! The standup service hands these raw field values and never looks inside
//! the result.

use crate::models::{Question, N_QUESTIONS};
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde_json::{json, Value};

pub const SKIP_ACTION: &str = "button_skip_today";
pub const PAUSE_ACTION: &str = "button_pause_standups";

/// Field values for a completed report posted to the team channel.
#[derive(Debug, Clone)]
pub struct ReportSummary<'a> {
    pub user_name: &'a str,
    pub external_user_id: &'a str,
    pub feeling: Option<&'a str>,
    pub yesterday: Option<&'a str>,
    pub today: Option<&'a str>,
    pub blockers: Option<&'a str>,
    pub timestamp: DateTime<Tz>,
}

fn question_title(question: Question) -> &'static str {
    match question {
        Question::Feeling => "How are you feeling today?",
        Question::Yesterday => "What did you do yesterday?",
        Question::Today => "What are you doing today?",
        Question::Blockers => "Anything blocking your progress?",
    }
}

fn section(text: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    })
}

fn context(text: &str) -> Value {
    json!({
        "type": "context",
        "elements": [{ "type": "mrkdwn", "text": text }]
    })
}

fn button(label: &str, value: &str, action_id: &str, style: Option<&str>) -> Value {
    let mut button = json!({
        "type": "button",
        "text": { "type": "plain_text", "text": label },
        "value": value,
        "action_id": action_id,
    });
    if let (Some(style), Some(fields)) = (style, button.as_object_mut()) {
        fields.insert("style".to_string(), json!(style));
    }
    button
}

fn skip_button() -> Value {
    button("Skip Today", "skip_today", SKIP_ACTION, Some("danger"))
}

fn plain(text: &str) -> Value {
    json!({ "text": text })
}

/// Opening DM of a fresh cycle: the first question plus skip and pause.
pub fn standup_start() -> Value {
    json!({
        "text": "Daily Standup",
        "blocks": [
            section(&format!(
                ":wave: Hey! Time for today's standup.\n\nFirst question: *{}*",
                question_title(Question::Feeling)
            )),
            {
                "type": "actions",
                "elements": [
                    skip_button(),
                    button("Pause Standups", "pause_standups", PAUSE_ACTION, None),
                ]
            }
        ]
    })
}

/// Opening DM of a catch-up cycle for `missed_date`.
pub fn missed_standup(missed_date: NaiveDate) -> Value {
    json!({
        "text": "Catch up standup",
        "blocks": [
            section(&format!(
                ":thinking_face: Looks like you missed your last report on *{}*.\n\nLet's finish it first: *{}*",
                format_date(missed_date),
                question_title(Question::Feeling)
            )),
            { "type": "actions", "elements": [skip_button()] }
        ]
    })
}

/// Prompt for question `index`. Out-of-range indexes fall back to the first
/// question. `previous_today` is shown with the "yesterday" question.
pub fn question(index: i32, previous_today: Option<&str>) -> Value {
    let question = Question::from_index(index).unwrap_or(Question::Feeling);

    let mut text = format!(
        "*Question {} of {}:*\n{}",
        question.index() + 1,
        N_QUESTIONS,
        question_title(question)
    );
    if let (Question::Yesterday, Some(previous)) = (question, previous_today) {
        text.push_str(&format!(
            "\n\nIn your previous report you mentioned: _{}_",
            escape(previous)
        ));
    }
    text.push_str("\n\nJust type your answer below and press Enter!");

    json!({
        "text": format!("Standup Q{}", question.index() + 1),
        "blocks": [
            section(&text),
            { "type": "actions", "elements": [skip_button()] }
        ]
    })
}

/// Replaces a prompt once it has been answered, dropping its buttons.
pub fn question_answered(index: i32) -> Value {
    let question = Question::from_index(index).unwrap_or(Question::Feeling);
    let text = format!(
        "*Question {} of {}:*\n{}",
        question.index() + 1,
        N_QUESTIONS,
        question_title(question)
    );

    json!({
        "text": format!("Standup Q{}", question.index() + 1),
        "blocks": [section(&text), context(":white_check_mark: Answered")]
    })
}

pub fn report_summary(summary: &ReportSummary) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": ":spiral_note_pad: Daily Standup", "emoji": true }
        }),
        section(&format!(
            "{}\n_{}_",
            user_link(summary.external_user_id),
            escape(summary.user_name)
        )),
    ];

    if let Some(feeling) = summary.feeling {
        blocks.push(context(&format!(":heart: Feeling: {}", escape(feeling))));
    }

    let sections = [
        ("What have you done since yesterday?", summary.yesterday, "#38BDF8"),
        ("What will you do today?", summary.today, "#A855F7"),
        ("Anything blocking your progress?", summary.blockers, "#F97316"),
    ];
    let attachments: Vec<Value> = sections
        .iter()
        .filter_map(|&(title, answer, color)| {
            answer.map(|answer| {
                json!({
                    "color": color,
                    "blocks": [section(&format!("*{}*", title)), section(&escape(answer))]
                })
            })
        })
        .collect();

    blocks.push(context(&format!(
        "Posted by *Daily Standup Bot* • {}",
        summary.timestamp.format("%Y-%m-%d %H:%M %Z")
    )));

    json!({
        "text": format!("Daily Standup - {}", summary.user_name),
        "blocks": blocks,
        "attachments": attachments,
    })
}

pub fn skip_notice(user_name: &str, external_user_id: &str) -> Value {
    json!({
        "text": format!("{} skipped today", user_name),
        "blocks": [section(&format!("{} skipped standup today", user_link(external_user_id)))]
    })
}

pub fn error(message: &str) -> Value {
    json!({
        "text": "Standup Error",
        "blocks": [
            section(&format!(":warning: *Oops!*\n{}", message)),
            context("Please try again later or contact support.")
        ]
    })
}

pub fn completion() -> Value {
    json!({
        "text": "Standup Complete",
        "blocks": [section(":white_check_mark: *Thanks!* Your standup has been posted. Great job!")]
    })
}

pub fn skipped() -> Value {
    json!({
        "text": "Skipped",
        "blocks": [section(":ok_hand: You've skipped today's standup.")]
    })
}

pub fn paused() -> Value {
    json!({
        "text": "Paused",
        "blocks": [section(
            ":pause_button: Standups have been paused for you. Use `/standup subscribe` to resume."
        )]
    })
}

/// Replaces a clicked message when its action failed.
pub fn action_failed(message: &str) -> Value {
    json!({
        "text": "Standup Error",
        "blocks": [section(&format!(":warning: *Oops!*\n{}", message))]
    })
}

pub fn not_subscribed() -> Value {
    plain(
        ":wave: Hi! I'm the Daily Standup Bot.\n\n\
         You're not currently subscribed to standups. \
         Use `/standup subscribe` to start receiving daily prompts!",
    )
}

pub fn nothing_pending() -> Value {
    plain(
        "No pending standup right now. \
         I'll send you a standup prompt at the scheduled time.",
    )
}

pub fn generic_failure() -> Value {
    error("Something went wrong while recording your answer.")
}

pub fn mention() -> Value {
    plain(
        ":wave: Hi! I'm the Daily Standup Bot.\n\n\
         Use `/standup subscribe` to start receiving daily standup prompts!\n\
         Use `/standup unsubscribe` to stop receiving them.\n\
         Use `/standup status` to see who's subscribed.",
    )
}

pub fn help() -> Value {
    plain(
        "*Daily Standup Bot Commands*\n\n\
         `/standup subscribe` - Subscribe to daily standups\n\
         `/standup unsubscribe` - Stop receiving standups\n\
         `/standup status` - See who's subscribed\n\
         `/standup help` - Show this message",
    )
}

pub fn subscribed(default_time: &str, timezone: &str) -> Value {
    plain(&format!(
        ":tada: Welcome! You're now subscribed to daily standups. \
         You'll receive prompts at {} ({}).",
        default_time, timezone
    ))
}

pub fn already_subscribed() -> Value {
    plain(":warning: You're already subscribed to daily standups!")
}

pub fn unsubscribed() -> Value {
    plain(":wave: You've been unsubscribed from daily standups.")
}

pub fn not_currently_subscribed() -> Value {
    plain(":information_source: You're not currently subscribed to standups.")
}

pub fn status<S: AsRef<str>>(subscribers: &[S]) -> Value {
    let mut text = format!(
        ":clipboard: *Daily Standup Status*\nSubscribed users: {}\n\n",
        subscribers.len()
    );

    if subscribers.is_empty() {
        text.push_str("No subscribers yet. Use `/standup subscribe` to join!");
    } else {
        let list: Vec<String> = subscribers
            .iter()
            .map(|name| format!("• {}", escape(name.as_ref())))
            .collect();
        text.push_str(&format!("*Subscribers:*\n{}", list.join("\n")));
    }

    plain(&text)
}

pub fn unknown_command() -> Value {
    plain(":x: Unknown command. Use `/standup help` for available commands.")
}

pub fn command_failed() -> Value {
    plain(":x: An error occurred. Please try again later.")
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// Escapes the three characters Slack treats as control sequences.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn user_link(external_user_id: &str) -> String {
    format!("<@{}>", external_user_id)
}

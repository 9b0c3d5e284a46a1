//! Per-user dispatch decision.
//!
//! Kept free of I/O: the standup service loads the rows, asks `decide` what
//! to do and carries it out.

use crate::models::{PendingState, Report, User, Workspace};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    /// A report for today already exists.
    AlreadyReported,
    /// The cycle this tick would open is already open.
    AlreadyPending { date: NaiveDate },
    /// Open a cycle for today.
    Fresh { date: NaiveDate },
    /// The latest report is from before today; reopen that day.
    CatchUp { missed_date: NaiveDate },
}

impl DispatchDecision {
    /// The report date a new cycle would target, if one should be opened.
    pub fn pending_date(&self) -> Option<NaiveDate> {
        match *self {
            DispatchDecision::Fresh { date } => Some(date),
            DispatchDecision::CatchUp { missed_date } => Some(missed_date),
            DispatchDecision::AlreadyReported | DispatchDecision::AlreadyPending { .. } => None,
        }
    }
}

pub fn decide(
    today: NaiveDate,
    todays_report: Option<&Report>,
    latest_report: Option<&Report>,
    pending: Option<&PendingState>,
) -> DispatchDecision {
    if todays_report.is_some() {
        return DispatchDecision::AlreadyReported;
    }

    let decision = match latest_report {
        Some(latest) if latest.report_date < today => DispatchDecision::CatchUp {
            missed_date: latest.report_date,
        },
        _ => DispatchDecision::Fresh { date: today },
    };

    match (decision.pending_date(), pending) {
        (Some(date), Some(state)) if state.pending_report_date == date => {
            DispatchDecision::AlreadyPending { date }
        }
        _ => decision,
    }
}

/// User override, then workspace, then `fallback`. Names that do not parse
/// are logged and passed over.
pub fn resolve_timezone(user: &User, workspace: Option<&Workspace>, fallback: Tz) -> Tz {
    let candidates = [
        ("user", user.timezone.as_deref()),
        ("workspace", workspace.map(|w| w.timezone.as_str())),
    ];

    for &(source, name) in &candidates {
        if let Some(name) = name {
            match name.parse::<Tz>() {
                Ok(tz) => return tz,
                Err(_) => tracing::warn!(
                    user = %user.external_user_id,
                    source,
                    timezone = %name,
                    "ignoring unknown timezone"
                ),
            }
        }
    }

    fallback
}

pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

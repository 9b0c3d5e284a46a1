use crate::models::{NewReport, Question, Report, ReportChanges};
use crate::schema::reports;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

pub fn get_by_id(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Report>> {
    reports::table
        .find(id)
        .select(Report::as_select())
        .first(conn)
        .optional()
}

pub fn get_by_user_and_date(
    conn: &mut SqliteConnection,
    user_id: i32,
    date: NaiveDate,
) -> QueryResult<Option<Report>> {
    reports::table
        .filter(reports::user_id.eq(user_id))
        .filter(reports::report_date.eq(date))
        .select(Report::as_select())
        .first(conn)
        .optional()
}

/// Most recent report by date, whatever its completion status.
pub fn get_latest_by_user(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> QueryResult<Option<Report>> {
    reports::table
        .filter(reports::user_id.eq(user_id))
        .order(reports::report_date.desc())
        .select(Report::as_select())
        .first(conn)
        .optional()
}

pub fn get_latest_before(
    conn: &mut SqliteConnection,
    user_id: i32,
    date: NaiveDate,
) -> QueryResult<Option<Report>> {
    reports::table
        .filter(reports::user_id.eq(user_id))
        .filter(reports::report_date.lt(date))
        .order(reports::report_date.desc())
        .select(Report::as_select())
        .first(conn)
        .optional()
}

pub fn create(conn: &mut SqliteConnection, new_report: &NewReport) -> QueryResult<Report> {
    diesel::insert_into(reports::table)
        .values(new_report)
        .execute(conn)?;

    reports::table
        .filter(reports::user_id.eq(new_report.user_id))
        .filter(reports::report_date.eq(new_report.report_date))
        .select(Report::as_select())
        .first(conn)
}

/// Fetches the report for `(user_id, date)`, inserting an empty one first if
/// needed. A concurrent insert of the same row is absorbed by the unique
/// constraint and the existing row is returned.
pub fn get_or_create(
    conn: &mut SqliteConnection,
    user_id: i32,
    date: NaiveDate,
    now: NaiveDateTime,
) -> QueryResult<Report> {
    diesel::insert_into(reports::table)
        .values(&NewReport {
            user_id,
            report_date: date,
            skipped: false,
            created_at: now,
            updated_at: now,
        })
        .on_conflict((reports::user_id, reports::report_date))
        .do_nothing()
        .execute(conn)?;

    reports::table
        .filter(reports::user_id.eq(user_id))
        .filter(reports::report_date.eq(date))
        .select(Report::as_select())
        .first(conn)
}

pub fn update(
    conn: &mut SqliteConnection,
    id: i32,
    mut changes: ReportChanges,
    now: NaiveDateTime,
) -> QueryResult<Report> {
    changes.updated_at = Some(now);
    diesel::update(reports::table.find(id))
        .set(&changes)
        .execute(conn)?;

    reports::table
        .find(id)
        .select(Report::as_select())
        .first(conn)
}

/// Writes one answer slot of an open report. Closed reports are left alone;
/// the return value says whether a row was written.
pub fn record_answer(
    conn: &mut SqliteConnection,
    id: i32,
    question: Question,
    answer: &str,
    now: NaiveDateTime,
) -> QueryResult<bool> {
    let text = Some(Some(answer.to_string()));
    let changes = match question {
        Question::Feeling => ReportChanges {
            feeling: text,
            ..ReportChanges::default()
        },
        Question::Yesterday => ReportChanges {
            yesterday: text,
            ..ReportChanges::default()
        },
        Question::Today => ReportChanges {
            today: text,
            ..ReportChanges::default()
        },
        Question::Blockers => ReportChanges {
            blockers: text,
            ..ReportChanges::default()
        },
    };
    let changes = ReportChanges {
        updated_at: Some(now),
        ..changes
    };

    let updated = diesel::update(
        reports::table
            .find(id)
            .filter(reports::skipped.eq(false))
            .filter(reports::completed_at.is_null()),
    )
    .set(&changes)
    .execute(conn)?;
    Ok(updated == 1)
}

pub fn mark_completed(
    conn: &mut SqliteConnection,
    id: i32,
    now: NaiveDateTime,
) -> QueryResult<bool> {
    let updated = diesel::update(
        reports::table
            .find(id)
            .filter(reports::skipped.eq(false))
            .filter(reports::completed_at.is_null()),
    )
    .set((
        reports::completed_at.eq(Some(now)),
        reports::updated_at.eq(now),
    ))
    .execute(conn)?;
    Ok(updated == 1)
}

/// Flags a report skipped, keeping whatever answers it already holds.
pub fn mark_skipped(conn: &mut SqliteConnection, id: i32, now: NaiveDateTime) -> QueryResult<bool> {
    let updated = diesel::update(
        reports::table
            .find(id)
            .filter(reports::skipped.eq(false))
            .filter(reports::completed_at.is_null()),
    )
    .set((reports::skipped.eq(true), reports::updated_at.eq(now)))
    .execute(conn)?;
    Ok(updated == 1)
}

/// Clears the completed and skipped flags so a catch-up cycle can refill the
/// report. Answers already stored stay until they are overwritten. Returns
/// whether the report was closed.
pub fn reopen(conn: &mut SqliteConnection, id: i32, now: NaiveDateTime) -> QueryResult<bool> {
    let updated = diesel::update(
        reports::table
            .find(id)
            .filter(reports::skipped.eq(true).or(reports::completed_at.is_not_null())),
    )
    .set((
        reports::skipped.eq(false),
        reports::completed_at.eq(None::<NaiveDateTime>),
        reports::updated_at.eq(now),
    ))
    .execute(conn)?;
    Ok(updated == 1)
}

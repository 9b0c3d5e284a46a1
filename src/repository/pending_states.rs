use crate::models::{NewPendingState, PendingState};
use crate::schema::pending_states;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

pub fn get_by_user(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> QueryResult<Option<PendingState>> {
    pending_states::table
        .filter(pending_states::user_id.eq(user_id))
        .select(PendingState::as_select())
        .first(conn)
        .optional()
}

/// Opens a cycle for `date` at the first question, replacing any state the
/// user already had. `prompt` is the channel and ts of the opening message.
pub fn create_or_replace(
    conn: &mut SqliteConnection,
    user_id: i32,
    date: NaiveDate,
    prompt: Option<(&str, &str)>,
    now: NaiveDateTime,
) -> QueryResult<PendingState> {
    let (prompt_channel, prompt_ts) = match prompt {
        Some((channel, ts)) => (Some(channel), Some(ts)),
        None => (None, None),
    };

    diesel::insert_into(pending_states::table)
        .values(&NewPendingState {
            user_id,
            pending_report_date: date,
            current_question_index: 0,
            prompt_channel,
            prompt_ts,
            created_at: now,
            updated_at: now,
        })
        .on_conflict(pending_states::user_id)
        .do_update()
        .set((
            pending_states::pending_report_date.eq(date),
            pending_states::current_question_index.eq(0),
            pending_states::prompt_channel.eq(prompt_channel),
            pending_states::prompt_ts.eq(prompt_ts),
            pending_states::updated_at.eq(now),
        ))
        .execute(conn)?;

    pending_states::table
        .filter(pending_states::user_id.eq(user_id))
        .select(PendingState::as_select())
        .first(conn)
}

/// Moves a state from `expected` to the next question. Returns `false` when
/// the row no longer sits at `expected`, i.e. someone else advanced or
/// closed it first.
pub fn advance(
    conn: &mut SqliteConnection,
    state_id: i32,
    expected: i32,
    now: NaiveDateTime,
) -> QueryResult<bool> {
    let updated = diesel::update(
        pending_states::table
            .find(state_id)
            .filter(pending_states::current_question_index.eq(expected)),
    )
    .set((
        pending_states::current_question_index.eq(expected + 1),
        pending_states::updated_at.eq(now),
    ))
    .execute(conn)?;
    Ok(updated == 1)
}

pub fn set_prompt(
    conn: &mut SqliteConnection,
    user_id: i32,
    channel: &str,
    ts: &str,
    now: NaiveDateTime,
) -> QueryResult<bool> {
    let updated = diesel::update(pending_states::table.filter(pending_states::user_id.eq(user_id)))
        .set((
            pending_states::prompt_channel.eq(Some(channel)),
            pending_states::prompt_ts.eq(Some(ts)),
            pending_states::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(updated == 1)
}

pub fn delete_for_user(conn: &mut SqliteConnection, user_id: i32) -> QueryResult<bool> {
    let deleted = diesel::delete(pending_states::table.filter(pending_states::user_id.eq(user_id)))
        .execute(conn)?;
    Ok(deleted > 0)
}

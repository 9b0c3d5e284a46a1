use crate::models::{NewUser, User, UserChanges};
use crate::schema::{pending_states, reports, users};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

pub fn get_by_id(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<User>> {
    users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub fn get_by_external_id(
    conn: &mut SqliteConnection,
    external_user_id: &str,
) -> QueryResult<Option<User>> {
    users::table
        .filter(users::external_user_id.eq(external_user_id))
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub fn list_active(conn: &mut SqliteConnection) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::active.eq(true))
        .order(users::id.asc())
        .select(User::as_select())
        .load(conn)
}

pub fn list_active_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: i32,
) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::workspace_id.eq(workspace_id))
        .filter(users::active.eq(true))
        .order(users::display_name.asc())
        .select(User::as_select())
        .load(conn)
}

pub fn list_all(conn: &mut SqliteConnection) -> QueryResult<Vec<User>> {
    users::table
        .order(users::id.asc())
        .select(User::as_select())
        .load(conn)
}

pub fn create(conn: &mut SqliteConnection, new_user: &NewUser) -> QueryResult<User> {
    diesel::insert_into(users::table)
        .values(new_user)
        .execute(conn)?;

    users::table
        .filter(users::external_user_id.eq(new_user.external_user_id))
        .select(User::as_select())
        .first(conn)
}

/// Applies the non-`None` fields of `changes`. `email` and `timezone` take
/// `Some(None)` to clear the column.
pub fn update(
    conn: &mut SqliteConnection,
    id: i32,
    mut changes: UserChanges,
    now: NaiveDateTime,
) -> QueryResult<User> {
    changes.updated_at = Some(now);
    diesel::update(users::table.find(id))
        .set(&changes)
        .execute(conn)?;

    users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
}

pub fn set_active(
    conn: &mut SqliteConnection,
    id: i32,
    active: bool,
    now: NaiveDateTime,
) -> QueryResult<User> {
    update(
        conn,
        id,
        UserChanges {
            active: Some(active),
            ..UserChanges::default()
        },
        now,
    )
}

/// Deletes a user with its reports and pending state. Returns whether the
/// user existed.
pub fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<bool> {
    conn.transaction(|conn| {
        diesel::delete(pending_states::table.filter(pending_states::user_id.eq(id)))
            .execute(conn)?;
        diesel::delete(reports::table.filter(reports::user_id.eq(id))).execute(conn)?;
        let deleted = diesel::delete(users::table.find(id)).execute(conn)?;
        Ok(deleted > 0)
    })
}

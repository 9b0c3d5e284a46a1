use crate::models::{NewWorkspace, Workspace, WorkspaceChanges};
use crate::schema::{pending_states, reports, users, workspaces};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

pub fn get_by_id(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Workspace>> {
    workspaces::table
        .find(id)
        .select(Workspace::as_select())
        .first(conn)
        .optional()
}

pub fn get_by_external_id(
    conn: &mut SqliteConnection,
    team_id: &str,
) -> QueryResult<Option<Workspace>> {
    workspaces::table
        .filter(workspaces::external_team_id.eq(team_id))
        .select(Workspace::as_select())
        .first(conn)
        .optional()
}

pub fn list_all(conn: &mut SqliteConnection) -> QueryResult<Vec<Workspace>> {
    workspaces::table
        .order(workspaces::id.asc())
        .select(Workspace::as_select())
        .load(conn)
}

/// Returns the workspace for `team_id`, creating it with the given defaults
/// when it does not exist yet. Two callers racing on the same team both get
/// the row the first one inserted.
pub fn get_or_create(
    conn: &mut SqliteConnection,
    team_id: &str,
    report_channel_id: &str,
    default_time: &str,
    timezone: &str,
    now: NaiveDateTime,
) -> QueryResult<Workspace> {
    let workspace = NewWorkspace {
        external_team_id: team_id,
        report_channel_id,
        default_time,
        timezone,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(workspaces::table)
        .values(&workspace)
        .on_conflict(workspaces::external_team_id)
        .do_nothing()
        .execute(conn)?;

    workspaces::table
        .filter(workspaces::external_team_id.eq(team_id))
        .select(Workspace::as_select())
        .first(conn)
}

pub fn update(
    conn: &mut SqliteConnection,
    id: i32,
    mut changes: WorkspaceChanges,
    now: NaiveDateTime,
) -> QueryResult<Workspace> {
    changes.updated_at = Some(now);
    diesel::update(workspaces::table.find(id))
        .set(&changes)
        .execute(conn)?;

    workspaces::table
        .find(id)
        .select(Workspace::as_select())
        .first(conn)
}

/// Deletes a workspace together with its users and everything they own.
/// Returns whether the workspace existed.
pub fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<bool> {
    conn.transaction(|conn| {
        let members: Vec<i32> = users::table
            .filter(users::workspace_id.eq(id))
            .select(users::id)
            .load(conn)?;

        diesel::delete(pending_states::table.filter(pending_states::user_id.eq_any(&members)))
            .execute(conn)?;
        diesel::delete(reports::table.filter(reports::user_id.eq_any(&members))).execute(conn)?;
        diesel::delete(users::table.filter(users::workspace_id.eq(id))).execute(conn)?;

        let deleted = diesel::delete(workspaces::table.find(id)).execute(conn)?;
        Ok(deleted > 0)
    })
}

use crate::config::Settings;
use crate::models::{NewUser, User, UserChanges, Workspace};
use crate::repository::{users, workspaces};
use crate::slack::UserProfile;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    Created(User),
    Reactivated(User),
    AlreadySubscribed(User),
}

/// Resolves the workspace a slash command came from, creating it on first
/// use. A command typed in a DM cannot name a report channel, so the
/// configured default is used instead.
pub fn workspace_for_command(
    conn: &mut SqliteConnection,
    settings: &Settings,
    team_id: &str,
    channel_id: &str,
    now: NaiveDateTime,
) -> QueryResult<Workspace> {
    let report_channel = if channel_id.is_empty() || channel_id.starts_with('D') {
        settings.slack_default_channel.as_str()
    } else {
        channel_id
    };

    workspaces::get_or_create(
        conn,
        team_id,
        report_channel,
        &settings.default_standup_time,
        settings.default_timezone.name(),
        now,
    )
}

pub fn subscribe(
    conn: &mut SqliteConnection,
    workspace: &Workspace,
    external_user_id: &str,
    profile: &UserProfile,
    now: NaiveDateTime,
) -> QueryResult<SubscribeOutcome> {
    conn.transaction(|conn| {
        if let Some(existing) = users::get_by_external_id(conn, external_user_id)? {
            if existing.active {
                return Ok(SubscribeOutcome::AlreadySubscribed(existing));
            }

            let user = users::update(
                conn,
                existing.id,
                UserChanges {
                    display_name: Some(profile.display_name().to_string()),
                    email: profile.email.clone().map(Some),
                    active: Some(true),
                    ..UserChanges::default()
                },
                now,
            )?;
            tracing::info!(user = %external_user_id, "user resubscribed");
            return Ok(SubscribeOutcome::Reactivated(user));
        }

        let user = users::create(
            conn,
            &NewUser {
                workspace_id: workspace.id,
                external_user_id,
                display_name: profile.display_name(),
                email: profile.email.as_deref(),
                timezone: None,
                active: true,
                created_at: now,
                updated_at: now,
            },
        )?;
        tracing::info!(
            user = %external_user_id,
            workspace = %workspace.external_team_id,
            "user subscribed"
        );
        Ok(SubscribeOutcome::Created(user))
    })
}

/// Pauses prompts for a user. Returns the user when they were subscribed;
/// reports and any open cycle are kept.
pub fn unsubscribe(
    conn: &mut SqliteConnection,
    external_user_id: &str,
    now: NaiveDateTime,
) -> QueryResult<Option<User>> {
    match users::get_by_external_id(conn, external_user_id)? {
        Some(user) if user.active => {
            let user = users::set_active(conn, user.id, false, now)?;
            tracing::info!(user = %external_user_id, "user unsubscribed");
            Ok(Some(user))
        }
        _ => Ok(None),
    }
}

pub fn subscribers(conn: &mut SqliteConnection, workspace_id: i32) -> QueryResult<Vec<User>> {
    users::list_active_by_workspace(conn, workspace_id)
}

#[cfg(test)]
mod test {
    use crate::slack::UserProfile;
    use crate::subscription::{
        subscribe, subscribers, unsubscribe, workspace_for_command, SubscribeOutcome,
    };
    use crate::test_support::{connection, settings, timestamp, workspace};

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            name: name.to_lowercase(),
            real_name: Some(name.to_string()),
            email: Some(format!("{}@example.com", name.to_lowercase())),
        }
    }

    #[test]
    fn command_from_channel_sets_report_channel() {
        let mut conn = connection();
        let now = timestamp();
        let ws = workspace_for_command(&mut conn, &settings(), "T1", "C-TEAM", now).unwrap();
        assert_eq!(ws.report_channel_id, "C-TEAM");
        assert_eq!(ws.timezone, "UTC");
        assert_eq!(ws.default_time, "09:30");

        // Later commands do not move an existing workspace.
        let again = workspace_for_command(&mut conn, &settings(), "T1", "C-OTHER", now).unwrap();
        assert_eq!(again.report_channel_id, "C-TEAM");
    }

    #[test]
    fn command_from_dm_uses_default_channel() {
        let mut conn = connection();
        let ws = workspace_for_command(&mut conn, &settings(), "T1", "D123", timestamp()).unwrap();
        assert_eq!(ws.report_channel_id, "C-DEFAULT");
    }

    #[test]
    fn subscribe_creates_then_reports_existing() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");

        let created = subscribe(&mut conn, &ws, "U1", &profile("Ada"), timestamp()).unwrap();
        let user = match created {
            SubscribeOutcome::Created(user) => user,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(user.display_name, "Ada");
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));

        let again = subscribe(&mut conn, &ws, "U1", &profile("Ada"), timestamp()).unwrap();
        assert!(matches!(again, SubscribeOutcome::AlreadySubscribed(_)));
    }

    #[test]
    fn unsubscribe_then_subscribe_reactivates() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        subscribe(&mut conn, &ws, "U1", &profile("Ada"), timestamp()).unwrap();

        let paused = unsubscribe(&mut conn, "U1", timestamp()).unwrap().unwrap();
        assert!(!paused.active);
        assert_eq!(unsubscribe(&mut conn, "U1", timestamp()).unwrap(), None);
        assert!(subscribers(&mut conn, ws.id).unwrap().is_empty());

        let back = subscribe(&mut conn, &ws, "U1", &profile("Ada Lovelace"), timestamp()).unwrap();
        match back {
            SubscribeOutcome::Reactivated(user) => {
                assert!(user.active);
                assert_eq!(user.display_name, "Ada Lovelace");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn unknown_user_cannot_unsubscribe() {
        let mut conn = connection();
        assert_eq!(unsubscribe(&mut conn, "U404", timestamp()).unwrap(), None);
    }
}

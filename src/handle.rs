use crate::error::StandupError;
use crate::messages;
use crate::slack::{ChatClient, PostedMessage, UserProfile};
use crate::standup::{AnswerOutcome, PostOutcome, StandupService};
use crate::subscription::{self, SubscribeOutcome};
use crate::{EventDetails, InteractionPayload, SlackSlashEvent};
use diesel::sqlite::SqliteConnection;
use serde_json::Value;

pub fn challenge(c: String) -> String {
    c
}

pub fn event<C: ChatClient>(
    service: &StandupService<C>,
    conn: &mut SqliteConnection,
    evt: EventDetails,
) {
    match evt.r#type.as_str() {
        "message" if evt.is_user_message() && evt.channel_type.as_deref() == Some("im") => {
            if let (Some(user), Some(text)) = (evt.user.as_deref(), evt.text.as_deref()) {
                message(service, conn, user, text);
            }
        }
        "app_mention" if !evt.is_from_bot() => {
            if let Some(channel) = evt.channel.as_deref() {
                mention(service, channel);
            }
        }
        other => tracing::debug!(event = other, "ignoring event"),
    }
}

/// A DM from a user: the answer to whatever question they are on.
pub fn message<C: ChatClient>(
    service: &StandupService<C>,
    conn: &mut SqliteConnection,
    user: &str,
    text: &str,
) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    tracing::info!(%user, "received answer");

    let prompt = match service.pending_prompt(conn, user) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::debug!(%user, error = %e, "no prompt to close");
            None
        }
    };

    match service.handle_user_answer(conn, user, text) {
        Ok(AnswerOutcome::NextQuestion { question_index }) => {
            close_prompt(service, prompt);
            ask(service, conn, user, question_index);
        }
        Ok(AnswerOutcome::Completed { report_id }) => {
            close_prompt(service, prompt);
            reply(service, user, &messages::completion());

            match service.post_report_to_channel(conn, report_id) {
                Ok(PostOutcome::Posted { .. }) => {}
                Ok(PostOutcome::Failed { message }) => {
                    tracing::warn!(%user, report_id, %message, "report was not posted")
                }
                Err(e) => tracing::error!(%user, report_id, error = %e, "could not post report"),
            }
        }
        Err(e) => reply(service, user, &failure_message(user, &e)),
    }
}

fn ask<C: ChatClient>(
    service: &StandupService<C>,
    conn: &mut SqliteConnection,
    user: &str,
    question_index: i32,
) {
    let prompt = service
        .question_prompt(conn, user, question_index)
        .unwrap_or_else(|e| {
            tracing::warn!(%user, error = %e, "asking without previous report context");
            messages::question(question_index, None)
        });

    match service.chat().send_direct_message(user, &prompt) {
        Ok(posted) => {
            if let Err(e) = service.record_prompt(conn, user, &posted) {
                tracing::warn!(%user, error = %e, "could not record prompt");
            }
        }
        Err(e) => tracing::error!(%user, question_index, error = %e, "could not send question"),
    }
}

/// Swaps the answered prompt for a version without buttons.
fn close_prompt<C: ChatClient>(
    service: &StandupService<C>,
    prompt: Option<(PostedMessage, i32)>,
) {
    if let Some((posted, index)) = prompt {
        let answered = messages::question_answered(index);
        if let Err(e) = service
            .chat()
            .update_message(&posted.channel, &posted.ts, &answered)
        {
            tracing::warn!(
                channel = %posted.channel,
                error = %e,
                "could not update previous prompt"
            );
        }
    }
}

fn reply<C: ChatClient>(service: &StandupService<C>, user: &str, message: &Value) {
    if let Err(e) = service.chat().send_direct_message(user, message) {
        tracing::error!(%user, error = %e, "could not reply");
    }
}

/// What the user is told when their answer could not be taken. Internals
/// only go to the log.
fn failure_message(user: &str, e: &StandupError) -> Value {
    match e {
        StandupError::UserNotFound(_) => messages::not_subscribed(),
        StandupError::NoPendingStandup(_) => messages::nothing_pending(),
        _ => {
            tracing::error!(%user, error = %e, "could not handle answer");
            messages::generic_failure()
        }
    }
}

pub fn mention<C: ChatClient>(service: &StandupService<C>, channel: &str) {
    if let Err(e) = service.chat().post_to_channel(channel, &messages::mention()) {
        tracing::warn!(%channel, error = %e, "could not answer mention");
    }
}

pub fn interaction<C: ChatClient>(
    service: &StandupService<C>,
    conn: &mut SqliteConnection,
    payload: InteractionPayload,
) {
    let user = payload.user.id.as_str();

    for action in &payload.actions {
        let replacement = match action.action_id.as_str() {
            messages::SKIP_ACTION => skip(service, conn, user),
            messages::PAUSE_ACTION => pause(service, conn, user),
            other => {
                tracing::debug!(action = other, "ignoring action");
                continue;
            }
        };
        replace_clicked(service, &payload, &replacement);
    }
}

fn skip<C: ChatClient>(
    service: &StandupService<C>,
    conn: &mut SqliteConnection,
    user: &str,
) -> Value {
    match service.handle_skip_today(conn, user) {
        Ok(_) => messages::skipped(),
        Err(StandupError::UserNotFound(_)) => {
            messages::action_failed("You're not subscribed to standups.")
        }
        Err(StandupError::NoPendingStandup(_)) => {
            messages::action_failed("There's no standup waiting for you right now.")
        }
        Err(e) => {
            tracing::error!(%user, error = %e, "could not skip standup");
            messages::action_failed("Something went wrong while skipping today's standup.")
        }
    }
}

fn pause<C: ChatClient>(
    service: &StandupService<C>,
    conn: &mut SqliteConnection,
    user: &str,
) -> Value {
    match subscription::unsubscribe(conn, user, service.now().naive_utc()) {
        Ok(Some(_)) => messages::paused(),
        Ok(None) => messages::action_failed("You're not subscribed to standups."),
        Err(e) => {
            tracing::error!(%user, error = %e, "could not pause standups");
            messages::action_failed("Something went wrong while pausing your standups.")
        }
    }
}

fn replace_clicked<C: ChatClient>(
    service: &StandupService<C>,
    payload: &InteractionPayload,
    replacement: &Value,
) {
    let target = payload.channel.as_ref().zip(payload.message.as_ref());
    let result = match target {
        Some((channel, message)) => {
            service
                .chat()
                .update_message(&channel.id, &message.ts, replacement)
        }
        None => service
            .chat()
            .send_direct_message(&payload.user.id, replacement)
            .map(|_| ()),
    };

    if let Err(e) = result {
        tracing::warn!(user = %payload.user.id, error = %e, "could not replace clicked message");
    }
}

/// `/standup <subcommand>`. The returned payload is the command response.
pub fn command<C: ChatClient>(
    service: &StandupService<C>,
    conn: &mut SqliteConnection,
    cmd: SlackSlashEvent,
) -> Value {
    let subcommand = cmd.text.as_deref().unwrap_or("").trim().to_lowercase();

    match run_command(service, conn, &cmd, &subcommand) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(user = %cmd.user_id, %subcommand, error = %e, "command failed");
            messages::command_failed()
        }
    }
}

fn run_command<C: ChatClient>(
    service: &StandupService<C>,
    conn: &mut SqliteConnection,
    cmd: &SlackSlashEvent,
    subcommand: &str,
) -> Result<Value, diesel::result::Error> {
    let now = service.now().naive_utc();
    let workspace = subscription::workspace_for_command(
        conn,
        service.settings(),
        &cmd.team_id,
        &cmd.channel_id,
        now,
    )?;

    let response = match subcommand {
        "subscribe" => {
            let profile = service
                .chat()
                .user_profile(&cmd.user_id)
                .unwrap_or_else(|e| {
                    tracing::warn!(user = %cmd.user_id, error = %e, "could not fetch profile");
                    UserProfile {
                        name: cmd.user_id.clone(),
                        ..UserProfile::default()
                    }
                });

            match subscription::subscribe(conn, &workspace, &cmd.user_id, &profile, now)? {
                SubscribeOutcome::Created(_) | SubscribeOutcome::Reactivated(_) => {
                    messages::subscribed(&workspace.default_time, &workspace.timezone)
                }
                SubscribeOutcome::AlreadySubscribed(_) => messages::already_subscribed(),
            }
        }
        "unsubscribe" => match subscription::unsubscribe(conn, &cmd.user_id, now)? {
            Some(_) => messages::unsubscribed(),
            None => messages::not_currently_subscribed(),
        },
        "status" => {
            let names: Vec<String> = subscription::subscribers(conn, workspace.id)?
                .into_iter()
                .map(|user| user.display_name)
                .collect();
            messages::status(&names)
        }
        "" | "help" => messages::help(),
        _ => messages::unknown_command(),
    };

    Ok(response)
}

#[cfg(test)]
mod test {
    use crate::handle;
    use crate::messages;
    use crate::repository::{pending_states, reports, users};
    use crate::slack::UserProfile;
    use crate::test_support::{at, connection, date, service, timestamp, user, workspace};
    use crate::{EventDetails, InteractionAction, InteractionMessage, InteractionPayload};
    use crate::{SlackResource, SlackSlashEvent};

    fn dm(user: &str, text: &str) -> EventDetails {
        EventDetails {
            r#type: "message".to_string(),
            user: Some(user.to_string()),
            text: Some(text.to_string()),
            channel: Some(format!("D-{}", user)),
            channel_type: Some("im".to_string()),
            ..EventDetails::default()
        }
    }

    fn click(user: &str, action_id: &str, ts: &str) -> InteractionPayload {
        InteractionPayload {
            r#type: "block_actions".to_string(),
            user: SlackResource {
                id: user.to_string(),
            },
            team: Some(SlackResource {
                id: "T1".to_string(),
            }),
            channel: Some(SlackResource {
                id: format!("D-{}", user),
            }),
            message: Some(InteractionMessage { ts: ts.to_string() }),
            actions: vec![InteractionAction {
                action_id: action_id.to_string(),
                value: None,
            }],
        }
    }

    fn slash(user: &str, text: &str) -> SlackSlashEvent {
        SlackSlashEvent {
            team_id: "T1".to_string(),
            channel_id: "C-TEAM".to_string(),
            user_id: user.to_string(),
            command: "/standup".to_string(),
            text: Some(text.to_string()),
            response_url: None,
            trigger_id: None,
        }
    }

    #[test]
    fn unknown_user_is_told_to_subscribe() {
        let mut conn = connection();
        let svc = service(at(2024, 1, 10, 9, 30));

        handle::event(&svc, &mut conn, dm("U404", "hello"));

        let dms = svc.chat().direct_messages();
        assert_eq!(dms, vec![("U404".to_string(), messages::not_subscribed())]);
    }

    #[test]
    fn idle_user_is_told_to_wait() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        user(&mut conn, &ws, "U1");
        let svc = service(at(2024, 1, 10, 9, 30));

        handle::event(&svc, &mut conn, dm("U1", "hello"));

        assert_eq!(
            svc.chat().direct_messages()[0].1,
            messages::nothing_pending()
        );
    }

    #[test]
    fn bot_messages_and_blank_text_are_ignored() {
        let mut conn = connection();
        let svc = service(at(2024, 1, 10, 9, 30));

        let mut from_bot = dm("U1", "hello");
        from_bot.bot_id = Some("B1".to_string());
        handle::event(&svc, &mut conn, from_bot);
        handle::event(&svc, &mut conn, dm("U1", "   "));

        assert!(svc.chat().direct_messages().is_empty());
    }

    #[test]
    fn answer_closes_prompt_and_asks_next_question() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        let u = user(&mut conn, &ws, "U1");
        let svc = service(at(2024, 1, 10, 9, 30));
        svc.send_pending_standups(&mut conn).unwrap();

        handle::event(&svc, &mut conn, dm("U1", "Good"));

        let updates = svc.chat().updates();
        assert_eq!(updates.len(), 1);
        assert_eq!((updates[0].0.as_str(), updates[0].1.as_str()), ("D-U1", "1.000"));
        assert_eq!(updates[0].2, messages::question_answered(0));

        let dms = svc.chat().direct_messages();
        assert_eq!(dms.len(), 2);
        assert_eq!(dms[1].1["text"], "Standup Q2");

        let state = pending_states::get_by_user(&mut conn, u.id).unwrap().unwrap();
        assert_eq!(state.current_question_index, 1);
        assert_eq!(state.prompt(), Some(("D-U1", "2.000")));
    }

    #[test]
    fn last_answer_completes_and_posts_report() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        let u = user(&mut conn, &ws, "U1");
        let svc = service(at(2024, 1, 10, 9, 30));
        svc.send_pending_standups(&mut conn).unwrap();

        for answer in ["Good", "Did X", "Will do Y", "None"].iter() {
            handle::event(&svc, &mut conn, dm("U1", answer));
        }

        let dms = svc.chat().direct_messages();
        assert_eq!(dms.last().unwrap().1, messages::completion());
        let posts = svc.chat().channel_posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, ws.report_channel_id);
        assert_eq!(svc.chat().updates().len(), 4);

        let report = reports::get_by_user_and_date(&mut conn, u.id, date(2024, 1, 10))
            .unwrap()
            .unwrap();
        assert!(report.completed_at.is_some());
    }

    #[test]
    fn failed_channel_post_still_confirms_completion() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        user(&mut conn, &ws, "U1");
        let svc = service(at(2024, 1, 10, 9, 30));
        svc.send_pending_standups(&mut conn).unwrap();
        svc.chat().fail_for(&ws.report_channel_id);

        for answer in ["Good", "Did X", "Will do Y", "None"].iter() {
            handle::event(&svc, &mut conn, dm("U1", answer));
        }

        assert_eq!(
            svc.chat().direct_messages().last().unwrap().1,
            messages::completion()
        );
        assert!(svc.chat().channel_posts().is_empty());
    }

    #[test]
    fn corrupt_state_gets_a_generic_apology() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        let u = user(&mut conn, &ws, "U1");
        let state =
            pending_states::create_or_replace(&mut conn, u.id, date(2024, 1, 10), None, timestamp())
                .unwrap();
        for expected in 0..4 {
            pending_states::advance(&mut conn, state.id, expected, timestamp()).unwrap();
        }
        let svc = service(at(2024, 1, 10, 9, 30));

        handle::event(&svc, &mut conn, dm("U1", "hello"));

        let reply = &svc.chat().direct_messages()[0].1;
        assert_eq!(*reply, messages::generic_failure());
        assert!(!reply.to_string().contains("index"));
    }

    #[test]
    fn skip_button_replaces_clicked_message() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        let u = user(&mut conn, &ws, "U1");
        let svc = service(at(2024, 1, 10, 9, 30));
        svc.send_pending_standups(&mut conn).unwrap();

        handle::interaction(&svc, &mut conn, click("U1", messages::SKIP_ACTION, "1.000"));

        let updates = svc.chat().updates();
        assert_eq!(updates[0].1, "1.000");
        assert_eq!(updates[0].2, messages::skipped());
        assert_eq!(pending_states::get_by_user(&mut conn, u.id).unwrap(), None);
        let report = reports::get_by_user_and_date(&mut conn, u.id, date(2024, 1, 10))
            .unwrap()
            .unwrap();
        assert!(report.skipped);
    }

    #[test]
    fn skip_button_without_cycle_explains() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        user(&mut conn, &ws, "U1");
        let svc = service(at(2024, 1, 10, 9, 30));

        handle::interaction(&svc, &mut conn, click("U1", messages::SKIP_ACTION, "1.000"));

        assert!(svc.chat().updates()[0]
            .2
            .to_string()
            .contains("no standup waiting"));
    }

    #[test]
    fn pause_button_deactivates_user() {
        let mut conn = connection();
        let ws = workspace(&mut conn, "T1");
        let u = user(&mut conn, &ws, "U1");
        let svc = service(at(2024, 1, 10, 9, 30));

        handle::interaction(&svc, &mut conn, click("U1", messages::PAUSE_ACTION, "1.000"));

        assert!(!users::get_by_id(&mut conn, u.id).unwrap().unwrap().active);
        assert_eq!(svc.chat().updates()[0].2, messages::paused());
    }

    #[test]
    fn subscribe_command_uses_slack_profile() {
        let mut conn = connection();
        let svc = service(at(2024, 1, 10, 9, 30));
        svc.chat().set_profile(
            "U7",
            UserProfile {
                name: "grace".to_string(),
                real_name: Some("Grace Hopper".to_string()),
                email: Some("grace@example.com".to_string()),
            },
        );

        let response = handle::command(&svc, &mut conn, slash("U7", "subscribe"));
        assert!(response["text"].as_str().unwrap().contains("09:30 (UTC)"));

        let user = users::get_by_external_id(&mut conn, "U7").unwrap().unwrap();
        assert_eq!(user.display_name, "Grace Hopper");

        let again = handle::command(&svc, &mut conn, slash("U7", "Subscribe"));
        assert_eq!(again, messages::already_subscribed());
    }

    #[test]
    fn subscribe_survives_profile_lookup_failure() {
        let mut conn = connection();
        let svc = service(at(2024, 1, 10, 9, 30));
        svc.chat().fail_for("U8");

        handle::command(&svc, &mut conn, slash("U8", "subscribe"));

        let user = users::get_by_external_id(&mut conn, "U8").unwrap().unwrap();
        assert_eq!(user.display_name, "U8");
    }

    #[test]
    fn status_and_unsubscribe_commands() {
        let mut conn = connection();
        let svc = service(at(2024, 1, 10, 9, 30));
        handle::command(&svc, &mut conn, slash("U1", "subscribe"));
        handle::command(&svc, &mut conn, slash("U2", "subscribe"));

        let status = handle::command(&svc, &mut conn, slash("U1", "status"));
        assert!(status["text"].as_str().unwrap().contains("Subscribed users: 2"));

        assert_eq!(
            handle::command(&svc, &mut conn, slash("U2", "unsubscribe")),
            messages::unsubscribed()
        );
        assert_eq!(
            handle::command(&svc, &mut conn, slash("U2", "unsubscribe")),
            messages::not_currently_subscribed()
        );
    }

    #[test]
    fn help_and_unknown_commands() {
        let mut conn = connection();
        let svc = service(at(2024, 1, 10, 9, 30));

        assert_eq!(handle::command(&svc, &mut conn, slash("U1", "")), messages::help());
        assert_eq!(
            handle::command(&svc, &mut conn, slash("U1", "help")),
            messages::help()
        );
        assert_eq!(
            handle::command(&svc, &mut conn, slash("U1", "dance")),
            messages::unknown_command()
        );
    }

    #[test]
    fn mention_answers_in_channel() {
        let mut conn = connection();
        let svc = service(at(2024, 1, 10, 9, 30));
        let evt = EventDetails {
            r#type: "app_mention".to_string(),
            user: Some("U1".to_string()),
            channel: Some("C-TEAM".to_string()),
            ..EventDetails::default()
        };

        handle::event(&svc, &mut conn, evt);

        assert_eq!(
            svc.chat().channel_posts(),
            vec![("C-TEAM".to_string(), messages::mention())]
        );
    }
}

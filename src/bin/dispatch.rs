//! One dispatch tick: opens today's standup for every active user who needs
//! one. Meant to be run from cron.

use anyhow::{Context, Result};
use dotenv::dotenv;
use standup_bot::config::Settings;
use standup_bot::db::establish_connection;
use standup_bot::init_tracing;
use standup_bot::slack::SlackClient;
use standup_bot::standup::StandupService;

fn main() -> Result<()> {
    dotenv().ok();
    let settings = Settings::from_env()?;
    init_tracing(&settings.log_level);

    let mut conn = establish_connection(&settings.database_url)?;
    let chat = SlackClient::new(&settings.slack_bot_token).context("Error building Slack client")?;
    let service = StandupService::new(settings, chat);

    service
        .send_pending_standups(&mut conn)
        .context("Error dispatching standups")
}

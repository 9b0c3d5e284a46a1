use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::env;

const DEFAULT_DATABASE_URL: &str = "standup.db";
const DEFAULT_STANDUP_TIME: &str = "09:30";
const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8800;

/// Process-wide settings, read once at start-up and handed to whatever needs
/// them.
#[derive(Debug, Clone)]
pub struct Settings {
    pub slack_bot_token: String,
    pub slack_signing_secret: String,
    /// Report channel given to workspaces created before anyone picked one.
    pub slack_default_channel: String,
    pub database_url: String,
    pub default_standup_time: String,
    /// Used when neither the user nor the workspace has a usable timezone.
    pub default_timezone: Tz,
    /// Enables the `/admin` routes when set.
    pub admin_token: Option<String>,
    pub skip_notification_to_channel: bool,
    pub log_level: String,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Settings> {
        Settings::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} environment variable is required", key))
        };

        let slack_bot_token = required("SLACK_BOT_TOKEN")?;
        let slack_signing_secret = required("SLACK_SIGNING_SECRET")?;
        let slack_default_channel = required("SLACK_DEFAULT_CHANNEL")?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let default_standup_time = parse_standup_time(
            &lookup("DEFAULT_STANDUP_TIME").unwrap_or_else(|| DEFAULT_STANDUP_TIME.to_string()),
        )?;

        let default_timezone = parse_timezone(
            &lookup("SCHEDULER_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        )
        .context("SCHEDULER_TIMEZONE must be an IANA timezone name")?;

        let admin_token = parse_admin_token(lookup("ADMIN_TOKEN"));
        let skip_notification_to_channel = parse_flag(lookup("SKIP_NOTIFICATION_TO_CHANNEL"));
        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let port = match lookup("PORT") {
            Some(port) => port.parse::<u16>().context("PORT must be a valid number")?,
            None => DEFAULT_PORT,
        };

        Ok(Settings {
            slack_bot_token,
            slack_signing_secret,
            slack_default_channel,
            database_url,
            default_standup_time,
            default_timezone,
            admin_token,
            skip_notification_to_channel,
            log_level,
            port,
        })
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow!("unknown timezone {:?}: {}", name, e))
}

/// Validates an `HH:MM` time and returns it normalised.
pub fn parse_standup_time(value: &str) -> Result<String> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("DEFAULT_STANDUP_TIME must be HH:MM, got {:?}", value))?;
    Ok(time.format("%H:%M").to_string())
}

/// Blank tokens count as unset so an empty `ADMIN_TOKEN=` never opens the
/// admin routes.
pub fn parse_admin_token(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

pub fn parse_flag(value: Option<String>) -> bool {
    match value {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("SLACK_BOT_TOKEN", "xoxb-test"),
        ("SLACK_SIGNING_SECRET", "secret"),
        ("SLACK_DEFAULT_CHANNEL", "C0STANDUP"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let settings = Settings::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(settings.database_url, "standup.db");
        assert_eq!(settings.default_standup_time, "09:30");
        assert_eq!(settings.default_timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(settings.admin_token, None);
        assert!(!settings.skip_notification_to_channel);
        assert_eq!(settings.port, 8800);
    }

    #[test]
    fn missing_bot_token_is_an_error() {
        let err = Settings::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(err.to_string().contains("SLACK_BOT_TOKEN"));
    }

    #[test]
    fn unknown_scheduler_timezone_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SCHEDULER_TIMEZONE", "Mars/Olympus_Mons"));
        assert!(Settings::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn optional_values_are_read() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("SCHEDULER_TIMEZONE", "Europe/London"),
            ("DEFAULT_STANDUP_TIME", "8:05"),
            ("ADMIN_TOKEN", "letmein"),
            ("SKIP_NOTIFICATION_TO_CHANNEL", "True"),
            ("PORT", "9000"),
        ]);
        let settings = Settings::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(settings.default_timezone, chrono_tz::Europe::London);
        assert_eq!(settings.default_standup_time, "08:05");
        assert_eq!(settings.admin_token.as_deref(), Some("letmein"));
        assert!(settings.skip_notification_to_channel);
        assert_eq!(settings.port, 9000);
    }

    #[test]
    fn bad_standup_time_is_rejected() {
        assert!(parse_standup_time("25:00").is_err());
        assert!(parse_standup_time("noon").is_err());
    }

    #[test]
    fn blank_admin_token_is_unset() {
        assert_eq!(parse_admin_token(None), None);
        assert_eq!(parse_admin_token(Some("   ".to_string())), None);
        assert_eq!(
            parse_admin_token(Some("token".to_string())),
            Some("token".to_string())
        );
    }

    #[test]
    fn flags_accept_common_truthy_spellings() {
        assert!(parse_flag(Some("1".into())));
        assert!(parse_flag(Some("yes".into())));
        assert!(!parse_flag(Some("false".into())));
        assert!(!parse_flag(Some("".into())));
        assert!(!parse_flag(None));
    }
}

use anyhow::{anyhow, Context, Result};
use diesel::prelude::*;
use dotenv::dotenv;
use rocket::data::{self, Data, FromData, ToByteUnit};
use rocket::form::Form;
use rocket::http::{RawStr, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::serde::json::Json;
use rocket::{get, post, routes, State};
use rocket_sync_db_pools::database;
use serde_json::{json, Value};
use standup_bot::config::Settings;
use standup_bot::repository::{users, workspaces};
use standup_bot::slack::{verify_signature, SlackClient};
use standup_bot::standup::StandupService;
use standup_bot::{
    db, handle, init_tracing, InteractionPayload, SlackEvent, SlackInteractionForm,
    SlackSlashEvent,
};
use std::sync::Arc;

type Service = Arc<StandupService<SlackClient>>;

#[database("standup")]
pub struct DbConn(diesel::SqliteConnection);

/// Request body whose Slack signature checked out.
struct SignedBody(String);

#[rocket::async_trait]
impl<'r> FromData<'r> for SignedBody {
    type Error = String;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        let secret = match req.rocket().state::<Service>() {
            Some(service) => service.settings().slack_signing_secret.clone(),
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    "service not managed".to_string(),
                ))
            }
        };

        let limit = req.limits().get("slack").unwrap_or_else(|| 1.mebibytes());
        let body = match data.open(limit).into_string().await {
            Ok(body) if body.is_complete() => body.into_inner(),
            Ok(_) => return Outcome::Error((Status::PayloadTooLarge, "body too large".to_string())),
            Err(e) => return Outcome::Error((Status::BadRequest, e.to_string())),
        };

        let headers = req.headers();
        let timestamp = headers.get_one("X-Slack-Request-Timestamp").unwrap_or("");
        let signature = headers.get_one("X-Slack-Signature").unwrap_or("");
        let now = chrono::Utc::now().timestamp();

        if verify_signature(&secret, timestamp, &body, signature, now) {
            Outcome::Success(SignedBody(body))
        } else {
            tracing::warn!(uri = %req.uri(), "rejected request with bad signature");
            Outcome::Error((Status::Unauthorized, "bad signature".to_string()))
        }
    }
}

/// Caller presented the configured admin token.
struct Admin;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Admin, ()> {
        let expected = req
            .rocket()
            .state::<Service>()
            .and_then(|service| service.settings().admin_token.clone());

        match (expected, req.headers().get_one("X-Admin-Token")) {
            (Some(expected), Some(given)) if expected == given => Outcome::Success(Admin),
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

fn parse_form<T>(body: &str) -> Result<T, Status>
where
    T: for<'a> rocket::form::FromForm<'a> + 'static,
{
    Form::<T>::parse_encoded(RawStr::new(body)).map_err(|e| {
        tracing::warn!(error = %e, "malformed form body");
        Status::BadRequest
    })
}

fn internal_error<E: std::fmt::Display>(e: E) -> Status {
    tracing::error!(error = %e, "request failed");
    Status::InternalServerError
}

#[get("/")]
fn index() -> &'static str {
    "Daily standup bot"
}

#[get("/health")]
async fn health(conn: DbConn) -> Result<Json<Value>, Status> {
    conn.run(|c| diesel::sql_query("SELECT 1").execute(c))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "health check failed");
            Status::ServiceUnavailable
        })?;
    Ok(Json(json!({ "status": "ok" })))
}

#[post("/slack/events", data = "<body>")]
async fn post_event(
    body: SignedBody,
    conn: DbConn,
    service: &State<Service>,
) -> Result<String, Status> {
    let event: SlackEvent = serde_json::from_str(&body.0).map_err(|e| {
        tracing::warn!(error = %e, "malformed event");
        Status::BadRequest
    })?;

    if let Some(c) = event.challenge {
        return Ok(handle::challenge(c));
    }

    if let Some(details) = event.event {
        let service = Arc::clone(service.inner());
        conn.run(move |c| db::configure(c).map(|_| handle::event(&service, c, details)))
            .await
            .map_err(internal_error)?;
    }

    Ok(String::new())
}

#[post("/slack/interactions", data = "<body>")]
async fn post_interaction(
    body: SignedBody,
    conn: DbConn,
    service: &State<Service>,
) -> Result<(), Status> {
    let form: SlackInteractionForm = parse_form(&body.0)?;
    let payload: InteractionPayload = serde_json::from_str(&form.payload).map_err(|e| {
        tracing::warn!(error = %e, "malformed interaction payload");
        Status::BadRequest
    })?;

    let service = Arc::clone(service.inner());
    conn.run(move |c| db::configure(c).map(|_| handle::interaction(&service, c, payload)))
        .await
        .map_err(internal_error)
}

#[post("/slack/commands", data = "<body>")]
async fn post_command(
    body: SignedBody,
    conn: DbConn,
    service: &State<Service>,
) -> Result<Json<Value>, Status> {
    let cmd: SlackSlashEvent = parse_form(&body.0)?;
    tracing::info!(user = %cmd.user_id, command = %cmd.command, text = ?cmd.text, "slash command");

    let service = Arc::clone(service.inner());
    conn.run(move |c| db::configure(c).map(|_| handle::command(&service, c, cmd)))
        .await
        .map(Json)
        .map_err(internal_error)
}

#[get("/admin/users")]
async fn admin_users(_admin: Admin, conn: DbConn) -> Result<Json<Value>, Status> {
    let (teams, all) = conn
        .run(|c| Ok::<_, diesel::result::Error>((workspaces::list_all(c)?, users::list_all(c)?)))
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "count": all.len(), "workspaces": teams, "users": all })))
}

#[post("/admin/dispatch")]
async fn admin_dispatch(
    _admin: Admin,
    conn: DbConn,
    service: &State<Service>,
) -> Result<Json<Value>, Status> {
    let service = Arc::clone(service.inner());
    conn.run(move |c| {
        db::configure(c)?;
        service.send_pending_standups(c)
    })
    .await
    .map_err(internal_error)?;
    Ok(Json(json!({ "status": "ok" })))
}

fn main() -> Result<()> {
    dotenv().ok();
    let settings = Settings::from_env()?;
    init_tracing(&settings.log_level);

    // Apply migrations before the pool opens its own connections.
    db::establish_connection(&settings.database_url)?;

    let chat = SlackClient::new(&settings.slack_bot_token).context("Error building Slack client")?;
    let figment = rocket::Config::figment()
        .merge(("port", settings.port))
        .merge(("databases.standup.url", settings.database_url.clone()));

    tracing::info!(port = settings.port, database = %settings.database_url, "starting server");
    let service: Service = Arc::new(StandupService::new(settings, chat));

    let server = rocket::custom(figment)
        .attach(DbConn::fairing())
        .manage(service)
        .mount(
            "/",
            routes![
                index,
                health,
                post_event,
                post_interaction,
                post_command,
                admin_users,
                admin_dispatch
            ],
        );

    rocket::execute(server.launch())
        .map(|_| ())
        .map_err(|e| anyhow!("server error: {}", e))
}

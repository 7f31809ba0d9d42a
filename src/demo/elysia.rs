//! Elysia-style demo: groups, shared state, decorators, body schemas and
//! guarded response schemas.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::app::{App, RouteOptions};
use crate::config::ServerConfig;
use crate::http::{Context, Json, Response};
use crate::validation::{Field, Schema, Target, Validator};

pub const PORT: u16 = 5000;

/// Decorator returning the current time in milliseconds.
pub type Clock = fn() -> u128;

pub fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = format!("0.0.0.0:{}", PORT);
    config.app.verify_responses = true;
    config
}

pub fn app() -> App {
    App::new()
        .get("/", |_ctx: Context| async { "Hello Elysia" })
        .get("/id/:id", |ctx: Context| async move {
            ctx.param("id").unwrap_or_default().to_string()
        })
        .post("/new", new_vtuber)
        .get("/auto", |_ctx: Context| async { vtubers() })
        .state("version", 1)
        .decorate("getDate", now_millis as Clock)
        .get("/version", version)
        .group("/user", user_routes)
        .group("/v1", |v1| {
            v1.get("/", |_ctx: Context| async { "Using v1" })
                .group("/user", user_routes)
        })
        .post_with(
            "/mirror",
            RouteOptions::new().validate(Validator::new(Target::Json, credentials())),
            echo,
        )
        .guard(RouteOptions::new().response(Schema::String), |app| {
            app.get("/global", |_ctx: Context| async { "Hi" })
        })
        .guard(RouteOptions::new().response(Schema::String), |app| {
            app.guard(RouteOptions::new().response(Schema::Number), |app| {
                app.get("/now-valid", |_ctx: Context| async { Json(1) })
            })
        })
        .post_with(
            "/multi",
            RouteOptions::new()
                .validate(Validator::new(Target::Json, credentials()))
                .response(credentials())
                .response_for(400, Schema::String),
            echo,
        )
}

fn user_routes(app: App) -> App {
    app.post("/sign-in", |_ctx: Context| async { "signIn()" })
        .post("/sign-up", |_ctx: Context| async { "signUp()" })
        .get("/profile", |_ctx: Context| async { "getProfile()" })
}

fn credentials() -> Schema {
    Schema::object([
        Field::required("username", Schema::String),
        Field::required("password", Schema::String),
    ])
}

fn vtubers() -> Value {
    json!({ "vtuber": ["Shirakami Fubuki", "Inugami Korone"] })
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

async fn new_vtuber(ctx: Context) -> Response {
    tracing::info!(body = ctx.text().unwrap_or("<binary>"), "New vtuber submitted");
    Response::bytes(vtubers().to_string()).with_header("Content-Type", "application/json")
}

async fn version(ctx: Context) -> String {
    let version = ctx.store().get("version").unwrap_or(Value::Null);
    let date = ctx.decorator::<Clock>("getDate").map(|clock| clock()).unwrap_or_default();
    format!("{} {}", version, date)
}

async fn echo(ctx: Context) -> Value {
    ctx.valid(Target::Json).cloned().unwrap_or_default()
}

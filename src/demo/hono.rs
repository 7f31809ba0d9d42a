//! Hono-style demo: text/JSON replies, params, scoped auth, sub-apps,
//! form validation and custom 404/error hooks.

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::app::{App, RouteOptions};
use crate::config::ServerConfig;
use crate::http::{Context, Response};
use crate::middleware::{AppendHeader, BasicAuth, BearerAuth};
use crate::validation::{Field, Schema, Target, Validator};

pub const PORT: u16 = 3000;
pub const NOT_FOUND_BODY: &str = "Custom 404 Message, change as you like";
pub const ERROR_BODY: &str = "Custom Error Message";
pub const API_TOKEN: &str = "honoiscool";

pub fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = format!("0.0.0.0:{}", PORT);
    config.app.strict = true;
    config
}

pub fn app() -> App {
    App::new()
        .use_middleware(AppendHeader::new("X-Debug", "Debug message"))
        .use_at("/admin/*", BasicAuth::new("admin", "admin"))
        .get("/", |_ctx: Context| async { "Hello Hono!" })
        .get("/api/hello", |_ctx: Context| async {
            json!({ "ok": true, "message": "Hello World!" })
        })
        .get("/posts/:id", show_post)
        .post("/posts", |_ctx: Context| async { (StatusCode::CREATED, "Created!") })
        .delete("/posts/:id", delete_post)
        .get("/raw", |_ctx: Context| async { Response::text("Good morning") })
        .get("/admin", |_ctx: Context| async { "You are authorized" })
        .get("/user/:name", |ctx: Context| async move {
            ctx.param("name").unwrap_or_default().to_string()
        })
        .get("/posts/:id/comment/:comment_id", |ctx: Context| async move {
            json!({ "id": ctx.param("id"), "comment_id": ctx.param("comment_id") })
        })
        .get("/api/animal/:type?", |ctx: Context| async move {
            format!("Animal {}", ctx.param("type").unwrap_or("undefined"))
        })
        .get("/post/:date{[0-9]+}/:title{[a-z]+}", |ctx: Context| async move {
            json!({ "date": ctx.param("date"), "title": ctx.param("title") })
        })
        .get("/posts/:filename{.+\\.png$}", |_ctx: Context| async {
            "Including slashes"
        })
        .route("/endpoint", |r| {
            r.get(|_ctx: Context| async { "GET /endpoint" })
                .post(|_ctx: Context| async { "POST /endpoint" })
                .delete(|_ctx: Context| async { "DELETE /endpoint" })
        })
        .mount("/book", books())
        .mount("/api", App::new().base_path("/v1").get("/book", list_books))
        .get("/context", |ctx: Context| async move {
            ctx.header("user-agent").unwrap_or("no context").to_string()
        })
        .get("/welcome", welcome)
        .get("/say", |_ctx: Context| async { "Hello!" })
        .post("/newpost", |_ctx: Context| async {
            Response::text("Created!")
                .with_status(StatusCode::CREATED)
                .with_header("X-Custom", "Thank you!")
        })
        .get("/redirect", |_ctx: Context| async { Response::redirect("/") })
        .get("/redirect-permanently", |_ctx: Context| async {
            Response::redirect_with("/", StatusCode::MOVED_PERMANENTLY)
        })
        .get("/search", |ctx: Context| async move {
            ctx.query("q").unwrap_or_default().to_string()
        })
        .get("/about/me", |ctx: Context| async move {
            json!({ "path": ctx.path(), "url": ctx.url(), "method": ctx.method().as_str() })
        })
        .post_with(
            "/validate",
            RouteOptions::new().validate(Validator::custom(Target::Form, non_empty_body)),
            |ctx: Context| async move { ctx.valid(Target::Form).cloned().unwrap_or_default() },
        )
        .post_with(
            "/zod",
            RouteOptions::new().validate(
                Validator::new(Target::Form, body_schema())
                    .status(StatusCode::UNAUTHORIZED)
                    .message("Invalid!"),
            ),
            |_ctx: Context| async { (StatusCode::CREATED, json!({ "message": "Created!" })) },
        )
        .post_with(
            "/zvalidator",
            RouteOptions::new().validate(Validator::new(Target::Form, body_schema())),
            |_ctx: Context| async { "zValidator" },
        )
        .get("/api/page", |_ctx: Context| async {
            json!({ "message": "Read posts" })
        })
        .post_with(
            "/api/page",
            RouteOptions::new().middleware(BearerAuth::new(API_TOKEN)),
            |_ctx: Context| async { (StatusCode::CREATED, json!({ "message": "Created post!" })) },
        )
        .not_found(|_ctx: Context| async { (StatusCode::NOT_FOUND, NOT_FOUND_BODY) })
        .on_error(|_err| Response::text(ERROR_BODY).with_status(StatusCode::INTERNAL_SERVER_ERROR))
}

fn books() -> App {
    App::new()
        .get("/", list_books)
        .get("/:id", |ctx: Context| async move {
            format!("Get Book: {}", ctx.param("id").unwrap_or_default())
        })
        .post("/", |_ctx: Context| async { "Create Book" })
}

async fn list_books(_ctx: Context) -> &'static str {
    "List Books"
}

async fn show_post(ctx: Context) -> Response {
    let page = ctx.query("page").unwrap_or("undefined");
    let id = ctx.param("id").unwrap_or_default();
    Response::text(format!("You want to see page:{} of id:{}", page, id))
        .with_header("X-Message", "Hi!")
}

async fn delete_post(ctx: Context) -> String {
    format!(
        "You want to delete item of id:{}",
        ctx.param("id").unwrap_or_default()
    )
}

async fn welcome(_ctx: Context) -> Response {
    Response::text("Thank you for coming")
        .with_status(StatusCode::CREATED)
        .with_header("X-Message", "Hello")
        .with_header("Content-Type", "text/plain")
}

fn body_schema() -> Schema {
    Schema::object([Field::required("body", Schema::String)])
}

fn non_empty_body(value: Value, _ctx: &Context) -> Result<Value, Response> {
    match value.get("body").and_then(Value::as_str) {
        Some(body) if !body.is_empty() => Ok(json!({ "body": body })),
        _ => Err(Response::text("Invalid!").with_status(StatusCode::BAD_REQUEST)),
    }
}

//! Request input validators.
//!
//! # Responsibilities
//! - Extract the raw input for a target (JSON body, form, query, params, headers)
//! - Check it against a schema or a custom rule
//! - Produce the accepted value, or the failure response that ends the request
//!
//! # Design Decisions
//! - Validators run after middleware and before the handler, in declaration order
//! - The first failing validator ends the request; the handler never runs
//! - Non-JSON targets carry strings only, so numbers and booleans are coerced

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Map, Value};

use crate::error::DispatchError;
use crate::http::context::parse_query;
use crate::http::{Context, Response};
use crate::validation::schema::{Issue, Schema};

/// Where validated input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Json,
    Form,
    Query,
    Params,
    Header,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Json => "json",
            Target::Form => "form",
            Target::Query => "query",
            Target::Params => "params",
            Target::Header => "header",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom validation: return the accepted value, or the response to send instead.
pub type ValidateFn = Arc<dyn Fn(Value, &Context) -> Result<Value, Response> + Send + Sync>;

#[derive(Clone)]
enum Rule {
    Schema(Schema),
    Custom(ValidateFn),
}

/// Validates one request target before the handler runs.
#[derive(Clone)]
pub struct Validator {
    target: Target,
    rule: Rule,
    status: StatusCode,
    message: Option<String>,
}

impl Validator {
    /// Schema validator. Failures answer `400` with a JSON issue list.
    pub fn new(target: Target, schema: Schema) -> Self {
        Self {
            target,
            rule: Rule::Schema(schema),
            status: StatusCode::BAD_REQUEST,
            message: None,
        }
    }

    /// Validator running arbitrary code against the raw target value.
    pub fn custom<F>(target: Target, f: F) -> Self
    where
        F: Fn(Value, &Context) -> Result<Value, Response> + Send + Sync + 'static,
    {
        Self {
            target,
            rule: Rule::Custom(Arc::new(f)),
            status: StatusCode::BAD_REQUEST,
            message: None,
        }
    }

    /// Status used for schema failures.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Plain-text body used for schema failures instead of the issue list.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Validate the request, returning the accepted value or the failure response.
    pub fn validate(&self, ctx: &Context) -> Result<Value, Response> {
        let raw = match extract(self.target, ctx) {
            Ok(raw) => raw,
            Err(issue) => return Err(self.reject(vec![issue])),
        };

        match &self.rule {
            Rule::Schema(schema) => schema
                .check(&raw, self.target != Target::Json)
                .map_err(|issues| self.reject(issues)),
            Rule::Custom(f) => f(raw, ctx).map_err(|mut response| {
                tracing::debug!(
                    input = %self.target,
                    status = %response.status(),
                    "Custom validator rejected request"
                );
                response.set_outcome("invalid");
                response
            }),
        }
    }

    fn reject(&self, issues: Vec<Issue>) -> Response {
        let err = DispatchError::ValidationFailure {
            target: self.target,
            issues: issues.len(),
        };
        tracing::debug!(error = %err, "Validation failed");

        let mut response = match &self.message {
            Some(message) => Response::text(message.clone()),
            None => Response::json(json!({
                "error": "validation failed",
                "target": self.target.as_str(),
                "issues": issues,
            })),
        }
        .with_status(self.status);
        response.set_outcome(err.kind());
        response
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = match &self.rule {
            Rule::Schema(_) => "schema",
            Rule::Custom(_) => "custom",
        };
        f.debug_struct("Validator")
            .field("target", &self.target)
            .field("rule", &rule)
            .field("status", &self.status)
            .finish()
    }
}

/// Raw input for `target` as a JSON value.
fn extract(target: Target, ctx: &Context) -> Result<Value, Issue> {
    match target {
        Target::Json => {
            if ctx.body().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_slice(ctx.body()).map_err(|err| Issue {
                path: String::new(),
                message: format!("malformed JSON body: {}", err),
            })
        }
        Target::Form => {
            let body = ctx.text().ok_or_else(|| Issue {
                path: String::new(),
                message: "form body is not valid UTF-8".to_string(),
            })?;
            Ok(string_map(parse_query(body)))
        }
        Target::Query => Ok(string_map(ctx.queries().clone())),
        Target::Params => Ok(string_map(ctx.params().clone())),
        Target::Header => Ok(string_map(
            ctx.headers()
                .keys()
                .filter_map(|name| {
                    ctx.header(name.as_str())
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                }),
        )),
    }
}

fn string_map(map: impl IntoIterator<Item = (String, String)>) -> Value {
    Value::Object(
        map.into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<String, Value>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Body;
    use crate::validation::schema::Field;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};

    fn post(uri: &str, body: &'static str) -> Context {
        Context::new(
            Method::POST,
            uri.parse().unwrap(),
            HeaderMap::new(),
            Bytes::from_static(body.as_bytes()),
        )
    }

    fn login() -> Schema {
        Schema::object([
            Field::required("username", Schema::String),
            Field::required("password", Schema::String),
        ])
    }

    #[test]
    fn test_header_target_coerces_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-version", "2".parse().unwrap());
        headers.insert("user-agent", "curl/8.0".parse().unwrap());
        let ctx = Context::new(Method::GET, "/".parse().unwrap(), headers, Bytes::new());

        let validator = Validator::new(
            Target::Header,
            Schema::object([Field::required("x-api-version", Schema::Number)]),
        );
        assert_eq!(validator.validate(&ctx).unwrap(), json!({"x-api-version": 2}));

        let missing = Validator::new(
            Target::Header,
            Schema::object([Field::required("authorization", Schema::String)]),
        );
        let response = missing.validate(&ctx).unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body().to_value()["target"], "header");
    }

    #[test]
    fn test_json_success() {
        let validator = Validator::new(Target::Json, login());
        let ctx = post("/login", r#"{"username":"a","password":"b"}"#);
        assert_eq!(
            validator.validate(&ctx).unwrap(),
            json!({"username": "a", "password": "b"})
        );
    }

    #[test]
    fn test_json_failure_body() {
        let validator = Validator::new(Target::Json, login());
        let response = validator.validate(&post("/login", r#"{"username":"a"}"#)).unwrap_err();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.outcome(), "invalid");
        assert_eq!(
            response.body(),
            &Body::Json(json!({
                "error": "validation failed",
                "target": "json",
                "issues": [{"path": "password", "message": "required field is missing"}]
            }))
        );
    }

    #[test]
    fn test_malformed_and_empty_json() {
        let validator = Validator::new(Target::Json, login());
        let malformed = validator.validate(&post("/login", "{nope")).unwrap_err();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let empty = validator.validate(&post("/login", "")).unwrap_err();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_form_with_status_and_message() {
        let validator = Validator::new(
            Target::Form,
            Schema::object([Field::required("body", Schema::String)]),
        )
        .status(StatusCode::UNAUTHORIZED)
        .message("Invalid!");

        let ok = validator.validate(&post("/zod", "body=hello&x=1")).unwrap();
        assert_eq!(ok, json!({"body": "hello"}));

        let failed = validator.validate(&post("/zod", "other=1")).unwrap_err();
        assert_eq!(failed.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(failed.body(), &Body::Text("Invalid!".into()));
    }

    #[test]
    fn test_query_coerces_numbers() {
        let validator = Validator::new(
            Target::Query,
            Schema::object([Field::required("limit", Schema::Number)]),
        );
        let ctx = post("/search?limit=10", "");
        assert_eq!(validator.validate(&ctx).unwrap(), json!({"limit": 10}));
    }

    #[test]
    fn test_custom_validator() {
        let validator = Validator::custom(Target::Form, |value, _ctx| match value.get("body") {
            Some(Value::String(body)) => Ok(json!({ "body": body })),
            _ => Err(Response::text("Invalid!").with_status(StatusCode::BAD_REQUEST)),
        });

        assert!(validator.validate(&post("/validate", "body=hi")).is_ok());
        let failed = validator.validate(&post("/validate", "")).unwrap_err();
        assert_eq!(failed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(failed.outcome(), "invalid");
    }
}

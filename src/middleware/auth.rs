//! Authentication middleware.
//!
//! # Responsibilities
//! - HTTP Basic authentication against a fixed credential pair
//! - Bearer token authentication against a fixed token
//!
//! # Design Decisions
//! - Credentials are compared in constant time
//! - Rejections short-circuit the chain with a challenge header

use async_trait::async_trait;
use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::HandlerError;
use crate::http::{Context, Response};
use crate::middleware::{Middleware, Next};

const DEFAULT_REALM: &str = "Secure Area";

/// HTTP Basic authentication.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
    realm: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            realm: DEFAULT_REALM.to_string(),
        }
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    fn verify(&self, header: &str) -> bool {
        let Some((username, password)) = parse_basic(header) else {
            return false;
        };
        // Evaluate both so a username miss costs the same as a password miss.
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        user_ok & pass_ok
    }

    fn challenge(&self) -> Response {
        Response::text("Unauthorized")
            .with_status(StatusCode::UNAUTHORIZED)
            .with_header(
                "WWW-Authenticate",
                &format!("Basic realm=\"{}\"", self.realm.replace('"', "\\\"")),
            )
    }
}

#[async_trait]
impl Middleware for BasicAuth {
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, HandlerError> {
        let authorized = ctx
            .header("authorization")
            .is_some_and(|header| self.verify(header));
        if !authorized {
            tracing::debug!(path = %ctx.path(), "Basic authentication rejected");
            return Ok(self.challenge());
        }
        Ok(next.run(ctx).await)
    }
}

/// Decode `Basic base64(user:pass)`.
fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Bearer token authentication.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: String,
    realm: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            realm: String::new(),
        }
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    fn reject(&self, status: StatusCode, challenge: String) -> Response {
        let body = if status == StatusCode::BAD_REQUEST {
            "Bad Request"
        } else {
            "Unauthorized"
        };
        Response::text(body)
            .with_status(status)
            .with_header("WWW-Authenticate", &challenge)
    }
}

#[async_trait]
impl Middleware for BearerAuth {
    async fn handle(&self, ctx: Context, next: Next) -> Result<Response, HandlerError> {
        let Some(header) = ctx.header("authorization") else {
            return Ok(self.reject(
                StatusCode::UNAUTHORIZED,
                format!("Bearer realm=\"{}\"", self.realm),
            ));
        };

        let token = match header.trim().split_once(' ') {
            Some((scheme, token))
                if scheme.eq_ignore_ascii_case("bearer") && is_token68(token.trim()) =>
            {
                token.trim()
            }
            _ => {
                return Ok(self.reject(
                    StatusCode::BAD_REQUEST,
                    "Bearer error=\"invalid_request\"".to_string(),
                ));
            }
        };

        if !constant_time_eq(token.as_bytes(), self.token.as_bytes()) {
            tracing::debug!(path = %ctx.path(), "Bearer token rejected");
            return Ok(self.reject(
                StatusCode::UNAUTHORIZED,
                "Bearer error=\"invalid_token\"".to_string(),
            ));
        }

        Ok(next.run(ctx).await)
    }
}

/// RFC 6750 `b64token` characters.
fn is_token68(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-._~+/=".contains(&b))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

//! Response building and finalization.
//!
//! # Responsibilities
//! - Build responses incrementally (status, headers, body)
//! - Convert handler return values into responses (`Reply`)
//! - Serialize into an axum response exactly once, at finalization
//!
//! # Design Decisions
//! - Header policy: `set_header`/`with_header` overwrite, `append_header` appends;
//!   middleware that must not clobber handler headers use `append_header`
//! - Content type is inferred from the body kind only when none was set
//! - A HEAD response keeps its headers and drops the body

use axum::body::{Body as HttpBody, Bytes};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::HandlerError;

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";
const TEXT_HTML: &str = "text/html; charset=UTF-8";
const APPLICATION_JSON: &str = "application/json";

/// Response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Text(String),
    Json(Value),
    Bytes(Bytes),
}

impl Body {
    /// Content type implied by the payload kind.
    fn content_type(&self) -> Option<&'static str> {
        match self {
            Body::Text(_) => Some(TEXT_PLAIN),
            Body::Json(_) => Some(APPLICATION_JSON),
            Body::Empty | Body::Bytes(_) => None,
        }
    }

    /// View the payload as a JSON value, for response schema checks.
    pub fn to_value(&self) -> Value {
        match self {
            Body::Empty => Value::Null,
            Body::Text(text) => Value::String(text.clone()),
            Body::Json(value) => value.clone(),
            Body::Bytes(bytes) => serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
        }
    }
}

/// An outgoing response, mutable until finalized.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    outcome: &'static str,
}

impl Response {
    /// Empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
            outcome: "ok",
        }
    }

    /// `200 OK` with a plain-text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(StatusCode::OK).with_body(Body::Text(text.into()))
    }

    /// `200 OK` with a JSON body.
    pub fn json(value: Value) -> Self {
        Self::new(StatusCode::OK).with_body(Body::Json(value))
    }

    /// `200 OK` with an HTML body.
    pub fn html(html: impl Into<String>) -> Self {
        Self::text(html).with_header(header::CONTENT_TYPE.as_str(), TEXT_HTML)
    }

    /// `200 OK` with raw bytes and no inferred content type.
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK).with_body(Body::Bytes(bytes.into()))
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self::redirect_with(location, StatusCode::FOUND)
    }

    /// Redirect with an explicit status, e.g. `301 Moved Permanently`.
    pub fn redirect_with(location: &str, status: StatusCode) -> Self {
        Self::new(status).with_header(header::LOCATION.as_str(), location)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Set a header, replacing existing values.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set a header, replacing existing values. Invalid names or values are dropped with a warning.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some((name, value)) = parse_header(name, value) {
            self.headers.insert(name, value);
        }
    }

    /// Add a header value, keeping existing values.
    pub fn append_header(&mut self, name: &str, value: &str) {
        if let Some((name, value)) = parse_header(name, value) {
            self.headers.append(name, value);
        }
    }

    /// Pipeline outcome label (`ok`, `not_found`, `invalid`, `handler_fault`, ...).
    pub fn outcome(&self) -> &'static str {
        self.outcome
    }

    pub(crate) fn set_outcome(&mut self, outcome: &'static str) {
        self.outcome = outcome;
    }

    /// Drop the body for a HEAD response, keeping the content type it would have had.
    pub(crate) fn strip_body(&mut self) {
        if let Some(content_type) = self.body.content_type() {
            if !self.headers.contains_key(header::CONTENT_TYPE) {
                self.headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        self.body = Body::Empty;
    }

    /// Serialize into the transport response.
    pub fn into_http(self) -> axum::response::Response {
        let Response {
            status,
            mut headers,
            body,
            ..
        } = self;

        let content_type = body.content_type();
        let payload = match body {
            Body::Empty => HttpBody::empty(),
            Body::Text(text) => HttpBody::from(text),
            Body::Bytes(bytes) => HttpBody::from(bytes),
            Body::Json(value) => match serde_json::to_vec(&value) {
                Ok(encoded) => HttpBody::from(encoded),
                Err(err) => {
                    tracing::error!(error = %err, "Failed to serialize JSON response body");
                    let mut response = axum::response::Response::new(HttpBody::empty());
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    return response;
                }
            },
        };

        if let Some(content_type) = content_type {
            if !headers.contains_key(header::CONTENT_TYPE) {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        let mut response = axum::response::Response::new(payload);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

fn parse_header(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => Some((name, value)),
        _ => {
            tracing::warn!(header = %name, "Dropping invalid response header");
            None
        }
    }
}

/// JSON body built from any serializable value.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

/// Conversion from handler return values into a response.
pub trait Reply {
    fn into_result(self) -> Result<Response, HandlerError>;
}

impl Reply for Response {
    fn into_result(self) -> Result<Response, HandlerError> {
        Ok(self)
    }
}

impl Reply for &'static str {
    fn into_result(self) -> Result<Response, HandlerError> {
        Ok(Response::text(self))
    }
}

impl Reply for String {
    fn into_result(self) -> Result<Response, HandlerError> {
        Ok(Response::text(self))
    }
}

impl Reply for Value {
    fn into_result(self) -> Result<Response, HandlerError> {
        Ok(Response::json(self))
    }
}

impl Reply for StatusCode {
    fn into_result(self) -> Result<Response, HandlerError> {
        Ok(Response::new(self))
    }
}

impl<T: Serialize> Reply for Json<T> {
    fn into_result(self) -> Result<Response, HandlerError> {
        Ok(Response::json(serde_json::to_value(self.0)?))
    }
}

impl<T: Reply> Reply for (StatusCode, T) {
    fn into_result(self) -> Result<Response, HandlerError> {
        let (status, reply) = self;
        Ok(reply.into_result()?.with_status(status))
    }
}

impl<T, E> Reply for Result<T, E>
where
    T: Reply,
    E: Into<HandlerError>,
{
    fn into_result(self) -> Result<Response, HandlerError> {
        self.map_err(Into::into)?.into_result()
    }
}

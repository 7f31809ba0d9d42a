//! Per-request context.
//!
//! # Responsibilities
//! - Hold the request parts (method, URI, headers, raw body)
//! - Expose path params, query values and validated input
//! - Carry typed extensions set by middleware
//! - Give handlers the app-wide store and decorators
//!
//! # Design Decisions
//! - Created per request, never shared between requests
//! - Only the dispatcher writes params and validated values
//! - Validated input is namespaced by target; raw fields stay readable

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{request::Parts, Extensions, HeaderMap, Method, Uri};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::HandlerError;
use crate::routing::Params;
use crate::validation::Target;

/// Values attached to every request via `App::decorate`.
pub(crate) type Decorators = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Process-wide key/value state shared by all requests (`App::state`).
#[derive(Debug, Clone, Default)]
pub struct Store {
    inner: Arc<DashMap<String, Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    /// Insert or replace a value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.insert(key.into(), value.into());
    }

    /// Atomically update a value in place; missing keys start as `null`.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut Value)) {
        let mut entry = self.inner.entry(key.to_string()).or_insert(Value::Null);
        f(entry.value_mut());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Request context handed to middleware and handlers.
#[derive(Debug)]
pub struct Context {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: Params,
    query: HashMap<String, String>,
    valid: HashMap<Target, Value>,
    extensions: Extensions,
    store: Store,
    decorators: Arc<Decorators>,
}

impl Context {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let query = uri.query().map(parse_query).unwrap_or_default();
        Self {
            method,
            uri,
            headers,
            body,
            params: Params::new(),
            query,
            valid: HashMap::new(),
            extensions: Extensions::new(),
            store: Store::default(),
            decorators: Arc::default(),
        }
    }

    /// Build from transport request parts and a buffered body.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        let Parts {
            method,
            uri,
            headers,
            extensions,
            ..
        } = parts;
        let mut ctx = Self::new(method, uri, headers, body);
        ctx.extensions = extensions;
        ctx
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Absolute URL, rebuilt from the Host header when the URI is origin-form.
    pub fn url(&self) -> String {
        if self.uri.authority().is_some() {
            return self.uri.to_string();
        }
        let host = self.header("host").unwrap_or("localhost");
        let path_and_query = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("http://{}{}", host, path_and_query)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a request header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Request id assigned by the transport layer.
    pub fn request_id(&self) -> Option<&str> {
        self.header(crate::http::X_REQUEST_ID)
    }

    /// Raw request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Raw body as UTF-8 text.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Deserialize the raw JSON body without schema validation.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// First value of a query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn queries(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Input accepted by the validator for `target`.
    pub fn valid(&self, target: Target) -> Option<&Value> {
        self.valid.get(&target)
    }

    /// Validated input deserialized into a typed value.
    pub fn valid_as<T: DeserializeOwned>(&self, target: Target) -> Result<T, HandlerError> {
        let value = self
            .valid(target)
            .ok_or_else(|| HandlerError::msg(format!("no validated {} input", target)))?;
        Ok(T::deserialize(value)?)
    }

    /// Attach a typed value for downstream middleware and handlers.
    pub fn set<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(value);
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Value registered with `App::decorate` under `key`.
    pub fn decorator<T: 'static>(&self, key: &str) -> Option<&T> {
        let value: &(dyn Any + Send + Sync) = self.decorators.get(key)?.as_ref();
        value.downcast_ref::<T>()
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub(crate) fn set_valid(&mut self, target: Target, value: Value) {
        self.valid.insert(target, value);
    }

    pub(crate) fn attach(&mut self, store: Store, decorators: Arc<Decorators>) {
        self.store = store;
        self.decorators = decorators;
    }
}

/// Parse a urlencoded string; the first occurrence of a key wins.
pub(crate) fn parse_query(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()).into_owned() {
        map.entry(key).or_insert(value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn ctx(uri: &str) -> Context {
        let mut headers = HeaderMap::new();
        headers.insert("host", "localhost:3000".parse().unwrap());
        headers.insert("user-agent", "curl/8.0".parse().unwrap());
        Context::new(Method::GET, uri.parse().unwrap(), headers, Bytes::new())
    }

    #[test]
    fn test_query_first_value_wins() {
        let ctx = ctx("/search?q=rust&q=go&limit=10&name=J%C3%BCrgen");
        assert_eq!(ctx.query("q"), Some("rust"));
        assert_eq!(ctx.query("limit"), Some("10"));
        assert_eq!(ctx.query("name"), Some("Jürgen"));
        assert_eq!(ctx.query("offset"), None);
    }

    #[test]
    fn test_url_is_rebuilt_from_host() {
        let ctx = ctx("/about/me?x=1");
        assert_eq!(ctx.url(), "http://localhost:3000/about/me?x=1");
        assert_eq!(ctx.path(), "/about/me");
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let ctx = ctx("/context");
        assert_eq!(ctx.header("User-Agent"), Some("curl/8.0"));
    }

    #[test]
    fn test_extensions_roundtrip() {
        #[derive(Clone, Debug, PartialEq)]
        struct User(&'static str);

        let mut ctx = ctx("/");
        assert!(ctx.get::<User>().is_none());
        ctx.set(User("admin"));
        assert_eq!(ctx.get::<User>(), Some(&User("admin")));
    }

    #[test]
    fn test_valid_as() {
        #[derive(Deserialize)]
        struct Login {
            username: String,
        }

        let mut ctx = ctx("/");
        assert!(ctx.valid_as::<Login>(Target::Json).is_err());
        ctx.set_valid(Target::Json, json!({"username": "a", "password": "b"}));
        let login: Login = ctx.valid_as(Target::Json).unwrap();
        assert_eq!(login.username, "a");
    }

    #[test]
    fn test_store_update() {
        let store = Store::new();
        store.set("version", 1);
        store.update("version", |v| *v = json!(v.as_i64().unwrap_or(0) + 1));
        assert_eq!(store.get("version"), Some(json!(2)));
    }

    #[test]
    fn test_decorator_lookup_is_typed() {
        let mut decorators = Decorators::new();
        decorators.insert("answer".into(), Arc::new(42u32));
        let mut ctx = ctx("/");
        ctx.attach(Store::new(), Arc::new(decorators));

        assert_eq!(ctx.decorator::<u32>("answer"), Some(&42));
        assert_eq!(ctx.decorator::<String>("answer"), None);
        assert_eq!(ctx.decorator::<u32>("missing"), None);
    }
}

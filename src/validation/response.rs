//! Declared response shapes, keyed by status code.
//!
//! # Design Decisions
//! - Guards nest; the nearest declaration for a status wins
//! - Status keys are checked when the app is built
//! - Bodies are only checked at runtime when `app.verify_responses` is on,
//!   and a mismatch is logged, never turned into a failed request

use std::collections::BTreeMap;

use axum::http::StatusCode;

use crate::config::ConfigError;
use crate::http::Response;
use crate::validation::schema::{Issue, Schema};

/// Response schemas of one route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSchemas {
    by_status: BTreeMap<u16, Schema>,
}

impl ResponseSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the schema for `status`, replacing any earlier declaration.
    pub fn insert(&mut self, status: u16, schema: Schema) {
        self.by_status.insert(status, schema);
    }

    pub fn get(&self, status: u16) -> Option<&Schema> {
        self.by_status.get(&status)
    }

    pub fn is_empty(&self) -> bool {
        self.by_status.is_empty()
    }

    /// Merge declarations from an enclosing guard. Entries already present
    /// here are nearer and win.
    pub fn inherit(&mut self, outer: &ResponseSchemas) {
        for (status, schema) in &outer.by_status {
            match self.by_status.get(status) {
                Some(nearest) if nearest != schema => {
                    tracing::debug!(status, "Nearest response schema overrides enclosing guard");
                }
                Some(_) => {}
                None => {
                    self.by_status.insert(*status, schema.clone());
                }
            }
        }
    }

    /// Every declared status must be a valid HTTP status code.
    pub fn check_statuses(&self, route: &str) -> Result<(), ConfigError> {
        for status in self.by_status.keys() {
            if !(100..=599).contains(status) || StatusCode::from_u16(*status).is_err() {
                return Err(ConfigError::ResponseSchema {
                    route: route.to_string(),
                    status: *status,
                });
            }
        }
        Ok(())
    }

    /// Check a response body against the schema declared for its status.
    pub fn verify(&self, response: &Response) -> Result<(), Vec<Issue>> {
        match self.get(response.status().as_u16()) {
            Some(schema) => schema.check(&response.body().to_value(), false).map(|_| ()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nearest_wins() {
        let mut inner = ResponseSchemas::new();
        inner.insert(200, Schema::Number);

        let mut outer = ResponseSchemas::new();
        outer.insert(200, Schema::String);
        outer.insert(400, Schema::String);

        inner.inherit(&outer);
        assert_eq!(inner.get(200), Some(&Schema::Number));
        assert_eq!(inner.get(400), Some(&Schema::String));
    }

    #[test]
    fn test_invalid_status_is_rejected() {
        let mut schemas = ResponseSchemas::new();
        schemas.insert(200, Schema::String);
        assert!(schemas.check_statuses("/ok").is_ok());

        schemas.insert(42, Schema::String);
        assert!(matches!(
            schemas.check_statuses("/bad"),
            Err(ConfigError::ResponseSchema { status: 42, .. })
        ));
    }

    #[test]
    fn test_verify_by_status() {
        let mut schemas = ResponseSchemas::new();
        schemas.insert(200, Schema::Number);

        assert!(schemas.verify(&Response::json(json!(1))).is_ok());
        assert!(schemas.verify(&Response::text("Hi")).is_err());
        // undeclared status
        assert!(schemas
            .verify(&Response::text("Hi").with_status(StatusCode::NOT_FOUND))
            .is_ok());
    }
}

//! Schema tree and structural checking.
//!
//! A schema is a tagged tree independent of any validation library:
//! ```text
//! Object [ Field { name, required, schema }, ... ]
//!     String | Number | Boolean | Array(item) | Object(..) | Any
//! ```
//! Checking collects every issue instead of stopping at the first one.

use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Expected shape of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String,
    Number,
    Boolean,
    Array(Box<Schema>),
    Object(Vec<Field>),
    Any,
}

/// A named member of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
        }
    }
}

/// One problem found while checking a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Dotted path to the offending value; empty for the root.
    pub path: String,
    pub message: String,
}

impl Schema {
    /// Shorthand for an object schema.
    pub fn object(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema::Object(fields.into_iter().collect())
    }

    pub fn array(item: Schema) -> Self {
        Schema::Array(Box::new(item))
    }

    /// Check `value`, returning the accepted value with unknown object keys
    /// removed. With `coerce`, numbers and booleans are also accepted in their
    /// string form (query, form, params and header input).
    pub fn check(&self, value: &Value, coerce: bool) -> Result<Value, Vec<Issue>> {
        let mut issues = Vec::new();
        let accepted = self.check_at(value, coerce, "", &mut issues);
        if issues.is_empty() {
            Ok(accepted)
        } else {
            Err(issues)
        }
    }

    fn check_at(&self, value: &Value, coerce: bool, path: &str, issues: &mut Vec<Issue>) -> Value {
        match (self, value) {
            (Schema::Any, _) => value.clone(),
            (Schema::String, Value::String(_)) => value.clone(),
            (Schema::Number, Value::Number(_)) => value.clone(),
            (Schema::Boolean, Value::Bool(_)) => value.clone(),
            (Schema::Number, Value::String(s)) if coerce => match coerce_number(s) {
                Some(n) => Value::Number(n),
                None => mismatch(self, value, path, issues),
            },
            (Schema::Boolean, Value::String(s)) if coerce => match s.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => mismatch(self, value, path, issues),
            },
            (Schema::Array(item), Value::Array(values)) => Value::Array(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| item.check_at(v, coerce, &join(path, &i.to_string()), issues))
                    .collect(),
            ),
            (Schema::Object(fields), Value::Object(map)) => {
                let mut accepted = Map::new();
                for field in fields {
                    let field_path = join(path, &field.name);
                    match map.get(&field.name) {
                        None | Some(Value::Null) if field.required => issues.push(Issue {
                            path: field_path,
                            message: "required field is missing".to_string(),
                        }),
                        None | Some(Value::Null) => {}
                        Some(v) => {
                            let checked = field.schema.check_at(v, coerce, &field_path, issues);
                            accepted.insert(field.name.clone(), checked);
                        }
                    }
                }
                Value::Object(accepted)
            }
            _ => mismatch(self, value, path, issues),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Schema::String => "string",
            Schema::Number => "number",
            Schema::Boolean => "boolean",
            Schema::Array(_) => "array",
            Schema::Object(_) => "object",
            Schema::Any => "any",
        }
    }
}

fn mismatch(schema: &Schema, value: &Value, path: &str, issues: &mut Vec<Issue>) -> Value {
    issues.push(Issue {
        path: path.to_string(),
        message: format!("expected {}, found {}", schema.kind(), value_kind(value)),
    });
    Value::Null
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

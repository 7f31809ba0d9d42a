//! Route pattern compilation and path matching.
//!
//! # Responsibilities
//! - Parse pattern strings into typed segments
//! - Match request paths against compiled patterns
//! - Extract named parameter values
//!
//! # Syntax
//! ```text
//! /books                literal, case-sensitive
//! /books/:id            one non-empty segment, captured as `id`
//! /animal/:type?        optional trailing segment
//! /post/:date{[0-9]+}   one segment fully matching the regex
//! /files/:path{.+\.png} last position: remainder of the path, slashes included
//! /admin/*              any remainder (possibly empty), captured as `*`
//! ```
//!
//! # Design Decisions
//! - Optional, wildcard and constrained tail segments must be last, so matching
//!   never backtracks
//! - Regexes are anchored at compile time; a constraint always covers the
//!   whole segment (or the whole remainder for a tail)
//! - Captured values are percent-decoded

use std::collections::{HashMap, HashSet};
use std::fmt;

use regex::Regex;
use thiserror::Error;

/// Named values extracted from a matched path.
pub type Params = HashMap<String, String>;

/// Name under which a `*` wildcard captures the remainder.
pub const WILDCARD: &str = "*";

/// Errors raised while compiling a pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern `{pattern}` must start with `/`")]
    MissingLeadingSlash { pattern: String },

    #[error("pattern `{pattern}`: parameter name is empty")]
    EmptyName { pattern: String },

    #[error("pattern `{pattern}`: parameter `{name}` is declared twice")]
    DuplicateParam { pattern: String, name: String },

    #[error("pattern `{pattern}`: unterminated constraint in `{segment}`")]
    Unterminated { pattern: String, segment: String },

    #[error("pattern `{pattern}`: invalid constraint for `{name}`: {source}")]
    InvalidRegex {
        pattern: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("pattern `{pattern}`: `{segment}` is only allowed as the last segment")]
    NotLast { pattern: String, segment: String },
}

/// A single compiled path segment.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Exact text.
    Literal(String),
    /// Exactly one non-empty segment.
    Param(String),
    /// Zero or one trailing segment.
    Optional(String),
    /// One segment constrained by an anchored regex.
    Regex { name: String, regex: Regex },
    /// The remainder of the path, embedded slashes included.
    /// `regex: None` is the `*` wildcard and also accepts an empty remainder.
    Tail { name: String, regex: Option<Regex> },
}

impl Segment {
    fn name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Param(name)
            | Segment::Optional(name)
            | Segment::Regex { name, .. }
            | Segment::Tail { name, .. } => Some(name),
        }
    }
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile a pattern string.
    pub fn compile(source: &str) -> Result<Self, PatternError> {
        let Some(body) = source.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash {
                pattern: source.to_string(),
            });
        };

        let raw = split_pattern(body);
        let last = raw.len().saturating_sub(1);
        let mut segments = Vec::with_capacity(raw.len());
        let mut seen = HashSet::new();

        for (index, part) in raw.iter().enumerate() {
            let segment = parse_segment(source, part, index == last)?;

            let tail_like = matches!(segment, Segment::Optional(_) | Segment::Tail { .. });
            if tail_like && index != last {
                return Err(PatternError::NotLast {
                    pattern: source.to_string(),
                    segment: (*part).to_string(),
                });
            }

            if let Some(name) = segment.name() {
                if !seen.insert(name.to_string()) {
                    return Err(PatternError::DuplicateParam {
                        pattern: source.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The pattern as written at registration.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Compiled segments, in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let parts = split_path(path);
        let mut params = Params::new();

        for (index, segment) in self.segments.iter().enumerate() {
            let part = parts.get(index).map(|p| decode(p));
            match segment {
                Segment::Literal(text) => {
                    if part.as_deref() != Some(text.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = part.filter(|v| !v.is_empty())?;
                    params.insert(name.clone(), value);
                }
                Segment::Regex { name, regex } => {
                    let value = part.filter(|v| !v.is_empty() && regex.is_match(v))?;
                    params.insert(name.clone(), value);
                }
                Segment::Optional(name) => {
                    if parts.len() > index + 1 {
                        return None;
                    }
                    match part {
                        None => {}
                        Some(value) if !value.is_empty() => {
                            params.insert(name.clone(), value);
                        }
                        Some(_) => return None,
                    }
                    return Some(params);
                }
                Segment::Tail { name, regex } => {
                    let rest = parts[index.min(parts.len())..]
                        .iter()
                        .map(|p| decode(p))
                        .collect::<Vec<_>>()
                        .join("/");
                    if let Some(regex) = regex {
                        if rest.is_empty() || !regex.is_match(&rest) {
                            return None;
                        }
                    }
                    params.insert(name.clone(), rest);
                    return Some(params);
                }
            }
        }

        if parts.len() == self.segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_segment(pattern: &str, part: &str, is_last: bool) -> Result<Segment, PatternError> {
    if part == WILDCARD {
        return Ok(Segment::Tail {
            name: WILDCARD.to_string(),
            regex: None,
        });
    }

    let Some(rest) = part.strip_prefix(':') else {
        return Ok(Segment::Literal(part.to_string()));
    };

    if let Some(open) = rest.find('{') {
        let Some(constraint) = rest[open + 1..].strip_suffix('}') else {
            return Err(PatternError::Unterminated {
                pattern: pattern.to_string(),
                segment: part.to_string(),
            });
        };
        let name = check_name(pattern, &rest[..open])?;
        let regex = Regex::new(&format!("^(?:{})$", constraint)).map_err(|source| {
            PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                name: name.clone(),
                source,
            }
        })?;
        return Ok(if is_last {
            Segment::Tail {
                name,
                regex: Some(regex),
            }
        } else {
            Segment::Regex { name, regex }
        });
    }

    if let Some(name) = rest.strip_suffix('?') {
        return Ok(Segment::Optional(check_name(pattern, name)?));
    }

    Ok(Segment::Param(check_name(pattern, rest)?))
}

fn check_name(pattern: &str, name: &str) -> Result<String, PatternError> {
    if name.is_empty() {
        return Err(PatternError::EmptyName {
            pattern: pattern.to_string(),
        });
    }
    Ok(name.to_string())
}

/// Split a pattern body on `/`, ignoring slashes inside `{...}` constraints.
fn split_pattern(body: &str) -> Vec<&str> {
    if body.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in body.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

/// Split a request path into raw segments. `/` has none; `/a/` ends with an empty one.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    let body = path.strip_prefix('/').unwrap_or(path);
    if body.is_empty() {
        Vec::new()
    } else {
        body.split('/').collect()
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

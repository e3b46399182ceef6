//! Records and identifiers stored under each server entry.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Link cap applied to servers that never stored one.
pub const DEFAULT_LIMIT: i64 = 3;

/// Link types starting with this prefix are reserved.
pub const RESERVED_TYPE_PREFIX: &str = "__";

static LINK_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://.+\..+").expect("link pattern compiles"));

/// Errors emitted when a link or link type fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkFormatError {
    #[error("link type uses the reserved `{RESERVED_TYPE_PREFIX}` prefix")]
    ReservedType,
    #[error("link is not an http(s) url")]
    NotAUrl,
}

/// Rejects link types carrying the reserved prefix (case-sensitive).
pub fn validate_link_type(link_type: &str) -> Result<(), LinkFormatError> {
    if link_type.starts_with(RESERVED_TYPE_PREFIX) {
        return Err(LinkFormatError::ReservedType);
    }
    Ok(())
}

/// Loose url shape check: `http(s)://`, something, a dot, something. The
/// match is case-insensitive and may start anywhere in the input.
pub fn validate_link(link: &str) -> Result<(), LinkFormatError> {
    if !LINK_SHAPE.is_match(link) {
        return Err(LinkFormatError::NotAUrl);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for ServerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-user state nested under a server. Missing fields decode to their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    pub count: i64,
    pub links: Vec<String>,
}

/// Shape written when a server is first added. The maps keep insertion
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerRecord {
    pub proxies: Map<String, Value>,
    pub users: Map<String, Value>,
    pub limit: i64,
}

impl Default for ServerRecord {
    fn default() -> Self {
        Self {
            proxies: Map::new(),
            users: Map::new(),
            limit: DEFAULT_LIMIT,
        }
    }
}

//! Dot-delimited addressing into nested JSON documents.

use std::{fmt, str::FromStr};

use serde_json::{Map, Value};
use thiserror::Error;

/// Separator used when a path is rendered or parsed as a string.
pub const PATH_SEPARATOR: char = '.';

/// Ordered list of segments addressing a value inside the store. The first
/// segment selects a top-level entry; the rest walk into its JSON document.
///
/// Paths built with [`KeyPath::new`] and [`KeyPath::child`] keep segments as
/// given, so identifiers containing the separator are never re-split.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    pub fn new(root: impl Into<String>) -> Self {
        Self(vec![root.into()])
    }

    /// Parses a dot-delimited path such as `servers.42.limit`.
    pub fn parse(raw: &str) -> Result<Self, KeyPathError> {
        if raw.is_empty() {
            return Err(KeyPathError::Empty);
        }
        let segments: Vec<String> = raw.split(PATH_SEPARATOR).map(str::to_owned).collect();
        if let Some(index) = segments.iter().position(String::is_empty) {
            return Err(KeyPathError::EmptySegment { index });
        }
        Ok(Self(segments))
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn root(&self) -> &str {
        &self.0[0]
    }

    /// Segments below the root entry.
    pub fn rest(&self) -> &[String] {
        &self.0[1..]
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for KeyPath {
    type Err = KeyPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyPathError {
    #[error("key path must contain at least one segment")]
    Empty,
    #[error("key path segment {index} is empty")]
    EmptySegment { index: usize },
}

/// Walks `segments` through nested objects. Non-object intermediates end the
/// walk.
pub fn lookup<'a>(document: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

/// Writes `value` at `segments`, creating intermediate objects and replacing
/// any non-object value found on the way.
pub fn assign(document: &mut Value, segments: &[String], value: Value) {
    *slot_mut(document, segments) = value;
}

/// Appends `value` to the array at `segments`, creating the array when the
/// slot is empty. Returns `false` and leaves the document untouched when the
/// slot holds something other than an array.
pub fn append(document: &mut Value, segments: &[String], value: Value) -> bool {
    if let Some(existing) = lookup(document, segments) {
        if !existing.is_null() && !existing.is_array() {
            return false;
        }
    }
    match slot_mut(document, segments) {
        Value::Array(items) => items.push(value),
        slot => *slot = Value::Array(vec![value]),
    }
    true
}

fn slot_mut<'a>(document: &'a mut Value, segments: &[String]) -> &'a mut Value {
    let mut current = document;
    for segment in segments {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            unreachable!("slot was just replaced with an object");
        };
        current = map.entry(segment.as_str()).or_insert(Value::Null);
    }
    current
}

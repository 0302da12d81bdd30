//! Typed feature store attached to every linguistic node.
//!
//! A `FeatureSet` maps string keys to [`Value`]s (string, int, or float).
//! Keys are unique per owner; every item content node and every utterance
//! owns exactly one set. Decision trees and path expressions read features,
//! pipeline stages write them.

use std::collections::HashMap;
use std::fmt;

/// A single feature value.
///
/// Comparisons in decision trees are done either textually (via [`Display`])
/// or numerically (via [`Value::to_float`]), so the three variants stay
/// deliberately small.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i32),
    Float(f32),
}

impl Value {
    /// Borrow the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload; floats and strings are not coerced.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: floats as-is, ints promoted, strings parsed.
    ///
    /// String parsing is what lets a decision tree compare a stored
    /// `"1"` against a numeric literal.
    pub fn to_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f32),
            Value::Str(s) => s.trim().parse::<f32>().ok(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

/// String-keyed collection of [`Value`]s.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    map: HashMap<String, Value>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) {
        self.map.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.map.insert(name.to_string(), value.into());
    }

    pub fn set_string(&mut self, name: &str, value: &str) {
        self.set(name, value);
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set(name, value);
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set(name, value);
    }

    /// String view of a feature, `None` when absent or non-string.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(Value::as_int)
    }

    /// Float view; ints are promoted (see [`Value::to_float`]).
    pub fn float(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(Value::to_float)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Iterate over all (name, value) pairs, unordered.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

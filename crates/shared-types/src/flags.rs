//! # Flag Map
//!
//! A flat, JSON-encoded key/value map. This is the shape of both a node's
//! declared configuration and the flag file the node binary reads on start.
//!
//! Layering is "first write wins": `set_default` and `set_defaults` only
//! fill keys that are absent, so a value placed earlier (typically by the
//! caller) always survives later defaulting.

use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FlagError;

/// Ordered map of flag name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagsMap(BTreeMap<String, Value>);

impl FlagsMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value` only if `key` is absent.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Apply every entry of `defaults` that is not already present.
    pub fn set_defaults(&mut self, defaults: &FlagsMap) {
        for (key, value) in defaults.iter() {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    /// Unconditionally set `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Read a string flag. Absent or `null` yields `None`.
    pub fn get_string(&self, key: &str) -> Result<Option<String>, FlagError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(unexpected(key, "string", other)),
        }
    }

    /// Read a boolean flag, accepting JSON booleans and "true"/"false"
    /// strings. Absent yields `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, FlagError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(unexpected(key, "bool", &Value::String(s.clone()))),
            },
            Some(other) => Err(unexpected(key, "bool", other)),
        }
    }

    /// Read an unsigned integer flag, accepting numbers and numeric strings.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, FlagError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| unexpected(key, "unsigned integer", &Value::Number(n.clone()))),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| unexpected(key, "unsigned integer", &Value::String(s.clone()))),
            Some(other) => Err(unexpected(key, "unsigned integer", other)),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FlagsMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a FlagsMap {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn unexpected(key: &str, expected: &'static str, found: &Value) -> FlagError {
    FlagError::UnexpectedType {
        key: key.to_string(),
        expected,
        found: found.to_string(),
    }
}

//! Key types, key validation and key/value pair containers
//!
//! Every key that reaches a backend has passed through [`KeyValidator`]:
//! it is non-empty, matches the configured pattern (if any) and has been
//! normalized to a `String`.

use crate::error::{Error, Result};
use crate::storage::adapter::Value;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// A cache key as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// String key
    Str(String),
    /// Integer key, normalized to its decimal form
    Int(i64),
}

impl Key {
    /// The normalized string form of the key
    pub fn normalized(&self) -> String {
        match self {
            Key::Str(key) => key.clone(),
            Key::Int(key) => key.to_string(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(key) => f.write_str(key),
            Key::Int(key) => write!(f, "{}", key),
        }
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::Str(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::Str(key)
    }
}

impl From<&String> for Key {
    fn from(key: &String) -> Self {
        Key::Str(key.clone())
    }
}

impl From<i64> for Key {
    fn from(key: i64) -> Self {
        Key::Int(key)
    }
}

impl From<i32> for Key {
    fn from(key: i32) -> Self {
        Key::Int(i64::from(key))
    }
}

impl From<u32> for Key {
    fn from(key: u32) -> Self {
        Key::Int(i64::from(key))
    }
}

/// Ordered key/value pairs with unique, normalized keys
///
/// Inserting a key that is already present replaces its value in place, so
/// the first-seen position of every key is kept. Equality compares order too.
#[derive(Debug, Clone, Default)]
pub struct KeyValuePairs {
    entries: IndexMap<String, Value>,
}

impl KeyValuePairs {
    /// Create an empty set of pairs
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set with room for `capacity` pairs
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Insert a pair, returning the previous value for the key
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Look up the value stored for a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a key, returning its value; the remaining pairs keep their order
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterate over the pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no pairs
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for KeyValuePairs {
    fn eq(&self, other: &Self) -> bool {
        self.entries.iter().eq(other.entries.iter())
    }
}

impl IntoIterator for KeyValuePairs {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for KeyValuePairs {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut pairs = KeyValuePairs::with_capacity(iter.size_hint().0);
        for (key, value) in iter {
            pairs.insert(key, value);
        }
        pairs
    }
}

/// Validates and normalizes keys against an optional pattern
#[derive(Debug, Clone, Default)]
pub struct KeyValidator {
    pattern: Option<Regex>,
}

impl KeyValidator {
    /// Build a validator; an empty pattern disables pattern matching
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Self { pattern: None });
        }

        let regex = Regex::new(pattern).map_err(|e| Error::Configuration {
            message: format!("Invalid key pattern '{}': {}", pattern, e),
        })?;

        Ok(Self {
            pattern: Some(regex),
        })
    }

    /// The configured pattern, if any
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }

    /// Validate a key and return its normalized form
    pub fn validate(&self, key: &Key) -> Result<String> {
        let normalized = key.normalized();
        self.validate_str(&normalized)?;
        Ok(normalized)
    }

    /// Validate an already normalized key
    pub fn validate_str(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_key("An empty key isn't allowed"));
        }

        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(key) {
                return Err(Error::invalid_key(format!(
                    "The key '{}' doesn't match against pattern '{}'",
                    key,
                    pattern.as_str()
                )));
            }
        }

        Ok(())
    }

    /// Validate every key and drop duplicates, keeping first occurrences
    pub fn normalize_keys<I>(&self, keys: I) -> Result<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let mut seen = HashSet::new();
        let mut normalized = Vec::new();

        for key in keys {
            let key = self.validate(&key.into())?;
            if seen.insert(key.clone()) {
                normalized.push(key);
            }
        }

        if normalized.is_empty() {
            return Err(Error::invalid_key("At least one key is required"));
        }

        Ok(normalized)
    }

    /// Validate caller-supplied pairs and normalize their keys
    pub fn validate_pairs<I, K>(&self, pairs: I) -> Result<KeyValuePairs>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Key>,
    {
        let pairs = pairs.into_iter();
        let mut normalized = KeyValuePairs::with_capacity(pairs.size_hint().0);
        for (key, value) in pairs {
            let key = self.validate(&key.into())?;
            normalized.insert(key, value);
        }

        self.check_pairs(&normalized)?;
        Ok(normalized)
    }

    /// Re-check pairs whose keys are already strings
    pub fn check_pairs(&self, pairs: &KeyValuePairs) -> Result<()> {
        if pairs.is_empty() {
            return Err(Error::invalid_key("Key/Value pairs must not be empty"));
        }

        for (key, _) in pairs.iter() {
            self.validate_str(key)?;
        }

        Ok(())
    }
}

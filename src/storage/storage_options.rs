//! Adapter configuration

use crate::error::{Error, Result};
use crate::storage::storage_keys::KeyValidator;
use serde::{Deserialize, Serialize};

/// Options shared by every storage, whatever the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Reads reach the backend
    pub readable: bool,
    /// Writes reach the backend
    pub writable: bool,
    /// Regular expression every key has to match; empty disables the check
    pub key_pattern: String,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            readable: true,
            writable: true,
            key_pattern: String::new(),
        }
    }
}

impl AdapterOptions {
    /// Parse options from JSON, missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json).map_err(|e| Error::Configuration {
            message: format!("Invalid adapter options: {}", e),
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Set the key pattern
    pub fn with_key_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.key_pattern = pattern.into();
        self
    }

    /// Set the readable flag
    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    /// Set the writable flag
    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Enable or disable both reading and writing
    pub fn set_caching(&mut self, flag: bool) {
        self.readable = flag;
        self.writable = flag;
    }

    /// Reading and writing are both enabled
    pub fn caching(&self) -> bool {
        self.readable && self.writable
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        self.key_validator().map(|_| ())
    }

    /// Compile the key pattern into a validator
    pub fn key_validator(&self) -> Result<KeyValidator> {
        KeyValidator::new(&self.key_pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_options_default() {
        let options = AdapterOptions::default();
        assert!(options.readable);
        assert!(options.writable);
        assert!(options.key_pattern.is_empty());
        assert!(options.caching());
    }

    #[test]
    fn test_set_caching() {
        let mut options = AdapterOptions::default();
        options.set_caching(false);
        assert!(!options.readable);
        assert!(!options.writable);
        assert!(!options.caching());

        let options = AdapterOptions::default().with_writable(false);
        assert!(!options.caching());
    }

    #[test]
    fn test_from_json() {
        let options = AdapterOptions::from_json(r#"{"writable": false, "key_pattern": "^[a-z]+$"}"#).unwrap();
        assert!(options.readable);
        assert!(!options.writable);
        assert_eq!(options.key_pattern, "^[a-z]+$");
    }

    #[test]
    fn test_from_json_rejects_bad_pattern() {
        let error = AdapterOptions::from_json(r#"{"key_pattern": "(["}"#).unwrap_err();
        assert!(matches!(error, Error::Configuration { .. }));

        assert!(AdapterOptions::from_json("not json").is_err());
    }
}

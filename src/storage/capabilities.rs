//! Capability descriptor of a storage backend

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Describes what a backend supports
///
/// Built once per storage and shared as `Arc<Capabilities>`; a plugin may
/// hand out a different descriptor by stopping the `getCapabilities.pre`
/// event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Maximum key length, `None` when unlimited
    pub max_key_length: Option<usize>,
    /// Whether items can expire
    pub ttl_supported: bool,
    /// Smallest distinguishable TTL step
    pub ttl_precision: Duration,
    /// Minimum TTL supported
    pub min_ttl: Duration,
    /// Maximum TTL supported, `None` when unlimited
    pub max_ttl: Option<Duration>,
    /// TTL is fixed at write time and cannot change per read
    pub static_ttl: bool,
    /// Namespaces are implemented as key prefixes
    pub namespace_is_prefix: bool,
    /// Separator between namespace and key
    pub namespace_separator: String,
    /// Expiry is computed from the request start time
    pub use_request_time: bool,
    /// Backend can sweep expired items
    pub clear_expired: bool,
    /// Backend can compact its storage
    pub optimize: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_key_length: None,
            ttl_supported: false,
            ttl_precision: Duration::from_secs(1),
            min_ttl: Duration::ZERO,
            max_ttl: None,
            static_ttl: true,
            namespace_is_prefix: true,
            namespace_separator: String::new(),
            use_request_time: false,
            clear_expired: false,
            optimize: false,
        }
    }
}

impl Capabilities {
    /// Set the maximum key length
    pub fn with_max_key_length(mut self, max_key_length: usize) -> Self {
        self.max_key_length = Some(max_key_length);
        self
    }

    /// Declare TTL support with the given precision
    pub fn with_ttl(mut self, precision: Duration) -> Self {
        self.ttl_supported = true;
        self.ttl_precision = precision;
        self
    }

    /// Set the maximum TTL
    pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl = Some(max_ttl);
        self
    }

    /// Set the namespace separator
    pub fn with_namespace_separator(mut self, separator: impl Into<String>) -> Self {
        self.namespace_separator = separator.into();
        self
    }

    /// Whether a key of the given length is accepted
    pub fn accepts_key_length(&self, length: usize) -> bool {
        self.max_key_length.map_or(true, |max| length <= max)
    }
}

//! Event shapes passed to listeners
//!
//! Every public storage operation publishes a pre event, then either a post
//! event or an exception event. All three share the operation's
//! [`EventParams`] by mutable reference, so a listener that rewrites a
//! parameter is seen by the backend call and by every later listener.

use crate::error::{Error, Result, StorageError};
use crate::storage::adapter::{CasToken, Value};
use crate::storage::capabilities::Capabilities;
use crate::storage::storage_api::StorageTarget;
use crate::storage::storage_keys::KeyValuePairs;
use std::collections::HashMap;
use std::sync::Arc;

/// Parameter names used by the storage operations
pub mod param_names {
    //! Names of the parameters seeded by each operation

    /// Single key
    pub const KEY: &str = "key";
    /// Key list of batch operations
    pub const KEYS: &str = "keys";
    /// Value to write
    pub const VALUE: &str = "value";
    /// Pairs of batch writes
    pub const KEY_VALUE_PAIRS: &str = "keyValuePairs";
    /// Expected token of a check-and-set
    pub const TOKEN: &str = "token";
    /// Found flag of a read
    pub const SUCCESS: &str = "success";
    /// CAS token produced by a read
    pub const CAS_TOKEN: &str = "casToken";
    /// New adapter options, published by the `option` event
    pub const OPTIONS: &str = "options";
}

/// A single event parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A normalized key
    Key(String),
    /// A list of normalized keys
    Keys(Vec<String>),
    /// A value
    Value(Value),
    /// Key/value pairs
    Pairs(KeyValuePairs),
    /// A tri-state flag, `None` until known
    Flag(Option<bool>),
    /// An optional CAS token
    Token(Option<CasToken>),
}

/// Ordered, mutable parameters of an operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventParams {
    entries: Vec<(String, Param)>,
}

impl EventParams {
    /// Create empty parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`EventParams::insert`]
    pub fn with(mut self, name: impl Into<String>, param: Param) -> Self {
        self.insert(name, param);
        self
    }

    /// Set a parameter, replacing it in place when it already exists
    pub fn insert(&mut self, name: impl Into<String>, param: Param) -> Option<Param> {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, param)),
            None => {
                self.entries.push((name, param));
                None
            }
        }
    }

    /// Look up a parameter
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, param)| param)
    }

    /// Look up a parameter for in-place mutation
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.entries
            .iter_mut()
            .find(|(existing, _)| existing == name)
            .map(|(_, param)| param)
    }

    /// Remove a parameter
    pub fn remove(&mut self, name: &str) -> Option<Param> {
        let position = self.entries.iter().position(|(existing, _)| existing == name)?;
        Some(self.entries.remove(position).1)
    }

    /// Whether a parameter is set
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Parameter names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `key` parameter
    pub fn key(&self) -> Option<&str> {
        match self.get(param_names::KEY) {
            Some(Param::Key(key)) => Some(key.as_str()),
            _ => None,
        }
    }

    /// Rewrite the `key` parameter
    pub fn set_key(&mut self, key: impl Into<String>) {
        self.insert(param_names::KEY, Param::Key(key.into()));
    }

    /// The `keys` parameter
    pub fn keys(&self) -> Option<&[String]> {
        match self.get(param_names::KEYS) {
            Some(Param::Keys(keys)) => Some(keys.as_slice()),
            _ => None,
        }
    }

    /// Rewrite the `keys` parameter
    pub fn set_keys(&mut self, keys: Vec<String>) {
        self.insert(param_names::KEYS, Param::Keys(keys));
    }

    /// The `value` parameter
    pub fn value(&self) -> Option<&Value> {
        match self.get(param_names::VALUE) {
            Some(Param::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Rewrite the `value` parameter
    pub fn set_value(&mut self, value: Value) {
        self.insert(param_names::VALUE, Param::Value(value));
    }

    /// The `keyValuePairs` parameter
    pub fn key_value_pairs(&self) -> Option<&KeyValuePairs> {
        match self.get(param_names::KEY_VALUE_PAIRS) {
            Some(Param::Pairs(pairs)) => Some(pairs),
            _ => None,
        }
    }

    /// The `keyValuePairs` parameter for in-place mutation
    pub fn key_value_pairs_mut(&mut self) -> Option<&mut KeyValuePairs> {
        match self.get_mut(param_names::KEY_VALUE_PAIRS) {
            Some(Param::Pairs(pairs)) => Some(pairs),
            _ => None,
        }
    }

    /// The `token` parameter of a check-and-set
    pub fn token(&self) -> Option<&CasToken> {
        match self.get(param_names::TOKEN) {
            Some(Param::Token(token)) => token.as_ref(),
            _ => None,
        }
    }

    /// The `success` flag, `None` when unset or unknown
    pub fn success(&self) -> Option<bool> {
        match self.get(param_names::SUCCESS) {
            Some(Param::Flag(flag)) => *flag,
            _ => None,
        }
    }

    /// The serialized options of an `option` event
    pub fn options(&self) -> Option<&Value> {
        match self.get(param_names::OPTIONS) {
            Some(Param::Value(options)) => Some(options),
            _ => None,
        }
    }

    /// The `casToken` parameter
    pub fn cas_token(&self) -> Option<&CasToken> {
        match self.get(param_names::CAS_TOKEN) {
            Some(Param::Token(token)) => token.as_ref(),
            _ => None,
        }
    }
}

/// Result slot of an operation
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Single read; `None` when not found
    Value(Option<Value>),
    /// Single write or existence test
    Flag(bool),
    /// Found keys of a batch test, or not-written keys of a batch write
    Keys(Vec<String>),
    /// Found pairs of a batch read
    Items(HashMap<String, Value>),
    /// Capability descriptor
    Capabilities(Arc<Capabilities>),
}

impl Response {
    fn kind(&self) -> &'static str {
        match self {
            Response::Value(_) => "value",
            Response::Flag(_) => "flag",
            Response::Keys(_) => "keys",
            Response::Items(_) => "items",
            Response::Capabilities(_) => "capabilities",
        }
    }

    fn mismatch(&self, operation: &str, expected: &str) -> Error {
        Error::logic(format!(
            "{} expects a {} response, got {}",
            operation,
            expected,
            self.kind()
        ))
    }

    /// Unwrap a single read result
    pub fn into_value(self, operation: &str) -> Result<Option<Value>> {
        match self {
            Response::Value(value) => Ok(value),
            other => Err(other.mismatch(operation, "value")),
        }
    }

    /// Unwrap a flag result
    pub fn into_flag(self, operation: &str) -> Result<bool> {
        match self {
            Response::Flag(flag) => Ok(flag),
            other => Err(other.mismatch(operation, "flag")),
        }
    }

    /// Unwrap a key list result
    pub fn into_keys(self, operation: &str) -> Result<Vec<String>> {
        match self {
            Response::Keys(keys) => Ok(keys),
            other => Err(other.mismatch(operation, "keys")),
        }
    }

    /// Unwrap a batch read result
    pub fn into_items(self, operation: &str) -> Result<HashMap<String, Value>> {
        match self {
            Response::Items(items) => Ok(items),
            other => Err(other.mismatch(operation, "items")),
        }
    }

    /// Unwrap a capabilities result
    pub fn into_capabilities(self, operation: &str) -> Result<Arc<Capabilities>> {
        match self {
            Response::Capabilities(capabilities) => Ok(capabilities),
            other => Err(other.mismatch(operation, "capabilities")),
        }
    }
}

/// Base event: a name, the storage it concerns and the operation's parameters
pub struct Event<'a> {
    name: String,
    storage: &'a dyn StorageTarget,
    params: &'a mut EventParams,
}

impl<'a> Event<'a> {
    /// Create an event
    pub fn new(name: impl Into<String>, storage: &'a dyn StorageTarget, params: &'a mut EventParams) -> Self {
        Self {
            name: name.into(),
            storage,
            params,
        }
    }

    /// Event name, e.g. `setItem.post`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The storage that triggered the event
    pub fn storage(&self) -> &'a dyn StorageTarget {
        self.storage
    }

    /// Operation parameters
    pub fn params(&self) -> &EventParams {
        &*self.params
    }

    /// Operation parameters for mutation
    pub fn params_mut(&mut self) -> &mut EventParams {
        &mut *self.params
    }
}

/// Event published after the backend call
pub struct PostEvent<'a> {
    event: Event<'a>,
    result: Response,
}

impl<'a> PostEvent<'a> {
    /// Create a post event carrying the current result
    pub fn new(event: Event<'a>, result: Response) -> Self {
        Self { event, result }
    }

    /// The base event
    pub fn event(&self) -> &Event<'a> {
        &self.event
    }

    /// The current result
    pub fn result(&self) -> &Response {
        &self.result
    }

    /// Replace the result
    pub fn set_result(&mut self, result: Response) {
        self.result = result;
    }

    /// Consume the event, keeping the result
    pub fn into_result(self) -> Response {
        self.result
    }
}

/// Event published when a storage fault occurs
pub struct ExceptionEvent<'a> {
    event: Event<'a>,
    result: Response,
    error: StorageError,
    throw_exception: bool,
}

impl<'a> ExceptionEvent<'a> {
    /// Create an exception event with a fallback result; rethrow is on by default
    pub fn new(event: Event<'a>, result: Response, error: StorageError) -> Self {
        Self {
            event,
            result,
            error,
            throw_exception: true,
        }
    }

    /// The base event
    pub fn event(&self) -> &Event<'a> {
        &self.event
    }

    /// The captured fault
    pub fn error(&self) -> &StorageError {
        &self.error
    }

    /// Whether the fault is re-raised to the caller
    pub fn throw_exception(&self) -> bool {
        self.throw_exception
    }

    /// Decide whether the fault is re-raised to the caller
    pub fn set_throw_exception(&mut self, flag: bool) {
        self.throw_exception = flag;
    }

    /// The fallback result
    pub fn result(&self) -> &Response {
        &self.result
    }

    /// Replace the fallback result
    pub fn set_result(&mut self, result: Response) {
        self.result = result;
    }

    /// Consume the event into `(fallback, fault, throw_exception)`
    pub fn into_parts(self) -> (Response, StorageError, bool) {
        (self.result, self.error, self.throw_exception)
    }
}

/// The event a listener receives
pub enum StorageEvent<'e, 'a> {
    /// `<op>.pre`
    Pre(&'e mut Event<'a>),
    /// `<op>.post`
    Post(&'e mut PostEvent<'a>),
    /// `<op>.exception`
    Exception(&'e mut ExceptionEvent<'a>),
    /// `option`, published when the adapter options are replaced
    Options(&'e mut Event<'a>),
}

impl<'e, 'a> StorageEvent<'e, 'a> {
    fn base(&self) -> &Event<'a> {
        match self {
            StorageEvent::Pre(event) => &**event,
            StorageEvent::Post(event) => &event.event,
            StorageEvent::Exception(event) => &event.event,
            StorageEvent::Options(event) => &**event,
        }
    }

    fn base_mut(&mut self) -> &mut Event<'a> {
        match self {
            StorageEvent::Pre(event) => &mut **event,
            StorageEvent::Post(event) => &mut event.event,
            StorageEvent::Exception(event) => &mut event.event,
            StorageEvent::Options(event) => &mut **event,
        }
    }

    /// Event name
    pub fn name(&self) -> &str {
        self.base().name()
    }

    /// The storage that triggered the event
    pub fn storage(&self) -> &'a dyn StorageTarget {
        self.base().storage()
    }

    /// Operation parameters
    pub fn params(&self) -> &EventParams {
        self.base().params()
    }

    /// Operation parameters for mutation
    pub fn params_mut(&mut self) -> &mut EventParams {
        self.base_mut().params_mut()
    }

    /// The post event, when this is one
    pub fn as_post_mut(&mut self) -> Option<&mut PostEvent<'a>> {
        match self {
            StorageEvent::Post(event) => Some(&mut **event),
            _ => None,
        }
    }

    /// The exception event, when this is one
    pub fn as_exception_mut(&mut self) -> Option<&mut ExceptionEvent<'a>> {
        match self {
            StorageEvent::Exception(event) => Some(&mut **event),
            _ => None,
        }
    }
}

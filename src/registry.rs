//! Handler interest registry
//!
//! Records which (suite, event) pairs the runtime wants delivered. Nothing in
//! the dispatch path consults it: installation logic outside this crate reads
//! it to decide which handlers to register with the OS.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A (suite, event) pair in string-encoded four-character form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey {
    suite: String,
    event: String,
}

impl HandlerKey {
    pub fn new(suite: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            event: event.into(),
        }
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.suite, self.event)
    }
}

/// Append-only set of handler keys
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    keys: Mutex<BTreeSet<HandlerKey>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark interest in (suite, event); registering twice is a no-op
    pub fn register_interest(&self, suite: &str, event: &str) {
        let key = HandlerKey::new(suite, event);
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if keys.insert(key) {
            tracing::debug!(suite, event, "registered handler interest");
        }
    }

    pub fn is_registered(&self, suite: &str, event: &str) -> bool {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.contains(&HandlerKey::new(suite, event))
    }

    /// Every registered key, in sorted order
    pub fn registered(&self) -> Vec<HandlerKey> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every registration
    pub fn reset(&self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

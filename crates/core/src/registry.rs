//! Registered tag metadata names.
//!
//! The indexer folds every registered metadata name into the Solr `tags` field
//! as `name%%value`. Some callers need an extra name only for the duration of
//! one projection; [`TagRegistry::scoped`] hands out a guard that restores the
//! previous registration set when dropped.

#![forbid(unsafe_code)]

use std::ops::Deref;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRegistry { names: Vec<String> }

impl Default for TagRegistry {
    fn default() -> Self { Self { names: vec!["tags".to_string()] } }
}

impl TagRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reg = Self { names: Vec::new() };
        for n in names { reg.register(n); }
        reg
    }

    pub fn register(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) { self.names.push(name); }
    }

    pub fn is_registered(&self, name: &str) -> bool { self.names.iter().any(|n| n == name) }

    pub fn names(&self) -> &[String] { &self.names }

    /// Register `name` until the returned guard drops. If `name` was already
    /// registered nothing is changed and nothing is restored.
    pub fn scoped(&mut self, name: &str) -> TagScope<'_> {
        let previous = if self.is_registered(name) {
            None
        } else {
            let before = self.names.clone();
            self.register(name);
            Some(before)
        };
        TagScope { registry: self, previous }
    }
}

/// Guard returned by [`TagRegistry::scoped`].
pub struct TagScope<'a> {
    registry: &'a mut TagRegistry,
    previous: Option<Vec<String>>,
}

impl TagScope<'_> {
    /// Whether this scope added the name (and will remove it again).
    pub fn added(&self) -> bool { self.previous.is_some() }
}

impl Deref for TagScope<'_> {
    type Target = TagRegistry;
    fn deref(&self) -> &TagRegistry { self.registry }
}

impl Drop for TagScope<'_> {
    fn drop(&mut self) {
        if let Some(prev) = self.previous.take() {
            self.registry.names = prev;
        }
    }
}

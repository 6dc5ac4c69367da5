//! Getter registry: path strings to byte-producing closures.
//!
//! Paths are stored verbatim — a `%d` placeholder is a convention between
//! the host and its clients, never parsed here. Indices travel separately
//! with each subscription.

use std::collections::HashMap;

/// A registered getter: maps a bound index vector to the current bytes of
/// some in-process value. The returned buffer is copied into the outbound
/// frame before the next getter runs.
pub type Getter = Box<dyn Fn(&[i32]) -> Vec<u8> + Send>;

/// Arena of getters with a stable id per registration.
///
/// Ids are assigned sequentially and never reused. Re-registering a path
/// repoints the mapping at a fresh id; the superseded closure stays in the
/// arena, unreachable, so ids held by live subscriptions stay valid.
#[derive(Default)]
pub struct GetterRegistry {
    path_to_getter: HashMap<String, usize>,
    getters: Vec<Getter>,
}

impl GetterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `getter` under `path`. Always succeeds.
    pub fn var<F>(&mut self, path: impl Into<String>, getter: F) -> bool
    where
        F: Fn(&[i32]) -> Vec<u8> + Send + 'static,
    {
        self.path_to_getter.insert(path.into(), self.getters.len());
        self.getters.push(Box::new(getter));
        true
    }

    /// Resolve a path to its current getter id.
    pub fn lookup(&self, path: &str) -> Option<usize> {
        self.path_to_getter.get(path).copied()
    }

    /// Fetch a getter by id.
    pub fn get(&self, id: usize) -> Option<&Getter> {
        self.getters.get(id)
    }

    /// Number of registrations ever made (not the number of live paths).
    pub fn len(&self) -> usize {
        self.getters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.getters.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────

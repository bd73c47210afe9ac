// src/cache.rs

//! Depends cache
//!
//! Remembers the verdict for each dependency string so that expensive
//! probes run once per distinct dependency. The backing store is
//! pluggable; any store failure turns the cache off for the rest of the
//! run without failing the dependency check.

use crate::ds::Verdict;
use crate::error::Result;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Key/value store holding cached verdicts
pub trait CacheStore {
    fn get(&self, key: &str) -> Result<Option<i32>>;

    fn put(&self, key: &str, value: i32) -> Result<()>;

    /// Drop every cached verdict
    fn clear(&self) -> Result<()>;
}

/// Process-lifetime store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, i32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<i32>> {
        Ok(self.entries.borrow().get(key).copied())
    }

    fn put(&self, key: &str, value: i32) -> Result<()> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

/// Verdict cache keyed by the formatted dependency
pub struct DependsCache {
    store: Option<Rc<dyn CacheStore>>,
    enabled: Cell<bool>,
}

impl DependsCache {
    pub fn new(store: Option<Rc<dyn CacheStore>>) -> Self {
        let enabled = store.is_some();
        Self {
            store,
            enabled: Cell::new(enabled),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn disable(&self, op: &str, err: &dyn std::fmt::Display) {
        warn!("depends cache {} failed, caching disabled: {}", op, err);
        self.enabled.set(false);
    }

    pub fn lookup(&self, key: &str) -> Option<Verdict> {
        if !self.enabled.get() {
            return None;
        }
        let store = self.store.as_ref()?;
        match store.get(key) {
            Ok(Some(rc)) => Verdict::from_rc(rc),
            Ok(None) => None,
            Err(e) => {
                self.disable("lookup", &e);
                None
            }
        }
    }

    pub fn store(&self, key: &str, verdict: Verdict) {
        if !self.enabled.get() {
            return;
        }
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.put(key, verdict.as_rc()) {
            Ok(()) => debug!("cached {:?} for \"{}\"", verdict, key),
            Err(e) => self.disable("store", &e),
        }
    }

    /// Forget every verdict after the element set changed
    pub fn invalidate(&self) {
        if !self.enabled.get() {
            return;
        }
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.clear() {
            Ok(()) => debug!("depends cache cleared"),
            Err(e) => self.disable("clear", &e),
        }
    }
}

impl std::fmt::Debug for DependsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependsCache")
            .field("store", &self.store.is_some())
            .field("enabled", &self.enabled.get())
            .finish()
    }
}

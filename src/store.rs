//! Key-value store boundary and write interception
//!
//! The viewer persists its settings in a string key-value store (local
//! storage in the browser). To react to setting changes immediately, every
//! write to a watched key also runs the handlers registered for that key.
//! The interception lives here, at the store boundary, rather than being
//! patched into whatever store object happens to be global.

use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A string key-value store
pub trait KeyValueStore {
    /// Read a key; `Ok(None)` when absent
    fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Write a key
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete a key
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infallible write
    pub fn put(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// Infallible delete
    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.put(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.delete(key);
        Ok(())
    }
}

type WriteHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Registry of per-key write handlers.
///
/// Cloning shares the registry, so a backend can hand a clone to whatever
/// observes writes on its side (for example a page binding).
#[derive(Clone, Default)]
pub struct StoreHooks {
    handlers: Arc<Mutex<HashMap<String, Vec<WriteHandler>>>>,
}

impl StoreHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `handler(key, value)` after every write to `key`
    pub fn on_write<F>(&self, key: &str, handler: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        if let Ok(mut map) = self.handlers.lock() {
            map.entry(key.to_string()).or_default().push(Arc::new(handler));
        }
    }

    /// Report a completed write of `key`
    pub fn notify(&self, key: &str, value: &str) {
        // Clone the handler list so a handler may register further hooks.
        let handlers = match self.handlers.lock() {
            Ok(map) => map.get(key).cloned().unwrap_or_default(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(key, value);
        }
    }

    /// Drop every handler
    pub fn clear(&self) {
        if let Ok(mut map) = self.handlers.lock() {
            map.clear();
        }
    }
}

impl std::fmt::Debug for StoreHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .handlers
            .lock()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("StoreHooks").field("keys", &keys).finish()
    }
}

/// Store decorator that notifies [`StoreHooks`] after each successful write
#[derive(Debug)]
pub struct InterceptingStore<S> {
    inner: S,
    hooks: StoreHooks,
}

impl<S: KeyValueStore> InterceptingStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, hooks: StoreHooks::new() }
    }

    /// Shared handle on the hook registry
    pub fn hooks(&self) -> StoreHooks {
        self.hooks.clone()
    }

    /// Access the wrapped store, bypassing the hooks.
    ///
    /// Used to model writes made by another browsing context, which the
    /// interception layer of this context never sees.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: KeyValueStore> KeyValueStore for InterceptingStore<S> {
    fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value)?;
        self.hooks.notify(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn memory_store_basic_ops() {
        let mut s = MemoryStore::new();
        assert_eq!(s.get("k").unwrap(), None);
        s.set("k", "v").unwrap();
        assert_eq!(s.get("k").unwrap().as_deref(), Some("v"));
        s.remove("k").unwrap();
        assert_eq!(s.get("k").unwrap(), None);
    }

    #[test]
    fn hooks_fire_only_for_watched_key() {
        let mut store = InterceptingStore::new(MemoryStore::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        store.hooks().on_write("watched", move |k, v| {
            assert_eq!(k, "watched");
            assert_eq!(v, "1");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        store.set("other", "x").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        store.set("watched", "1").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("watched").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn bypassing_writes_are_not_intercepted() {
        let mut store = InterceptingStore::new(MemoryStore::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        store.hooks().on_write("k", move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        store.inner_mut().set("k", "v").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn cleared_hooks_stop_firing() {
        let hooks = StoreHooks::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        hooks.on_write("a", move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        hooks.notify("a", "1");
        hooks.clear();
        hooks.notify("a", "2");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

//! Watcher Store (C2, spec §4.2).
//!
//! A keyed cache with time-based eviction and a notification hook, modeled
//! on `pkg/watchers/storage.go`'s `watcherStore` wrapping `cache.Store`: the
//! capability-set pattern from spec §9's "inheritance via embedded base"
//! note — `{Add, Update, Delete}` delegating to an inner TTL cache and
//! invoking the handler synchronously on success.
//!
//! Exclusively owned by a single [`crate::watcher::EventWatcher`] (spec §3
//! Ownership), so no internal locking is needed beyond what `&mut self`
//! already gives us.

use std::collections::HashMap;

use clockabilly::Clockable;

use crate::errors::*;

/// Receives lifecycle notifications from a [`TtlStore`] (spec §4.2: "the
/// corresponding lifecycle method of the handler is invoked synchronously").
#[async_trait::async_trait]
pub trait StoreHandler<T: Clone + Send + Sync>: Send + Sync {
    async fn on_add(&self, obj: &T) -> EmptyResult;
    async fn on_update(&self, old: &T, new: &T) -> EmptyResult;
    async fn on_delete(&self, obj: &T) -> EmptyResult;
}

struct Entry<T> {
    value: T,
    expires_at: i64,
}

/// A TTL-bounded keyed cache layered under a list/watch reflector. Eviction
/// is lazy: entries past their TTL are dropped the next time the key is
/// looked up, mirroring `client-go`'s `TTLStore`.
pub struct TtlStore<T: Clone + Send + Sync> {
    entries: HashMap<String, Entry<T>>,
    ttl_secs: i64,
    clock: Box<dyn Clockable + Send + Sync>,
}

impl<T: Clone + Send + Sync> TtlStore<T> {
    pub fn new(ttl_secs: i64, clock: Box<dyn Clockable + Send + Sync>) -> Self {
        Self { entries: HashMap::new(), ttl_secs, clock }
    }

    fn now(&self) -> i64 {
        self.clock.now_ts()
    }

    fn is_expired(entry: &Entry<T>, now: i64) -> bool {
        now - entry.expires_at >= 0
    }

    /// Inserts or replaces `key`, invoking `Add` or `Update` on `handler`
    /// according to whether the key was already present and unexpired.
    pub async fn add<H: StoreHandler<T>>(&mut self, key: &str, obj: T, handler: &H) -> EmptyResult {
        let now = self.now();
        let prev = self.entries.remove(key).filter(|e| !Self::is_expired(e, now));
        self.entries.insert(key.into(), Entry { value: obj.clone(), expires_at: now + self.ttl_secs });

        match prev {
            Some(prev) => handler.on_update(&prev.value, &obj).await,
            None => handler.on_add(&obj).await,
        }
    }

    /// Removes `key`, notifying `Delete` with the last-known object.
    /// Deletion-tombstone handling: the caller resolves the wrapper to a key
    /// before calling this (spec §3 TTL Cache Entry: "Key derivation ...
    /// with deletion-tombstone handling").
    pub async fn delete<H: StoreHandler<T>>(&mut self, key: &str, obj: T, handler: &H) -> EmptyResult {
        self.entries.remove(key);
        handler.on_delete(&obj).await
    }

    /// Atomically replaces the entire store contents without emitting `Add`
    /// notifications (spec §4.2: "replayed items do NOT generate Add
    /// notifications; they replace the store atomically").
    pub fn replace_all(&mut self, items: Vec<(String, T)>) {
        let now = self.now();
        self.entries.clear();
        for (key, value) in items {
            self.entries.insert(key, Entry { value, expires_at: now + self.ttl_secs });
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.now();
        self.entries.get(key).filter(|e| !Self::is_expired(e, now)).map(|e| e.value.clone())
    }

    pub fn len(&self) -> usize {
        let now = self.now();
        self.entries.values().filter(|e| !Self::is_expired(e, now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use clockabilly::UtcClock;
    use clockabilly::mock::MockUtcClock;

    use super::*;

    struct RecordingHandler {
        adds: std::sync::Mutex<Vec<String>>,
        updates: std::sync::Mutex<Vec<(String, String)>>,
        deletes: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn new() -> Self {
            Self { adds: Default::default(), updates: Default::default(), deletes: Default::default() }
        }
    }

    #[async_trait::async_trait]
    impl StoreHandler<String> for RecordingHandler {
        async fn on_add(&self, obj: &String) -> EmptyResult {
            self.adds.lock().unwrap().push(obj.clone());
            Ok(())
        }

        async fn on_update(&self, old: &String, new: &String) -> EmptyResult {
            self.updates.lock().unwrap().push((old.clone(), new.clone()));
            Ok(())
        }

        async fn on_delete(&self, obj: &String) -> EmptyResult {
            self.deletes.lock().unwrap().push(obj.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn add_then_add_again_emits_update_with_old_value() {
        let mut store = TtlStore::new(3600, Box::new(UtcClock));
        let handler = RecordingHandler::new();

        store.add("k1", "v1".to_string(), &handler).await.unwrap();
        store.add("k1", "v2".to_string(), &handler).await.unwrap();

        assert_eq!(handler.adds.lock().unwrap().as_slice(), ["v1".to_string()]);
        assert_eq!(handler.updates.lock().unwrap().as_slice(), [("v1".to_string(), "v2".to_string())]);
    }

    #[tokio::test]
    async fn expired_entry_re_adds_instead_of_updating() {
        let mut clock = MockUtcClock::new(1000);
        let mut store = TtlStore::new(10, clock.clone());
        let handler = RecordingHandler::new();

        store.add("k1", "v1".to_string(), &handler).await.unwrap();
        clock.advance(20);
        store = TtlStore::new(10, clock);
        store.add("k1", "v1".to_string(), &handler).await.unwrap();
        store.add("k1", "v2".to_string(), &handler).await.unwrap();

        assert_len_eq_x!(handler.adds.lock().unwrap().as_slice(), 2);
    }

    #[tokio::test]
    async fn delete_removes_key_and_notifies() {
        let mut store = TtlStore::new(3600, Box::new(UtcClock));
        let handler = RecordingHandler::new();

        store.add("k1", "v1".to_string(), &handler).await.unwrap();
        store.delete("k1", "v1".to_string(), &handler).await.unwrap();

        assert!(store.get("k1").is_none());
        assert_eq!(handler.deletes.lock().unwrap().as_slice(), ["k1".to_string()]);
    }

    #[tokio::test]
    async fn replace_all_does_not_emit_add_notifications() {
        let mut store = TtlStore::new(3600, Box::new(UtcClock));
        let handler = RecordingHandler::new();

        store.replace_all(vec![("k1".into(), "v1".to_string()), ("k2".into(), "v2".to_string())]);

        assert!(handler.adds.lock().unwrap().is_empty());
        assert_len_eq_x!(&store, 2);
    }
}

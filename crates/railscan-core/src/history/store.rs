//! History store: bounded, ordered, persisted log of analysis outcomes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::notifier::ChangeNotifier;
use crate::domain::{EntryId, HistoryChanged, HistoryEntry, Payload};
use crate::observer::Subscription;
use crate::ports::{Clock, KeyValueStore, StorageError, StorageEvent};

/// Storage key of the history log.
pub const HISTORY_KEY: &str = "detectionHistory";

/// Maximum number of persisted elements kept. Older elements are evicted first.
pub const HISTORY_CAP: usize = 20;

const EMPTY_LOG: &str = "[]";

/// Why the persisted log could not be read.
#[derive(Debug, Error)]
enum LoadError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("persisted history is not a JSON array: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One element of the persisted array.
///
/// Elements that do not read as an entry are kept verbatim, in place, so a
/// later write never drops them. They count toward the cap but are not listed.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Slot {
    Entry(HistoryEntry),
    Foreign(Value),
}

impl Slot {
    fn entry(&self) -> Option<&HistoryEntry> {
        match self {
            Slot::Entry(entry) => Some(entry),
            Slot::Foreign(_) => None,
        }
    }

    fn into_entry(self) -> Option<HistoryEntry> {
        match self {
            Slot::Entry(entry) => Some(entry),
            Slot::Foreign(_) => None,
        }
    }
}

/// Durable, bounded record of past analyses.
///
/// Design:
/// - No in-memory cache. Every read goes to storage, so several views over the
///   same storage always agree.
/// - Persisted oldest-first. `list()` returns newest-first.
/// - Change signals come from the storage adapter's `watch`, which reports
///   writes through the same handle as well as other handles. Every store over
///   that storage is told, not only the one that wrote.
/// - Storage failures never reach the caller: reads degrade to an empty log,
///   failed writes are logged and dropped.
pub struct HistoryStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    key: String,
    changes: ChangeNotifier,
    bridge: Option<Subscription>,
}

impl HistoryStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_key(storage, clock, HISTORY_KEY)
    }

    /// A store over a non-default storage key.
    pub fn with_key(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, key: impl Into<String>) -> Self {
        let key = key.into();
        let changes = ChangeNotifier::new();

        let bridge = storage.watch(Box::new({
            let key = key.clone();
            let changes = changes.clone();
            move |event: &StorageEvent| {
                if event.key == key {
                    tracing::trace!(key = %event.key, origin = ?event.origin, "history slot written");
                    changes.broadcast();
                }
            }
        }));
        if bridge.is_none() {
            tracing::debug!(key = %key, "storage has no watch channel, only this store's writes will signal");
        }

        Self {
            storage,
            clock,
            key,
            changes,
            bridge,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record a new analysis outcome and return the stored entry.
    ///
    /// The entry is returned even if it could not be persisted.
    pub fn append(&self, payload: Payload) -> HistoryEntry {
        let now = truncate_to_millis(self.clock.now());

        let mut slots = match self.load() {
            Ok(slots) => slots,
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "history unreadable, new entry not saved");
                return HistoryEntry::new(EntryId::from_millis(now.timestamp_millis()), now, payload);
            }
        };

        let entry = HistoryEntry::new(next_id(now, &slots), now, payload);
        slots.push(Slot::Entry(entry.clone()));
        if slots.len() > HISTORY_CAP {
            let overflow = slots.len() - HISTORY_CAP;
            slots.drain(..overflow);
            tracing::debug!(key = %self.key, evicted = overflow, "history cap reached");
        }

        if self.persist(&slots) {
            self.signal_written();
        }
        entry
    }

    /// All entries, newest first. Unreadable storage yields an empty list.
    pub fn list(&self) -> Vec<HistoryEntry> {
        match self.load() {
            Ok(slots) => slots.into_iter().rev().filter_map(Slot::into_entry).collect(),
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "history unreadable, showing it as empty");
                Vec::new()
            }
        }
    }

    /// Entry at `index` of the newest-first view.
    pub fn get(&self, index: usize) -> Option<HistoryEntry> {
        self.list().into_iter().nth(index)
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the entry at `index` of the newest-first view.
    ///
    /// Out-of-range indices are a no-op and return `None`.
    pub fn delete_at(&self, index: usize) -> Option<HistoryEntry> {
        let mut slots = match self.load() {
            Ok(slots) => slots,
            Err(error) => {
                tracing::warn!(key = %self.key, %error, index, "history unreadable, nothing deleted");
                return None;
            }
        };

        let position = slots
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, slot)| slot.entry().is_some())
            .nth(index)
            .map(|(position, _)| position);
        let Some(position) = position else {
            tracing::debug!(key = %self.key, index, "delete index out of range");
            return None;
        };
        let removed = slots.remove(position).into_entry()?;

        if self.persist(&slots) {
            self.signal_written();
            Some(removed)
        } else {
            None
        }
    }

    /// Erase every entry. The slot is left holding an empty log, not unset.
    ///
    /// Callers are responsible for confirming with the user first.
    pub fn clear(&self) {
        match self.storage.set(&self.key, EMPTY_LOG) {
            Ok(()) => self.signal_written(),
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "failed to clear history");
            }
        }
    }

    /// Observe mutations of the log made through any store or storage handle.
    ///
    /// The signal carries no data. Call `list()` to see the new state.
    pub fn on_change<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&HistoryChanged) + Send + Sync + 'static,
    {
        self.changes.subscribe(observer)
    }

    /// Does the storage adapter report writes to this key? Without it only
    /// this store's own mutations signal.
    pub fn is_bridged(&self) -> bool {
        self.bridge.is_some()
    }

    /// A bridged store hears its own write back through the adapter.
    fn signal_written(&self) {
        if self.bridge.is_none() {
            self.changes.broadcast();
        }
    }

    /// Persisted elements, oldest first.
    fn load(&self) -> Result<Vec<Slot>, LoadError> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(Vec::new());
        };

        let values: Vec<Value> = serde_json::from_str(&raw)?;
        let slots = values
            .into_iter()
            .enumerate()
            .map(|(position, value)| {
                let parsed = HistoryEntry::deserialize(&value);
                match parsed {
                    Ok(entry) => Slot::Entry(entry),
                    Err(error) => {
                        tracing::warn!(key = %self.key, position, %error, "unreadable history element kept as is");
                        Slot::Foreign(value)
                    }
                }
            })
            .collect();
        Ok(slots)
    }

    /// Replace the persisted log in one write. Returns whether it was written.
    fn persist(&self, slots: &[Slot]) -> bool {
        let raw = match serde_json::to_string(slots) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::error!(key = %self.key, %error, "failed to serialize history");
                return false;
            }
        };

        match self.storage.set(&self.key, &raw) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(key = %self.key, %error, elements = slots.len(), "failed to save history");
                false
            }
        }
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        if let Some(bridge) = &self.bridge {
            bridge.unsubscribe();
        }
    }
}

/// Ids follow the clock, but never repeat or go backwards within one log.
fn next_id(now: DateTime<Utc>, slots: &[Slot]) -> EntryId {
    let candidate = EntryId::from_millis(now.timestamp_millis());
    match slots.iter().filter_map(Slot::entry).map(HistoryEntry::id).max() {
        Some(newest) if newest >= candidate => newest.next(),
        _ => candidate,
    }
}

/// Stored timestamps have millisecond precision.
fn truncate_to_millis(now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{FileKeyValueStore, InMemoryKeyValueStore};
    use crate::observer::lock;
    use crate::ports::FixedClock;
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (HistoryStore, Arc<InMemoryKeyValueStore>, Arc<FixedClock>) {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let clock = Arc::new(FixedClock::new(start()));
        let store = HistoryStore::new(storage.clone(), clock.clone());
        (store, storage, clock)
    }

    fn tag(n: i64) -> Payload {
        let mut payload = Payload::new();
        payload.insert("tag".to_string(), json!(n));
        payload
    }

    fn tags(entries: &[HistoryEntry]) -> Vec<i64> {
        entries
            .iter()
            .map(|entry| entry.field("tag").and_then(Value::as_i64).unwrap())
            .collect()
    }

    fn change_counter(store: &HistoryStore) -> (Arc<AtomicUsize>, Subscription) {
        let hits = Arc::new(AtomicUsize::new(0));
        let sub = store.on_change({
            let hits = Arc::clone(&hits);
            move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        });
        (hits, sub)
    }

    #[test]
    fn empty_when_nothing_persisted() {
        let (store, storage, _) = setup();
        assert!(store.list().is_empty());
        assert_eq!(storage.get(HISTORY_KEY).unwrap(), None);
    }

    #[test]
    fn append_sets_id_and_timestamp_from_clock() {
        let (store, _, clock) = setup();
        clock.advance(TimeDelta::milliseconds(7));

        let entry = store.append(tag(1));

        let expected = start() + TimeDelta::milliseconds(7);
        assert_eq!(entry.timestamp(), expected);
        assert_eq!(entry.id().as_i64(), expected.timestamp_millis());
    }

    #[test]
    fn list_is_newest_first_and_persisted_is_oldest_first() {
        let (store, storage, clock) = setup();
        for n in 0..3 {
            store.append(tag(n));
            clock.advance(TimeDelta::seconds(1));
        }

        assert_eq!(tags(&store.list()), vec![2, 1, 0]);

        let raw: Vec<Value> = serde_json::from_str(&storage.get(HISTORY_KEY).unwrap().unwrap()).unwrap();
        let persisted: Vec<i64> = raw.iter().map(|v| v["tag"].as_i64().unwrap()).collect();
        assert_eq!(persisted, vec![0, 1, 2]);
    }

    #[test]
    fn ids_stay_unique_when_clock_does_not_move() {
        let (store, _, _) = setup();

        let a = store.append(tag(0));
        let b = store.append(tag(1));
        let c = store.append(tag(2));

        assert!(a.id() < b.id() && b.id() < c.id());
    }

    #[test]
    fn cap_evicts_oldest() {
        let (store, _, clock) = setup();
        for n in 0..=20 {
            store.append(tag(n));
            clock.advance(TimeDelta::milliseconds(1));
        }

        let entries = store.list();
        assert_eq!(entries.len(), HISTORY_CAP);
        assert_eq!(tags(&entries).first(), Some(&20));
        assert!(!tags(&entries).contains(&0));
    }

    #[test]
    fn delete_at_uses_newest_first_index() {
        let (store, _, clock) = setup();
        for n in 0..4 {
            store.append(tag(n));
            clock.advance(TimeDelta::milliseconds(1));
        }

        let removed = store.delete_at(1).unwrap();

        assert_eq!(removed.field("tag"), Some(&json!(2)));
        assert_eq!(tags(&store.list()), vec![3, 1, 0]);
    }

    #[test]
    fn delete_out_of_range_is_noop_without_signal() {
        let (store, _, _) = setup();
        store.append(tag(0));
        let (hits, _sub) = change_counter(&store);

        assert!(store.delete_at(1).is_none());
        assert!(store.delete_at(usize::MAX).is_none());

        assert_eq!(store.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_writes_explicit_empty_log() {
        let (store, storage, _) = setup();
        store.append(tag(0));

        store.clear();

        assert!(store.is_empty());
        assert_eq!(storage.get(HISTORY_KEY).unwrap(), Some("[]".to_string()));
    }

    #[test]
    fn every_mutation_signals() {
        let (store, _, _) = setup();
        let (hits, _sub) = change_counter(&store);

        store.append(tag(0));
        store.append(tag(1));
        store.delete_at(0);
        store.clear();

        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn reads_do_not_signal_or_write() {
        let (store, storage, _) = setup();
        let (hits, _sub) = change_counter(&store);

        store.list();
        store.get(0);

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(storage.get(HISTORY_KEY).unwrap(), None);
    }

    #[test]
    fn corrupted_slot_reads_as_empty() {
        let (store, storage, _) = setup();
        storage.set(HISTORY_KEY, "{not json").unwrap();
        assert!(store.list().is_empty());

        storage.set(HISTORY_KEY, r#"{"an": "object"}"#).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn append_over_corrupted_slot_is_swallowed_and_leaves_slot_alone() {
        let (store, storage, _) = setup();
        storage.set(HISTORY_KEY, "garbage").unwrap();
        let (hits, _sub) = change_counter(&store);

        let entry = store.append(tag(1));

        assert_eq!(entry.field("tag"), Some(&json!(1)));
        assert_eq!(storage.get(HISTORY_KEY).unwrap(), Some("garbage".to_string()));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        store.clear();
        store.append(tag(2));
        assert_eq!(tags(&store.list()), vec![2]);
    }

    #[test]
    fn malformed_elements_are_skipped() {
        let (store, storage, _) = setup();
        storage
            .set(
                HISTORY_KEY,
                r#"[{"id":1,"timestamp":"2024-01-01T00:00:00.000Z","tag":1},{"tag":"no envelope"},42]"#,
            )
            .unwrap();

        assert_eq!(tags(&store.list()), vec![1]);
    }

    fn persisted(storage: &InMemoryKeyValueStore) -> Vec<Value> {
        serde_json::from_str(&storage.get(HISTORY_KEY).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn unreadable_elements_survive_append_in_place() {
        let (store, storage, _) = setup();
        let foreign = json!({"id": "abc", "timestamp": "2024-01-01T00:00:00.000Z", "tag": 2});
        let seeded = json!([
            {"id": 1, "timestamp": "2024-01-01T00:00:00.000Z", "tag": 1},
            foreign.clone()
        ]);
        storage.set(HISTORY_KEY, &seeded.to_string()).unwrap();

        store.append(tag(3));

        let raw = persisted(&storage);
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0]["tag"], json!(1));
        assert_eq!(raw[1], foreign);
        assert_eq!(raw[2]["tag"], json!(3));
        assert_eq!(tags(&store.list()), vec![3, 1]);
    }

    #[test]
    fn delete_at_skips_unreadable_elements_and_keeps_them() {
        let (store, storage, _) = setup();
        storage
            .set(
                HISTORY_KEY,
                r#"[{"id":1,"timestamp":"2024-01-01T00:00:00.000Z","tag":1},42,{"id":2,"timestamp":"2024-01-01T00:00:01.000Z","tag":2}]"#,
            )
            .unwrap();

        let removed = store.delete_at(1).unwrap();

        assert_eq!(removed.field("tag"), Some(&json!(1)));
        let raw = persisted(&storage);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0], json!(42));
        assert_eq!(raw[1]["tag"], json!(2));
        assert!(store.delete_at(1).is_none());
    }

    #[test]
    fn unreadable_elements_count_toward_the_cap() {
        let (store, storage, _) = setup();
        let seeded: Vec<Value> = (0..HISTORY_CAP).map(|n| json!({"legacy": n})).collect();
        storage
            .set(HISTORY_KEY, &serde_json::to_string(&seeded).unwrap())
            .unwrap();

        store.append(tag(7));

        let raw = persisted(&storage);
        assert_eq!(raw.len(), HISTORY_CAP);
        assert_eq!(raw[0], json!({"legacy": 1}));
        assert_eq!(raw[HISTORY_CAP - 1]["tag"], json!(7));
    }

    #[test]
    fn stores_sharing_a_handle_see_each_others_changes() {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(start()));
        let upload_view = HistoryStore::new(storage.clone(), clock.clone());
        let sidebar = HistoryStore::new(storage, clock);
        let (sidebar_hits, _s1) = change_counter(&sidebar);
        let (upload_hits, _s2) = change_counter(&upload_view);

        upload_view.append(tag(1));
        assert_eq!(sidebar_hits.load(Ordering::SeqCst), 1);
        assert_eq!(tags(&sidebar.list()), vec![1]);

        sidebar.delete_at(0);
        upload_view.clear();

        assert_eq!(sidebar_hits.load(Ordering::SeqCst), 3);
        assert_eq!(upload_hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stores_sharing_a_file_store_see_each_others_changes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileKeyValueStore::open(dir.path()).unwrap());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(start()));
        let writer = HistoryStore::new(storage.clone(), clock.clone());
        let viewer = HistoryStore::new(storage, clock);
        let (hits, _sub) = change_counter(&viewer);

        writer.append(tag(1));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(viewer.len(), 1);
    }

    /// Storage with no change channel.
    #[derive(Default)]
    struct PlainStore {
        slots: Mutex<HashMap<String, String>>,
    }

    impl KeyValueStore for PlainStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            Ok(lock(&self.slots).get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            lock(&self.slots).insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[test]
    fn unbridged_store_signals_its_own_mutations() {
        let store = HistoryStore::new(Arc::new(PlainStore::default()), Arc::new(FixedClock::new(start())));
        let (hits, _sub) = change_counter(&store);

        store.append(tag(1));
        store.delete_at(0);
        store.clear();

        assert!(!store.is_bridged());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn quota_exceeded_is_swallowed() {
        let storage = Arc::new(InMemoryKeyValueStore::with_quota(64));
        let clock = Arc::new(FixedClock::new(start()));
        let store = HistoryStore::new(storage.clone(), clock);
        let (hits, _sub) = change_counter(&store);

        let mut big = Payload::new();
        big.insert("result_image".to_string(), json!("x".repeat(1024)));
        let entry = store.append(big);

        assert!(entry.result_image().is_some());
        assert!(store.list().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn writes_through_another_handle_reach_on_change() {
        let storage = InMemoryKeyValueStore::new();
        let other_window = Arc::new(storage.open_handle());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(start()));
        let here = HistoryStore::new(Arc::new(storage), clock.clone());
        let there = HistoryStore::new(other_window.clone(), clock);
        let (hits, _sub) = change_counter(&here);

        there.append(tag(9));
        other_window.set("unrelated", "1").unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(tags(&here.list()), vec![9]);
    }

    #[test]
    fn dropping_store_removes_storage_bridge() {
        let storage = InMemoryKeyValueStore::new();
        let writer = storage.open_handle();
        let store = HistoryStore::new(Arc::new(storage), Arc::new(FixedClock::new(start())));
        assert!(store.is_bridged());

        let (hits, sub) = change_counter(&store);
        drop(store);
        writer.set(HISTORY_KEY, "[]").unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        sub.unsubscribe();
    }

    #[test]
    fn custom_key_is_isolated() {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(start()));
        let default = HistoryStore::new(storage.clone(), clock.clone());
        let other = HistoryStore::with_key(storage, clock, "otherHistory");

        other.append(tag(1));

        assert_eq!(other.key(), "otherHistory");
        assert!(default.list().is_empty());
        assert_eq!(other.len(), 1);
    }
}

//! InMemoryKeyValueStore - 開発用・テスト用のストレージ
//!
//! # 学習ポイント
//! - 1 つのバッキングを複数ハンドルで共有（ブラウザの同一オリジン・複数タブに相当）
//! - 書き込みはすべての watcher に通知され、`origin` で自分のハンドルか他のハンドルかを区別できる
//! - quota を設定すると容量超過エラーを再現できる

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::observer::{ObserverSet, Subscription, lock};
use crate::ports::{ChangeOrigin, KeyValueStore, StorageError, StorageEvent, StorageListener};

#[derive(Debug, Clone)]
struct Change {
    handle: u64,
    key: String,
}

#[derive(Debug)]
struct Backing {
    slots: Mutex<HashMap<String, String>>,
    changes: ObserverSet<Change>,
    next_handle: AtomicU64,
    /// Total bytes (keys + values) the backing may hold.
    quota: Option<usize>,
}

/// InMemoryKeyValueStore は共有バッキングへのハンドル
///
/// # 使用例
/// ```ignore
/// let first = InMemoryKeyValueStore::new();
/// let second = first.open_handle(); // 別ウィンドウ
/// second.watch(Box::new(|ev| println!("{} changed", ev.key)));
/// first.set("k", "v")?; // second には External として通知される
/// ```
#[derive(Debug)]
pub struct InMemoryKeyValueStore {
    backing: Arc<Backing>,
    handle: u64,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::with_backing(None)
    }

    /// A store that rejects writes once keys + values exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self::with_backing(Some(bytes))
    }

    fn with_backing(quota: Option<usize>) -> Self {
        Self {
            backing: Arc::new(Backing {
                slots: Mutex::new(HashMap::new()),
                changes: ObserverSet::new(),
                next_handle: AtomicU64::new(1),
                quota,
            }),
            handle: 0,
        }
    }

    /// Another handle on the same backing, like a second window on one origin.
    pub fn open_handle(&self) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
            handle: self.backing.next_handle.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Bytes currently held (keys + values).
    pub fn used_bytes(&self) -> usize {
        lock(&self.backing.slots)
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.backing.slots).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut slots = lock(&self.backing.slots);
            if let Some(limit) = self.backing.quota {
                let others: usize = slots
                    .iter()
                    .filter(|(other, _)| other.as_str() != key)
                    .map(|(other, v)| other.len() + v.len())
                    .sum();
                let needed = others + key.len() + value.len();
                if needed > limit {
                    return Err(StorageError::QuotaExceeded {
                        key: key.to_string(),
                        needed,
                        limit,
                    });
                }
            }
            slots.insert(key.to_string(), value.to_string());
        } // Lock released here

        // Notify outside the lock so watchers can read the new value
        self.backing.changes.emit(&Change {
            handle: self.handle,
            key: key.to_string(),
        });
        Ok(())
    }

    fn watch(&self, listener: StorageListener) -> Option<Subscription> {
        let own = self.handle;
        Some(self.backing.changes.subscribe(move |change: &Change| {
            let origin = if change.handle == own {
                ChangeOrigin::Local
            } else {
                ChangeOrigin::External
            };
            listener(&StorageEvent {
                key: change.key.clone(),
                origin,
            });
        }))
    }
}

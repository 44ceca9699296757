//! KeyValueStore port - 永続化スロットの抽象化
//!
//! ブラウザの local storage と同じ形：文字列キー → 文字列値、同期 I/O。
//!
//! # 実装
//! - **InMemoryKeyValueStore**: テスト・開発用（複数ハンドル = 複数ウィンドウ）
//! - **FileKeyValueStore**: データディレクトリにキーごと 1 ファイル

use thiserror::Error;

use crate::observer::Subscription;

/// Failure reported by a storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for key `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage quota exceeded for key `{key}`: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },
}

/// Which handle a write went through, relative to the watching handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOrigin {
    /// The watching handle itself (same window).
    Local,
    /// Another handle on the same backing (another window).
    External,
}

/// A slot was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub origin: ChangeOrigin,
}

/// Listener for [`StorageEvent`]s.
pub type StorageListener = Box<dyn Fn(&StorageEvent) + Send + Sync>;

/// KeyValueStore は文字列スロットを保持
///
/// # 設計原則
/// - `set` は値を丸ごと置き換える（部分書き込みはない）
/// - `watch` は自分のハンドル経由の書き込み（Local）も他ハンドルからの書き込み（External）も通知する。
///   同じハンドルを共有するビュー同士もこれで同期できる
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Listen for successful writes, through this handle or any other.
    ///
    /// Adapters with no change channel at all return `None`.
    fn watch(&self, listener: StorageListener) -> Option<Subscription> {
        let _ = listener;
        None
    }
}

//! Events - ドメインイベント
//!
//! 履歴の変更通知はデータを運ばない。受け取った側は `HistoryStore::list()` で
//! 読み直す（送られたデータに頼らない）。

/// The persisted history log was mutated, here or by another handle on the
/// same storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HistoryChanged;

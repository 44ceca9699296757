//! Domain identifiers (strongly-typed IDs).
//!
//! - `EntryId`: 履歴エントリの ID。作成時刻のミリ秒をそのまま使う（保存形式は整数）。
//! - `ToastId`: 通知トーストの ID。ULID（時刻 + 乱数）なので同一ミリ秒でも衝突しない。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a history entry.
///
/// Persisted as a bare integer (`"id": 1704110400000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(i64);

impl EntryId {
    /// Build an id from a Unix timestamp in milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// The smallest id strictly greater than `self`.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry-{}", self.0)
    }
}

/// Identifier of an on-screen toast.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToastId(Ulid);

impl ToastId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for ToastId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for ToastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "toast-{}", self.0)
    }
}

//! FileKeyValueStore - データディレクトリにキーごと 1 ファイル
//!
//! 書き込みは同じディレクトリの一時ファイル → persist（rename）で行うので、
//! 読み手が書きかけの値を見ることはない。失敗した一時ファイルは drop で消える。
//! `watch` はこのストア（とその clone）経由の書き込みだけを通知する。別プロセスの変更は検知しない。

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::observer::{ObserverSet, Subscription};
use crate::ports::{ChangeOrigin, KeyValueStore, StorageError, StorageEvent, StorageListener};

/// Clones share the change channel, like views sharing one window.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
    changes: ObserverSet<StorageEvent>,
}

impl FileKeyValueStore {
    /// Open (or create) the data directory at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            changes: ObserverSet::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    fn write_atomically(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write_atomically(&self.path_for(key), value)
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })?;
        self.changes.emit(&StorageEvent {
            key: key.to_string(),
            origin: ChangeOrigin::Local,
        });
        Ok(())
    }

    fn watch(&self, listener: StorageListener) -> Option<Subscription> {
        Some(self.changes.subscribe(move |event: &StorageEvent| listener(event)))
    }
}

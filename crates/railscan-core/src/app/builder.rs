//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - グローバルなシングルトンを使わず、起動時に 1 回だけ作って参照で渡す

use std::sync::Arc;

use tokio::runtime::Handle;

use super::config::AppConfig;
use super::recorder::AnalysisRecorder;
use crate::history::HistoryStore;
use crate::impls::FileKeyValueStore;
use crate::notify::{NotificationBus, ToastTray};
use crate::ports::{Clock, IdGenerator, KeyValueStore, StorageError, SystemClock, UlidGenerator};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .config(AppConfig::load("railscan.json")?)
///     .build()?;
/// app.recorder.record(result);
/// ```
///
/// # Fail-fast 設計
/// - ストレージは `storage()` で注入するか、`config.data_dir` から開く
/// - どちらもなければ BuildError::MissingStorage
pub struct AppBuilder {
    config: AppConfig,
    storage: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No storage configured. Inject one with `storage()` or set `data_dir` in the config.")]
    MissingStorage,

    #[error("failed to open storage: {0}")]
    Storage(#[from] StorageError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            storage: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `storage` instead of opening `config.data_dir`.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        let storage: Arc<dyn KeyValueStore> = match (self.storage, &self.config.data_dir) {
            (Some(storage), _) => storage,
            (None, Some(dir)) => Arc::new(FileKeyValueStore::open(dir)?),
            (None, None) => return Err(BuildError::MissingStorage),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let history = Arc::new(HistoryStore::with_key(
            storage,
            Arc::clone(&clock),
            self.config.history_key.clone(),
        ));
        let bus = NotificationBus::with_default_duration(self.config.toast_duration());
        let recorder = AnalysisRecorder::new(Arc::clone(&history), bus.clone());
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock));

        tracing::debug!(key = %self.config.history_key, "app wired");
        Ok(App {
            config: self.config,
            history,
            bus,
            recorder,
            ids,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は起動時に 1 回だけ作られ、参照で各ビューに渡される
pub struct App {
    pub config: AppConfig,
    pub history: Arc<HistoryStore>,
    pub bus: NotificationBus,
    pub recorder: AnalysisRecorder,
    pub ids: Arc<dyn IdGenerator>,
}

impl App {
    /// A toast surface subscribed to this app's bus.
    pub fn toast_tray(&self, runtime: Handle) -> ToastTray {
        ToastTray::attach(&self.bus, Arc::clone(&self.ids), runtime)
    }
}

//! railscan-core
//!
//! Client-side core of the track inspection dashboard: the persisted
//! analysis history and the notification bus.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, entry, analysis, notification, events）
//! - **ports**: 抽象化レイヤー（KeyValueStore, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryKeyValueStore, FileKeyValueStore）
//! - **history**: HistoryStore と変更通知
//! - **notify**: NotificationBus と ToastTray
//! - **app**: 設定、AppBuilder、AnalysisRecorder
//! - **observer**: 共通の購読リスト

pub mod app;
pub mod domain;
pub mod history;
pub mod impls;
pub mod notify;
pub mod observer;
pub mod ports;

pub use app::{App, AppBuilder, AppConfig};
pub use history::{HISTORY_CAP, HISTORY_KEY, HistoryStore};
pub use notify::{NotificationBus, ToastTray};
pub use observer::Subscription;

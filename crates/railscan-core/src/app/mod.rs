//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppConfig**: 設定ファイル
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **AnalysisRecorder**: 解析結果の保存と通知

pub mod builder;
pub mod config;
pub mod recorder;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::{AppConfig, ConfigError};
pub use self::recorder::{AnalysisRecorder, DEFAULT_FAILURE_REASON};

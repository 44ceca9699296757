//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryKeyValueStore**: 開発用・テスト用（複数ハンドルで共有）
//! - **FileKeyValueStore**: CLI 用のファイル永続化

pub mod file_kv;
pub mod inmem_kv;

// 主要な型を再エクスポート
pub use self::file_kv::FileKeyValueStore;
pub use self::inmem_kv::InMemoryKeyValueStore;

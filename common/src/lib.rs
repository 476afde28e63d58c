//! License Manager 共通ライブラリ
//!
//! サーバーとテストで共有する型・エラー・設定・通信プロトコル

#![warn(missing_docs)]

/// 共通型定義（ライセンスレコード、監査ログ）
pub mod types;

/// エラー型定義
pub mod error;

/// 設定管理
pub mod config;

/// HTTPリクエスト/レスポンス定義
pub mod protocol;

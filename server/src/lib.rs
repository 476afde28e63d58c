//! License Manager Server
//!
//! ライセンスキーの発行・HWIDバインド付き検証・管理を行うサーバー

#![warn(missing_docs)]

/// REST APIハンドラー
pub mod api;

/// 認証（APIキー）
pub mod auth;

/// CLIインターフェース
pub mod cli;

/// 設定読み込み（YAML・dotenv・環境変数）
pub mod config;

/// データベースアクセス
pub mod db;

/// ロギング初期化
pub mod logging;

/// ライセンスレジストリ（ライフサイクルとHWIDバインドの状態遷移）
pub mod registry;

/// axumサーバー起動・シャットダウン
pub mod server;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// ライセンスレジストリ
    pub registry: registry::LicenseRegistry,
    /// 管理APIのAPIキー検証器
    pub api_key: auth::ApiKeyAuth,
    /// リクエストタイムアウト
    pub request_timeout: std::time::Duration,
}

//! 設定の読み込み
//!
//! YAMLファイル → dotenvファイル → 環境変数 → CLI引数 の順に上書きする。
//! 旧名の環境変数は警告ログを出した上で受け付ける。

use license_manager_common::config::ServerConfig;
use license_manager_common::error::ConfigError;
use std::path::Path;

use crate::cli::Cli;

/// 非推奨の旧名にフォールバックして環境変数を取得
///
/// # Arguments
/// * `new_name` - 推奨される環境変数名
/// * `old_name` - 非推奨の環境変数名
///
/// # Returns
/// * `Some(value)` - いずれかが設定されている（新名を優先）
/// * `None` - どちらも未設定
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// 空でない場合のみ環境変数を返す
fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// dotenvファイルを環境に適用（既存の環境変数は上書きしない）
///
/// ファイルが存在しない場合は何もしない。
pub fn apply_env_file(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    dotenvy::from_path(path).map_err(|e| {
        ConfigError::Invalid(format!("Failed to load env file {}: {}", path.display(), e))
    })
}

/// 環境変数による上書きを適用
pub fn apply_env_overrides(config: &mut ServerConfig) {
    if let Some(path) = non_empty_env("LICENSE_MANAGER_STORAGE_PATH") {
        config.storage_path = path;
    }
    if let Some(address) = non_empty_env("LICENSE_MANAGER_ADDRESS") {
        config.http_server.address = address;
    }
    if let Some(api_key) = get_env_with_fallback("LICENSE_MANAGER_API_KEY", "API_KEY") {
        if !api_key.trim().is_empty() {
            config.auth.api_key = api_key;
        }
    }
    if let Some(dir) = non_empty_env("LICENSE_MANAGER_LOG_DIR") {
        config.logging.dir = dir;
    }
}

/// CLI引数から最終的な設定を組み立てて検証する
pub fn load_config(cli: &Cli) -> Result<ServerConfig, ConfigError> {
    apply_env_file(&cli.env_file)?;

    let mut config = ServerConfig::load_file(&cli.config)?;
    apply_env_overrides(&mut config);
    if let Some(address) = &cli.address {
        config.http_server.address = address.clone();
    }

    config.validate()?;
    Ok(config)
}

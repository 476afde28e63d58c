//! ロギング初期化
//!
//! 標準出力と日次ローテーションのファイル出力に同じイベントを書き込む。
//! フィルタは `RUST_LOG` を優先し、未設定なら設定ファイルのレベルを使う。

use license_manager_common::config::LoggingConfig;
use std::path::Path;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログファイル名のプレフィックス
pub const LOG_FILE_PREFIX: &str = "license-manager.log";

/// ロギング初期化エラー
#[derive(Debug, Error)]
pub enum LoggingError {
    /// ログディレクトリを作成できない
    #[error("Failed to create log directory {path}: {source}")]
    LogDir {
        /// ディレクトリ
        path: String,
        /// 原因
        #[source]
        source: std::io::Error,
    },
    /// フィルタ指定が不正
    #[error("Invalid log filter '{0}'")]
    Filter(String),
    /// グローバルサブスクライバーの登録に失敗
    #[error("Failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// `RUST_LOG` または設定レベルからフィルタを作成
pub fn build_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_level).map_err(|_| LoggingError::Filter(default_level.to_string()))
}

/// ロギングを初期化する
///
/// 返された `WorkerGuard` はプロセス終了まで保持すること。ドロップするとファイル出力が止まる。
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard, LoggingError> {
    let filter = build_filter(&config.level)?;

    let dir = Path::new(&config.dir);
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
        path: config.dir.clone(),
        source,
    })?;
    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_text = (!config.json).then(|| fmt::layer().with_target(false));
    let stdout_json = config.json.then(|| fmt::layer().json());
    let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_text)
        .with(stdout_json)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

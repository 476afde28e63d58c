//! データベースアクセス層
//!
//! SQLiteデータベースへの接続・マイグレーションとライセンスストア実装

/// Repository traitパターン（レジストリとストアの境界）
pub mod traits;

/// ライセンスストア
pub mod licenses;

/// 監査ログストレージ
pub mod audit_log;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// DB初期化エラー
#[derive(Debug, thiserror::Error)]
pub enum DatabaseInitError {
    /// 接続URLが不正
    #[error("Invalid database url '{url}': {source}")]
    InvalidUrl {
        /// 接続URL
        url: String,
        /// 原因
        #[source]
        source: sqlx::Error,
    },
    /// 接続失敗
    #[error("Failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),
    /// マイグレーション失敗
    #[error("Failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// SQLiteデータベース接続プールを作成してマイグレーションを実行
///
/// # Arguments
/// * `database_url` - データベースURL（例: "sqlite://storage/licenses.db"）
///
/// # Returns
/// * `Ok(SqlitePool)` - 初期化済みデータベースプール
/// * `Err(DatabaseInitError)` - 初期化失敗
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, DatabaseInitError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|source| DatabaseInitError::InvalidUrl {
            url: database_url.to_string(),
            source,
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(DatabaseInitError::Connect)?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// マイグレーションを実行（sqlx::migrate!マクロを使用）
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed successfully");
    Ok(())
}

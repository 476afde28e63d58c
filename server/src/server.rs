//! axumサーバー起動・シャットダウンハンドリング

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use license_manager_common::config::ServerConfig;

use crate::auth::ApiKeyAuth;
use crate::db::{self, licenses::SqliteLicenseRepository, DatabaseInitError};
use crate::registry::keygen::RandomKeyGenerator;
use crate::registry::{LicenseRegistry, RegistryOptions};
use crate::AppState;

/// サーバー起動エラー
#[derive(Debug, Error)]
pub enum ServerError {
    /// ストアを開けない
    #[error(transparent)]
    Database(#[from] DatabaseInitError),
    /// ストレージディレクトリを作成できない
    #[error("Failed to create storage directory {path}: {source}")]
    StorageDir {
        /// ディレクトリ
        path: String,
        /// 原因
        #[source]
        source: std::io::Error,
    },
    /// アドレスにバインドできない
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// アドレス
        address: String,
        /// 原因
        #[source]
        source: std::io::Error,
    },
    /// 実行中のI/Oエラー
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// 設定からアプリケーション状態を組み立てる（ストアを開いてマイグレーションを実行）
pub async fn build_state(config: &ServerConfig) -> Result<AppState, ServerError> {
    let storage = std::path::Path::new(&config.storage_path);
    if !config.storage_path.starts_with("sqlite:") {
        if let Some(parent) = storage.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ServerError::StorageDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }

    let pool = db::initialize_database(&config.database_url()).await?;
    info!(storage = %config.storage_path, "License store opened");

    let registry = LicenseRegistry::new(
        Arc::new(SqliteLicenseRepository::new(pool)),
        Arc::new(RandomKeyGenerator::new(config.license.key_length)),
        RegistryOptions {
            validity_days: config.license.default_validity_days,
            key_generation_attempts: config.license.key_generation_attempts,
        },
    );

    Ok(AppState {
        registry,
        api_key: ApiKeyAuth::new(&config.auth.api_key),
        request_timeout: Duration::from_secs(config.http_server.timeout_secs),
    })
}

/// axumサーバーを起動し、`shutdown` が完了するまで待機する
pub async fn serve<F>(
    state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = crate::api::create_app(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(ServerError::Serve)?;

    info!("Server shutdown complete");
    Ok(())
}

/// 設定に従ってサーバーを起動し、シャットダウンシグナルを待機する
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let state = build_state(&config).await?;

    let address = config.http_server.address.clone();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;

    info!("License manager listening on {}", address);

    serve(state, listener, shutdown_signal()).await
}

/// シャットダウンシグナル（Ctrl+C / SIGTERM）を待機
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

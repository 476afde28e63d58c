//! E2Eテスト用のサーバー起動ユーティリティ

use std::net::SocketAddr;

use license_manager_common::config::ServerConfig;
use license_manager_server::server::{self, ServerError};
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

/// テストで使う管理APIキー
pub const ADMIN_KEY: &str = "e2e-admin-key";

/// 実ポートにバインドしたテストサーバー
#[allow(dead_code)]
pub struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
    // DBファイルはサーバー停止まで保持する
    _storage: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// サーバーがバインドしているアドレスを返す
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// ベースURL
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// サーバーを停止し、バックグラウンドタスクの終了を待つ
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// 一時ディレクトリのSQLiteを使ってサーバーを起動する
pub async fn spawn_server() -> TestServer {
    let storage = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.storage_path = storage
        .path()
        .join("licenses.db")
        .display()
        .to_string();
    config.auth.api_key = ADMIN_KEY.to_string();

    let state = server::build_state(&config).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(server::serve(state, listener, async {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        shutdown: Some(tx),
        handle,
        _storage: storage,
    }
}

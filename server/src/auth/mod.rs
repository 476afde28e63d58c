//! 認証
//!
//! 管理APIは共有シークレット（`X-API-Key` ヘッダー）で保護する。
//! 設定値は起動時にSHA-256ダイジェストへ変換して保持し、平文は残さない。

/// 認証ミドルウェア
pub mod middleware;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use license_manager_common::types::Actor;
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// APIキーを運ぶヘッダー名
pub const API_KEY_HEADER: &str = "X-API-Key";

/// 設定されたAPIキーの検証器
#[derive(Clone)]
pub struct ApiKeyAuth {
    digest: [u8; 32],
}

impl ApiKeyAuth {
    /// 設定値からダイジェストを作成
    pub fn new(api_key: &str) -> Self {
        Self {
            digest: sha256(api_key),
        }
    }

    /// 提示されたキーが一致するか
    pub fn verify(&self, presented: &str) -> bool {
        let presented = sha256(presented);
        // 固定長ダイジェストを全バイト比較する
        presented
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth").finish_non_exhaustive()
    }
}

fn sha256(input: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.finalize().into()
}

/// 接続元IPアドレス（`ConnectInfo` がない場合は `None`）
pub fn client_ip(parts: &Parts) -> Option<IpAddr> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// リクエストの操作者
///
/// APIキー認証を通過したリクエストではミドルウェアが設定した `Actor::api_key`、
/// 公開ルートでは接続元IP付きの `Actor::anonymous` になる。
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(Self(actor.clone()));
        }
        Ok(Self(Actor::anonymous(client_ip(parts))))
    }
}

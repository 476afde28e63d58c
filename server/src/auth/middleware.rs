//! APIキー認証ミドルウェア

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use license_manager_common::protocol::ErrorResponse;
use license_manager_common::types::Actor;
use std::net::SocketAddr;

use super::{ApiKeyAuth, API_KEY_HEADER};

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Unauthorized".to_string(),
            details: None,
        }),
    )
        .into_response()
}

/// APIキー認証ミドルウェア
///
/// `X-API-Key` ヘッダーの値をSHA-256ダイジェストで設定値と比較する。
///
/// # Arguments
/// * `State(auth)` - 設定されたAPIキーの検証器
/// * `request` - HTTPリクエスト
/// * `next` - 次のミドルウェア/ハンドラー
///
/// # Returns
/// * `Ok(Response)` - 認証成功、requestに `Actor::api_key` を追加
/// * `Err(Response)` - 認証失敗、401 Unauthorized
pub async fn api_key_auth_middleware(
    State(auth): State<ApiKeyAuth>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(key) if auth.verify(key) => {}
        Some(_) => {
            tracing::warn!(
                path = %request.uri().path(),
                client_ip = ?client_ip,
                "Rejected request with invalid API key"
            );
            return Err(unauthorized());
        }
        None => {
            tracing::warn!(
                path = %request.uri().path(),
                client_ip = ?client_ip,
                "Rejected request without API key"
            );
            return Err(unauthorized());
        }
    }

    request.extensions_mut().insert(Actor::api_key(client_ip));
    Ok(next.run(request).await)
}

//! APIエラーレスポンスとリクエスト抽出器
//!
//! `LicenseError` を `{error, details?}` 形式のレスポンスに変換する。
//! ストアエラーの原因はログのみに出力し、レスポンスには含めない。

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use license_manager_common::error::LicenseError;
use license_manager_common::protocol::ErrorResponse;
use serde::de::DeserializeOwned;

/// APIエラー
#[derive(Debug)]
pub struct AppError(pub LicenseError);

impl From<LicenseError> for AppError {
    fn from(err: LicenseError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.0.error_code(), error = %self.0, "Request failed");
        } else {
            tracing::warn!(code = self.0.error_code(), error = %self.0, "Request rejected");
        }

        let payload = ErrorResponse {
            error: self.0.external_message().to_string(),
            details: self.0.external_details(),
        };
        (status, Json(payload)).into_response()
    }
}

/// `TimeoutLayer` が返す空の 408 を `{error}` 形式に置き換える
pub async fn timeout_response(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }

    tracing::warn!("Request timed out");
    let payload = ErrorResponse {
        error: "Request timed out".to_string(),
        details: None,
    };
    (StatusCode::REQUEST_TIMEOUT, Json(payload)).into_response()
}

/// JSONボディ抽出器（デシリアライズ失敗は 400 "Invalid input data"）
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError(LicenseError::InvalidArgument(
                rejection.body_text(),
            ))),
        }
    }
}

/// クエリ文字列抽出器（パース失敗は 400 "Invalid input data"）
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError(LicenseError::InvalidArgument(
                rejection.body_text(),
            ))),
        }
    }
}

//! REST APIハンドラー
//!
//! 公開ルート（ping・検証・バインド）とAPIキーで保護された管理ルート

pub mod audit_log;
pub mod error;
pub mod licenses;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Json, Router,
};
use license_manager_common::protocol::OkResponse;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;
use uuid::Uuid;

use crate::auth::middleware::api_key_auth_middleware;
use crate::AppState;

/// リクエストIDヘッダー
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// UUID v4 のリクエストIDを払い出す
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// GET /ping
pub async fn ping() -> Json<OkResponse<()>> {
    Json(OkResponse::message("pong"))
}

/// アプリケーションルーターを作成
pub fn create_app(state: AppState) -> Router {
    let public = Router::new()
        .route("/ping", get(ping))
        .route("/validate-license", post(licenses::validate_license))
        .route("/bind-license", post(licenses::bind_license))
        .route("/unbind-license", post(licenses::unbind_license));

    let protected = Router::new()
        .route("/get", get(licenses::get_license))
        .route("/all-licenses", get(licenses::all_licenses))
        .route("/add-license", post(licenses::add_license))
        .route("/del-license", post(licenses::delete_license))
        .route("/freeze-license", post(licenses::freeze_license))
        .route("/unfreeze-license", post(licenses::unfreeze_license))
        .route("/renew-license", post(licenses::renew_license))
        .route(
            "/transaction-logs",
            get(audit_log::list_transaction_logs),
        )
        .route_layer(middleware::from_fn_with_state(
            state.api_key.clone(),
            api_key_auth_middleware,
        ));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<Body>| {
                            let request_id = request
                                .headers()
                                .get(REQUEST_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("-");
                            let client_ip = request
                                .extensions()
                                .get::<ConnectInfo<SocketAddr>>()
                                .map(|ConnectInfo(addr)| addr.ip().to_string())
                                .unwrap_or_else(|| "-".to_string());
                            tracing::info_span!(
                                "http_request",
                                request_id = %request_id,
                                client_ip = %client_ip,
                                method = %request.method(),
                                path = %request.uri().path(),
                            )
                        })
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(middleware::map_response(error::timeout_response))
                .layer(TimeoutLayer::new(state.request_timeout)),
        )
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::Body,
        http::{Request, Response},
        Router,
    };
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::auth::ApiKeyAuth;
    use crate::db::{licenses::SqliteLicenseRepository, test_utils::test_db_pool};
    use crate::registry::LicenseRegistry;
    use crate::AppState;

    pub const TEST_API_KEY: &str = "test-admin-key";

    pub async fn test_app() -> Router {
        let pool = test_db_pool().await;
        let state = AppState {
            registry: LicenseRegistry::with_defaults(Arc::new(SqliteLicenseRepository::new(pool))),
            api_key: ApiKeyAuth::new(TEST_API_KEY),
            request_timeout: Duration::from_secs(5),
        };
        super::create_app(state)
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        api_key: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = api_key {
            builder = builder.header("X-API-Key", key);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    pub async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}

//! ライセンスAPIハンドラー
//!
//! 公開: `/validate-license`, `/bind-license`, `/unbind-license`
//! 保護: `/add-license`, `/del-license`, `/freeze-license`, `/unfreeze-license`,
//! `/renew-license`, `/get`, `/all-licenses`

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use license_manager_common::error::LicenseError;
use license_manager_common::protocol::{
    DeletedLicense, IssuedLicense, LicenseHwidRequest, LicenseQuery, OkResponse, RenewRequest,
    UserIdRequest,
};
use license_manager_common::types::LicenseRecord;

use super::error::{ApiJson, ApiQuery, AppError};
use crate::auth::RequestActor;
use crate::AppState;

/// POST /add-license - ライセンス発行
pub async fn add_license(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    ApiJson(req): ApiJson<UserIdRequest>,
) -> Result<Json<OkResponse<IssuedLicense>>, AppError> {
    let record = state.registry.issue(&req.user_id, &actor).await?;
    Ok(Json(OkResponse::with_data(
        "License added!",
        IssuedLicense::from(&record),
    )))
}

/// POST /validate-license - ライセンス検証（未バインドなら初回HWIDをバインド）
pub async fn validate_license(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    ApiJson(req): ApiJson<LicenseHwidRequest>,
) -> Result<Json<OkResponse<LicenseRecord>>, AppError> {
    let record = state
        .registry
        .validate(&req.license, &req.hwid, &actor)
        .await?;
    Ok(Json(OkResponse::with_data("license is valid!", record)))
}

/// POST /bind-license - HWIDを上書きバインド
pub async fn bind_license(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    ApiJson(req): ApiJson<LicenseHwidRequest>,
) -> Result<Json<OkResponse<()>>, AppError> {
    state.registry.bind(&req.license, &req.hwid, &actor).await?;
    Ok(Json(OkResponse::message("License bound successfully")))
}

/// POST /unbind-license - HWIDバインド解除
pub async fn unbind_license(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    ApiJson(req): ApiJson<LicenseHwidRequest>,
) -> Result<Json<OkResponse<()>>, AppError> {
    state.registry.unbind(&req.license, &actor).await?;
    Ok(Json(OkResponse::message("License unbound successfully")))
}

/// POST /freeze-license
pub async fn freeze_license(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    ApiJson(req): ApiJson<UserIdRequest>,
) -> Result<Json<OkResponse<()>>, AppError> {
    state.registry.freeze(&req.user_id, &actor).await?;
    Ok(Json(OkResponse::message("License frozen successfully")))
}

/// POST /unfreeze-license
pub async fn unfreeze_license(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    ApiJson(req): ApiJson<UserIdRequest>,
) -> Result<Json<OkResponse<()>>, AppError> {
    state.registry.unfreeze(&req.user_id, &actor).await?;
    Ok(Json(OkResponse::message("License unfrozen successfully")))
}

/// POST /renew-license - 有効期限を現在時刻 + days に設定
pub async fn renew_license(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    ApiJson(req): ApiJson<RenewRequest>,
) -> Result<Json<OkResponse<DateTime<Utc>>>, AppError> {
    let expires_at = state
        .registry
        .renew(&req.user_id, req.days, &actor)
        .await?;
    Ok(Json(OkResponse::with_data(
        "License renewed successfully",
        expires_at,
    )))
}

/// POST /del-license
pub async fn delete_license(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    ApiJson(req): ApiJson<UserIdRequest>,
) -> Result<Json<OkResponse<DeletedLicense>>, AppError> {
    state.registry.delete(&req.user_id, &actor).await?;
    Ok(Json(OkResponse::with_data(
        "License deleted successfully",
        DeletedLicense {
            user_id: req.user_id,
        },
    )))
}

/// GET /get?UserId=|License= - UserIdを優先して検索
pub async fn get_license(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LicenseQuery>,
) -> Result<Json<OkResponse<LicenseRecord>>, AppError> {
    let user_id = query.user_id.filter(|v| !v.is_empty());
    let license = query.license.filter(|v| !v.is_empty());

    let record = match (user_id, license) {
        (Some(user_id), _) => state.registry.get_by_owner(&user_id).await?,
        (None, Some(license)) => state.registry.get_by_key(&license).await?,
        (None, None) => {
            return Err(AppError(LicenseError::InvalidArgument(
                "either UserId or License parameter is required".to_string(),
            )))
        }
    };
    Ok(Json(OkResponse::with_data("License received", record)))
}

/// GET /all-licenses
pub async fn all_licenses(
    State(state): State<AppState>,
) -> Result<Json<OkResponse<Vec<LicenseRecord>>>, AppError> {
    let licenses: Vec<_> = state.registry.list_all().await?.collect();
    Ok(Json(OkResponse::with_data("Licenses received", licenses)))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{read_json, send, test_app, TEST_API_KEY};
    use axum::http::StatusCode;
    use license_manager_common::protocol::{ErrorResponse, IssuedLicense, OkResponse};
    use license_manager_common::types::{LicenseRecord, LicenseStatus};
    use serde_json::json;

    async fn issue(app: &axum::Router, user_id: &str) -> IssuedLicense {
        let response = send(
            app,
            "POST",
            "/add-license",
            Some(TEST_API_KEY),
            Some(json!({ "user_id": user_id })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: OkResponse<IssuedLicense> = read_json(response).await;
        assert_eq!(body.message, "License added!");
        body.data.unwrap()
    }

    #[tokio::test]
    async fn test_add_license() {
        let app = test_app().await;
        let issued = issue(&app, "u1").await;

        assert_eq!(issued.user_id, "u1");
        assert_eq!(issued.license.len(), 10);
        assert_eq!(issued.status, LicenseStatus::Active);
        assert_eq!(issued.hwid, "");
    }

    #[tokio::test]
    async fn test_add_license_requires_api_key() {
        let app = test_app().await;
        let response = send(
            &app,
            "POST",
            "/add-license",
            None,
            Some(json!({ "user_id": "u1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_add_license_duplicate_owner_is_conflict() {
        let app = test_app().await;
        issue(&app, "u1").await;

        let response = send(
            &app,
            "POST",
            "/add-license",
            Some(TEST_API_KEY),
            Some(json!({ "user_id": "u1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invalid_body_is_bad_request() {
        let app = test_app().await;
        let response = send(
            &app,
            "POST",
            "/add-license",
            Some(TEST_API_KEY),
            Some(json!({ "username": "u1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = read_json(response).await;
        assert_eq!(body.error, "Invalid input data");
        assert!(body.details.is_some());
    }

    #[tokio::test]
    async fn test_validate_flow() {
        let app = test_app().await;
        let issued = issue(&app, "u1").await;

        let response = send(
            &app,
            "POST",
            "/validate-license",
            None,
            Some(json!({ "license": issued.license, "hwid": "HW1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: OkResponse<LicenseRecord> = read_json(response).await;
        assert_eq!(body.message, "license is valid!");
        assert_eq!(body.data.unwrap().hwid.as_deref(), Some("HW1"));

        let response = send(
            &app,
            "POST",
            "/validate-license",
            None,
            Some(json!({ "license": issued.license, "hwid": "HW2" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: ErrorResponse = read_json(response).await;
        assert_eq!(body.error, "HWID does not match");
    }

    #[tokio::test]
    async fn test_validate_unknown_license_is_not_found() {
        let app = test_app().await;
        let response = send(
            &app,
            "POST",
            "/validate-license",
            None,
            Some(json!({ "license": "NOPE", "hwid": "HW1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_and_unbind_are_public() {
        let app = test_app().await;
        let issued = issue(&app, "u1").await;

        let response = send(
            &app,
            "POST",
            "/bind-license",
            None,
            Some(json!({ "license": issued.license, "hwid": "HW9" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: OkResponse<()> = read_json(response).await;
        assert_eq!(body.message, "License bound successfully");

        let response = send(
            &app,
            "POST",
            "/unbind-license",
            None,
            Some(json!({ "license": issued.license })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            "GET",
            &format!("/get?License={}", issued.license),
            Some(TEST_API_KEY),
            None,
        )
        .await;
        let body: OkResponse<LicenseRecord> = read_json(response).await;
        assert!(body.data.unwrap().hwid.is_none());
    }

    #[tokio::test]
    async fn test_freeze_blocks_validation() {
        let app = test_app().await;
        let issued = issue(&app, "u1").await;

        let response = send(
            &app,
            "POST",
            "/freeze-license",
            Some(TEST_API_KEY),
            Some(json!({ "user_id": "u1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            "POST",
            "/validate-license",
            None,
            Some(json!({ "license": issued.license, "hwid": "HW1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: ErrorResponse = read_json(response).await;
        assert_eq!(body.error, "license is not active");

        let response = send(
            &app,
            "POST",
            "/unfreeze-license",
            Some(TEST_API_KEY),
            Some(json!({ "user_id": "u1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            "POST",
            "/validate-license",
            None,
            Some(json!({ "license": issued.license, "hwid": "HW1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_renew_rejects_non_positive_days() {
        let app = test_app().await;
        issue(&app, "u1").await;

        let response = send(
            &app,
            "POST",
            "/renew-license",
            Some(TEST_API_KEY),
            Some(json!({ "user_id": "u1", "days": 0 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            "POST",
            "/renew-license",
            Some(TEST_API_KEY),
            Some(json!({ "user_id": "u1", "days": 10 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: OkResponse<chrono::DateTime<chrono::Utc>> = read_json(response).await;
        assert_eq!(body.message, "License renewed successfully");
        assert!(body.data.is_some());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let app = test_app().await;
        issue(&app, "u1").await;

        let response = send(
            &app,
            "POST",
            "/del-license",
            Some(TEST_API_KEY),
            Some(json!({ "user_id": "u1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = read_json(response).await;
        assert_eq!(body["data"]["UserId"], "u1");

        let response = send(
            &app,
            "POST",
            "/del-license",
            Some(TEST_API_KEY),
            Some(json!({ "user_id": "u1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_requires_a_parameter() {
        let app = test_app().await;
        let response = send(&app, "GET", "/get", Some(TEST_API_KEY), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_prefers_user_id() {
        let app = test_app().await;
        let first = issue(&app, "u1").await;
        let second = issue(&app, "u2").await;

        let response = send(
            &app,
            "GET",
            &format!("/get?UserId=u1&License={}", second.license),
            Some(TEST_API_KEY),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: OkResponse<LicenseRecord> = read_json(response).await;
        assert_eq!(body.data.unwrap().key, first.license);
    }

    #[tokio::test]
    async fn test_all_licenses_in_insertion_order() {
        let app = test_app().await;
        issue(&app, "b").await;
        issue(&app, "a").await;

        let response = send(&app, "GET", "/all-licenses", Some(TEST_API_KEY), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: OkResponse<Vec<LicenseRecord>> = read_json(response).await;
        assert_eq!(body.message, "Licenses received");
        let owners: Vec<_> = body
            .data
            .unwrap()
            .into_iter()
            .map(|r| r.owner_id)
            .collect();
        assert_eq!(owners, vec!["b", "a"]);
    }
}

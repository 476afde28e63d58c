//! 監査ログAPIハンドラー
//!
//! `GET /transaction-logs?limit=N`（保護ルート）

use axum::{extract::State, Json};
use license_manager_common::protocol::{AuditLogQuery, OkResponse};
use license_manager_common::types::AuditEntry;

use super::error::{ApiQuery, AppError};
use crate::AppState;

/// `limit` 省略時の取得件数
pub const DEFAULT_AUDIT_LIMIT: i64 = 100;

/// GET /transaction-logs - 新しい順に監査ログを返す
pub async fn list_transaction_logs(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> Result<Json<OkResponse<Vec<AuditEntry>>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let entries = state.registry.audit_log(limit).await?;
    Ok(Json(OkResponse::with_data(
        "Transaction logs received",
        entries,
    )))
}

//! 通信プロトコル定義
//!
//! 管理クライアント/ライセンスクライアント↔サーバー間のHTTPメッセージ

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LicenseRecord, LicenseStatus};

/// ライセンス発行リクエスト（POST /add-license）
///
/// del/freeze/unfreeze も同じ形を使う。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserIdRequest {
    /// ユーザーID
    pub user_id: String,
}

/// ライセンス更新リクエスト（POST /renew-license）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenewRequest {
    /// ユーザーID
    pub user_id: String,
    /// 現在時刻からの有効日数
    pub days: i64,
}

/// ライセンス検証/バインドリクエスト
/// （POST /validate-license, /bind-license, /unbind-license）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LicenseHwidRequest {
    /// ライセンスキー
    pub license: String,
    /// HWID（unbind時は省略可）
    #[serde(default)]
    pub hwid: String,
}

/// ライセンス検索クエリ（GET /get）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LicenseQuery {
    /// ユーザーIDで検索（優先）
    #[serde(rename = "UserId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// ライセンスキーで検索
    #[serde(rename = "License", default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// 監査ログ取得クエリ（GET /transaction-logs）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditLogQuery {
    /// 取得件数（デフォルト: 100）
    #[serde(default)]
    pub limit: Option<i64>,
}

/// ライセンス発行結果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssuedLicense {
    /// ユーザーID
    pub user_id: String,
    /// ライセンスキー
    pub license: String,
    /// 状態
    pub status: LicenseStatus,
    /// HWID（発行直後は空文字列）
    pub hwid: String,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
}

impl From<&LicenseRecord> for IssuedLicense {
    fn from(record: &LicenseRecord) -> Self {
        Self {
            user_id: record.owner_id.clone(),
            license: record.key.clone(),
            status: record.status,
            hwid: record.hwid.clone().unwrap_or_default(),
            expires_at: record.expires_at,
        }
    }
}

/// ライセンス削除結果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeletedLicense {
    /// 削除したユーザーID
    #[serde(rename = "UserId")]
    pub user_id: String,
}

/// 成功レスポンス `{message, data?}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OkResponse<T> {
    /// メッセージ
    pub message: String,
    /// ペイロード
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> OkResponse<T> {
    /// ペイロード付きレスポンス
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

impl OkResponse<()> {
    /// メッセージのみのレスポンス
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }
}

/// エラーレスポンス `{error, details?}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// 短いエラーメッセージ
    pub error: String,
    /// 詳細
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

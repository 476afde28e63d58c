//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `LicenseError`は`external_message()`と`status_code()`を提供し、
//! HTTPレイヤーが `{error, details}` 形式のレスポンスを生成できるようにする。

use http::StatusCode;
use thiserror::Error;

/// ライセンスレジストリのエラー型
#[derive(Debug, Error)]
pub enum LicenseError {
    /// 該当レコードなし
    #[error("No license found for {0}")]
    NotFound(String),

    /// ユーザーIDが重複
    #[error("License already exists for user_id: {0}")]
    DuplicateOwner(String),

    /// ライセンスキーが重複
    #[error("License key already exists: {0}")]
    DuplicateKey(String),

    /// 別のHWIDにバインド済み
    #[error("HWID does not match license {0}")]
    HwidMismatch(String),

    /// 凍結中
    #[error("License {0} is not active")]
    Inactive(String),

    /// 期限切れ
    #[error("License {0} has expired")]
    Expired(String),

    /// 不正な引数
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// キー生成のリトライ上限到達
    #[error("Failed to generate a unique license key after {0} attempts")]
    KeyGenerationExhausted(u32),

    /// ストア（トランザクション/接続）エラー
    #[error("{operation}: {message}")]
    StoreFailure {
        /// 失敗した操作名
        operation: &'static str,
        /// 原因
        message: String,
    },
}

/// レジストリ操作の結果型
pub type LicenseResult<T> = Result<T, LicenseError>;

impl LicenseError {
    /// 外部クライアント向けの短いメッセージ
    pub fn external_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "license not found",
            Self::DuplicateOwner(_) => "license already exists for user",
            Self::DuplicateKey(_) => "license key already exists",
            Self::HwidMismatch(_) => "HWID does not match",
            Self::Inactive(_) => "license is not active",
            Self::Expired(_) => "license has expired",
            Self::InvalidArgument(_) => "Invalid input data",
            Self::KeyGenerationExhausted(_) => "failed to generate license key",
            Self::StoreFailure { .. } => "internal storage error",
        }
    }

    /// 機械可読なエラーコード
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::DuplicateOwner(_) => "duplicate_owner",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::HwidMismatch(_) => "hwid_mismatch",
            Self::Inactive(_) => "inactive",
            Self::Expired(_) => "expired",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::KeyGenerationExhausted(_) => "key_generation_exhausted",
            Self::StoreFailure { .. } => "store_failure",
        }
    }

    /// HTTPステータスコード
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateOwner(_) | Self::DuplicateKey(_) => StatusCode::CONFLICT,
            Self::HwidMismatch(_) | Self::Inactive(_) | Self::Expired(_) => StatusCode::FORBIDDEN,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::KeyGenerationExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::StoreFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// レスポンスの `details` に含めてよい詳細文
    ///
    /// ストアエラーの原因は外部に出さない（サーバーログのみ）。
    pub fn external_details(&self) -> Option<String> {
        match self {
            Self::StoreFailure { .. } => None,
            other => Some(other.to_string()),
        }
    }
}

/// 設定読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// ファイル読み込み失敗
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// ファイルパス
        path: String,
        /// 原因
        #[source]
        source: std::io::Error,
    },

    /// YAMLパース失敗
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// ファイルパス
        path: String,
        /// 原因
        #[source]
        source: serde_yaml::Error,
    },

    /// 値の検証失敗
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

//! 設定管理
//!
//! ServerConfig等の設定構造体（YAMLファイルから読み込む）

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// サーバー設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// SQLiteデータベースファイルのパス (デフォルト: "storage/licenses.db")
    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    /// HTTPサーバー設定
    #[serde(default)]
    pub http_server: HttpServerConfig,

    /// 認証設定
    #[serde(default, alias = "auth_data")]
    pub auth: AuthConfig,

    /// ライセンス発行ポリシー
    #[serde(default)]
    pub license: LicensePolicyConfig,

    /// ログ設定
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTPサーバー設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpServerConfig {
    /// バインドアドレス (デフォルト: "localhost:8080")
    #[serde(default = "default_address")]
    pub address: String,

    /// リクエストタイムアウト（秒）(デフォルト: 4)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// 認証設定
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// 管理APIの共有シークレット
    #[serde(default)]
    pub api_key: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// ライセンス発行ポリシー
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LicensePolicyConfig {
    /// 発行時の有効日数 (デフォルト: 30)
    #[serde(default = "default_validity_days")]
    pub default_validity_days: i64,

    /// ライセンスキー長 (デフォルト: 10)
    #[serde(default = "default_key_length")]
    pub key_length: usize,

    /// キー衝突時の最大試行回数 (デフォルト: 5)
    #[serde(default = "default_key_generation_attempts")]
    pub key_generation_attempts: u32,
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// ログファイル出力ディレクトリ (デフォルト: "logs")
    #[serde(default = "default_log_dir")]
    pub dir: String,

    /// デフォルトのログレベル（RUST_LOG未設定時）(デフォルト: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON形式で出力するか (デフォルト: false)
    #[serde(default)]
    pub json: bool,
}

fn default_storage_path() -> String {
    "storage/licenses.db".to_string()
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_timeout() -> u64 {
    4
}

fn default_validity_days() -> i64 {
    30
}

fn default_key_length() -> usize {
    10
}

fn default_key_generation_attempts() -> u32 {
    5
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for LicensePolicyConfig {
    fn default() -> Self {
        Self {
            default_validity_days: default_validity_days(),
            key_length: default_key_length(),
            key_generation_attempts: default_key_generation_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            http_server: HttpServerConfig::default(),
            auth: AuthConfig::default(),
            license: LicensePolicyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// YAML文字列から読み込む
    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// YAMLファイルから読み込む
    ///
    /// ファイルが存在しない場合はデフォルト設定を返す。
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml_str(&contents, &display),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: display,
                source,
            }),
        }
    }

    /// SQLite接続URL
    pub fn database_url(&self) -> String {
        if self.storage_path.starts_with("sqlite:") {
            self.storage_path.clone()
        } else {
            format!("sqlite://{}", self.storage_path)
        }
    }

    /// 起動前の値検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.api_key (or LICENSE_MANAGER_API_KEY) must be set".to_string(),
            ));
        }
        if self.storage_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage_path must not be empty".to_string(),
            ));
        }
        if self.license.default_validity_days <= 0 {
            return Err(ConfigError::Invalid(
                "license.default_validity_days must be positive".to_string(),
            ));
        }
        if self.license.key_length == 0 {
            return Err(ConfigError::Invalid(
                "license.key_length must be positive".to_string(),
            ));
        }
        if self.license.key_generation_attempts == 0 {
            return Err(ConfigError::Invalid(
                "license.key_generation_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

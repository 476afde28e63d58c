//! 共通型定義
//!
//! LicenseRecord, AuditEntry等のコアデータ型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// ライセンス状態
///
/// 期限切れは保存される状態ではなく `expires_at` から導出される。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// 有効
    Active,
    /// 凍結中
    Frozen,
}

impl LicenseStatus {
    /// DB保存用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Frozen => "frozen",
        }
    }

    /// DBの文字列から変換（未知の値は `None`）
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "frozen" => Some(Self::Frozen),
            _ => None,
        }
    }
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ライセンスレコード
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LicenseRecord {
    /// ストアが割り当てる一意識別子
    pub id: i64,
    /// ライセンスキー（一意・作成後不変）
    #[serde(rename = "license")]
    pub key: String,
    /// 所有ユーザーID（一意）
    #[serde(rename = "user_id")]
    pub owner_id: String,
    /// 状態
    pub status: LicenseStatus,
    /// バインド済みHWID（初回検証まで `None`）
    pub hwid: Option<String>,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 更新日時
    pub updated_at: DateTime<Utc>,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
}

impl LicenseRecord {
    /// 指定時刻において期限切れか（`now > expires_at`）
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// バインド済みのHWID（空文字列は未バインド扱い）
    pub fn bound_hwid(&self) -> Option<&str> {
        self.hwid.as_deref().filter(|h| !h.is_empty())
    }
}

/// アクター種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// APIキー認証済みの管理者
    ApiKey,
    /// 未認証クライアント（公開ルート）
    Anonymous,
    /// サーバー内部処理
    System,
}

impl ActorType {
    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Anonymous => "anonymous",
            Self::System => "system",
        }
    }
}

/// 操作を行ったアクター（監査ログに記録される）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// アクター種別
    pub actor_type: ActorType,
    /// クライアントIPアドレス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl Actor {
    /// サーバー内部処理
    pub fn system() -> Self {
        Self {
            actor_type: ActorType::System,
            client_ip: None,
        }
    }

    /// APIキー認証済みアクター
    pub fn api_key(client_ip: Option<IpAddr>) -> Self {
        Self {
            actor_type: ActorType::ApiKey,
            client_ip,
        }
    }

    /// 未認証アクター
    pub fn anonymous(client_ip: Option<IpAddr>) -> Self {
        Self {
            actor_type: ActorType::Anonymous,
            client_ip,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.client_ip {
            Some(ip) => write!(f, "{}@{}", self.actor_type.as_str(), ip),
            None => write!(f, "{}", self.actor_type.as_str()),
        }
    }
}

/// 監査対象アクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// ライセンス発行
    AddLicense,
    /// 検証時の初回HWIDバインド
    ValidateBind,
    /// 管理者によるHWIDバインド
    BindHwid,
    /// HWIDバインド解除
    UnbindHwid,
    /// 凍結
    FreezeLicense,
    /// 凍結解除
    UnfreezeLicense,
    /// 期限更新
    RenewLicense,
    /// 削除
    DeleteLicense,
}

impl AuditAction {
    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddLicense => "add_license",
            Self::ValidateBind => "validate_bind",
            Self::BindHwid => "bind_hwid",
            Self::UnbindHwid => "unbind_hwid",
            Self::FreezeLicense => "freeze_license",
            Self::UnfreezeLicense => "unfreeze_license",
            Self::RenewLicense => "renew_license",
            Self::DeleteLicense => "delete_license",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 書き込み前の監査ログエントリ
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    /// アクション
    pub action: AuditAction,
    /// アクター
    pub actor: Actor,
    /// 対象ライセンスキー
    pub license_key: Option<String>,
    /// 対象ユーザーID
    pub owner_id: Option<String>,
    /// 追加情報（`key=value` 形式）
    pub detail: Option<String>,
}

impl NewAuditEntry {
    /// 新しいエントリを作成
    pub fn new(action: AuditAction, actor: &Actor) -> Self {
        Self {
            action,
            actor: actor.clone(),
            license_key: None,
            owner_id: None,
            detail: None,
        }
    }

    /// 対象ライセンスキーを設定
    pub fn license(mut self, key: impl Into<String>) -> Self {
        self.license_key = Some(key.into());
        self
    }

    /// 対象ユーザーIDを設定
    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// 追加情報を設定
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 人が読める説明文（`action=... license=... user_id=...`）
    pub fn description(&self) -> String {
        let mut parts = vec![format!("action={}", self.action)];
        if let Some(key) = &self.license_key {
            parts.push(format!("license={}", key));
        }
        if let Some(owner) = &self.owner_id {
            parts.push(format!("user_id={}", owner));
        }
        if let Some(detail) = &self.detail {
            parts.push(detail.clone());
        }
        parts.push(format!("actor={}", self.actor));
        parts.join(" ")
    }
}

/// 永続化済みの監査ログエントリ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// 連番ID（単調増加）
    pub id: i64,
    /// 書き込み時刻
    pub timestamp: DateTime<Utc>,
    /// アクション
    pub action: String,
    /// アクター
    pub actor: String,
    /// 対象ライセンスキー
    pub license: Option<String>,
    /// 対象ユーザーID
    pub user_id: Option<String>,
    /// 説明文
    pub description: String,
}

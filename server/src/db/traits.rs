//! Repository traitパターン定義
//!
//! ライセンスストアを抽象化し、レジストリがSQLite実装に直接依存しないようにする。
//! 状態変更は必ず `LicenseTransaction` 経由で行い、監査ログ追記と同一トランザクションで
//! コミットする。コミットせずにドロップされたトランザクションはロールバックされる。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use license_manager_common::types::{AuditEntry, LicenseRecord, LicenseStatus, NewAuditEntry};
use thiserror::Error;

/// 一意制約の対象カラム
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// ライセンスキー
    Key,
    /// ユーザーID
    Owner,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key => write!(f, "license"),
            Self::Owner => write!(f, "UserId"),
        }
    }
}

/// Repository層のエラー型
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// 一意制約違反
    #[error("unique constraint violated on {0}")]
    UniqueViolation(UniqueField),

    /// DBエラー（接続・トランザクション・SQL）
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 保存済みの値が解釈できない
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Repository層の結果型
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 新規ライセンス（id は挿入時にストアが割り当てる）
#[derive(Debug, Clone, PartialEq)]
pub struct NewLicense {
    /// ライセンスキー
    pub key: String,
    /// ユーザーID
    pub owner_id: String,
    /// 状態
    pub status: LicenseStatus,
    /// HWID
    pub hwid: Option<String>,
    /// 作成日時（updated_at にも使う）
    pub created_at: DateTime<Utc>,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
}

/// 更新対象の指定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseSelector<'a> {
    /// ライセンスキーで指定
    Key(&'a str),
    /// ユーザーIDで指定
    Owner(&'a str),
}

/// 部分更新（`None` のフィールドは変更しない）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LicenseChanges {
    /// 状態
    pub status: Option<LicenseStatus>,
    /// HWID（`Some(None)` でNULLに戻す）
    pub hwid: Option<Option<String>>,
    /// 有効期限
    pub expires_at: Option<DateTime<Utc>>,
}

/// ライセンスストアのRepository trait（読み取り + トランザクション開始）
#[async_trait]
pub trait LicenseRepository: Send + Sync {
    /// ライセンスキーで検索
    async fn find_by_key(&self, key: &str) -> RepositoryResult<Option<LicenseRecord>>;
    /// ユーザーIDで検索
    async fn find_by_owner(&self, owner_id: &str) -> RepositoryResult<Option<LicenseRecord>>;
    /// 全件を挿入順で取得
    async fn list_all(&self) -> RepositoryResult<Vec<LicenseRecord>>;
    /// 監査ログを新しい順で取得
    async fn recent_audit(&self, limit: i64) -> RepositoryResult<Vec<AuditEntry>>;
    /// 書き込みトランザクションを開始
    async fn begin(&self) -> RepositoryResult<Box<dyn LicenseTransaction>>;
}

/// 単一トランザクション内の書き込み操作
#[async_trait]
pub trait LicenseTransaction: Send {
    /// ライセンスを挿入し、割り当てられたIDを返す
    ///
    /// キー/ユーザーIDの重複は `RepositoryError::UniqueViolation`。
    async fn insert(&mut self, license: &NewLicense) -> RepositoryResult<i64>;

    /// 有効かつ未バインドの場合のみHWIDを書き込む（compare-and-bind）
    ///
    /// 対象行を更新した場合 `true`。キーが存在しない、既にバインド済み、
    /// 凍結済み、または `now` 時点で期限切れなら `false`。
    async fn conditional_update_hwid(
        &mut self,
        key: &str,
        hwid: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// 部分更新し、影響行数を返す
    async fn update(
        &mut self,
        selector: LicenseSelector<'_>,
        changes: &LicenseChanges,
        now: DateTime<Utc>,
    ) -> RepositoryResult<u64>;

    /// ユーザーIDで削除し、影響行数を返す
    async fn delete(&mut self, owner_id: &str) -> RepositoryResult<u64>;

    /// 監査ログを追記
    async fn append_audit(
        &mut self,
        entry: &NewAuditEntry,
        now: DateTime<Utc>,
    ) -> RepositoryResult<i64>;

    /// コミット
    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}

//! ライセンスレジストリ
//!
//! ライセンスのライフサイクル（発行・検証・凍結・更新・削除）とHWIDバインドの
//! 状態遷移ルールを強制する。永続化は `LicenseRepository` に委譲し、
//! 状態変更と監査ログ追記は常に同一トランザクションでコミットする。

pub mod keygen;

use chrono::{DateTime, Duration, Utc};
use license_manager_common::error::{LicenseError, LicenseResult};
use license_manager_common::types::{
    Actor, AuditAction, AuditEntry, LicenseRecord, LicenseStatus, NewAuditEntry,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::traits::{
    LicenseChanges, LicenseRepository, LicenseSelector, LicenseTransaction, NewLicense,
    RepositoryError, UniqueField,
};
use keygen::{KeyGenerator, RandomKeyGenerator};

/// デフォルトの有効期間（日）
pub const DEFAULT_VALIDITY_DAYS: i64 = 30;

/// デフォルトのキー生成試行回数
pub const DEFAULT_KEY_GENERATION_ATTEMPTS: u32 = 5;

/// 監査ログ取得件数の上限
pub const MAX_AUDIT_LIMIT: i64 = 1000;

/// レジストリの動作パラメータ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// 発行時の有効期間（日）
    pub validity_days: i64,
    /// キー衝突時の最大試行回数
    pub key_generation_attempts: u32,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            validity_days: DEFAULT_VALIDITY_DAYS,
            key_generation_attempts: DEFAULT_KEY_GENERATION_ATTEMPTS,
        }
    }
}

/// 全ライセンスのスナップショット（挿入順・一度きりの走査）
#[derive(Debug)]
pub struct LicenseSnapshot {
    inner: std::vec::IntoIter<LicenseRecord>,
}

impl Iterator for LicenseSnapshot {
    type Item = LicenseRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for LicenseSnapshot {}

/// ライセンスレジストリ
#[derive(Clone)]
pub struct LicenseRegistry {
    repository: Arc<dyn LicenseRepository>,
    key_generator: Arc<dyn KeyGenerator>,
    options: RegistryOptions,
}

impl LicenseRegistry {
    /// 新しいレジストリを作成
    pub fn new(
        repository: Arc<dyn LicenseRepository>,
        key_generator: Arc<dyn KeyGenerator>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            repository,
            key_generator,
            options,
        }
    }

    /// デフォルト設定（エントロピー初期化のキー生成器）でレジストリを作成
    pub fn with_defaults(repository: Arc<dyn LicenseRepository>) -> Self {
        Self::new(
            repository,
            Arc::new(RandomKeyGenerator::default()),
            RegistryOptions::default(),
        )
    }

    /// 動作パラメータ
    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    /// ライセンスを発行
    ///
    /// # Arguments
    /// * `owner_id` - ユーザーID
    /// * `actor` - 操作者
    ///
    /// # Returns
    /// * `Ok(LicenseRecord)` - 発行されたライセンス
    /// * `Err(LicenseError::DuplicateOwner)` - ユーザーに既にライセンスがある
    /// * `Err(LicenseError::KeyGenerationExhausted)` - キー衝突が試行上限まで続いた
    pub async fn issue(&self, owner_id: &str, actor: &Actor) -> LicenseResult<LicenseRecord> {
        const OP: &str = "issue license";
        require_non_empty("user_id", owner_id)?;

        let attempts = self.options.key_generation_attempts.max(1);
        let validity = days_duration(self.options.validity_days)?;

        for attempt in 1..=attempts {
            let key = self.key_generator.generate();
            let now = Utc::now();
            let expires_at = add_days(now, validity)?;
            let new_license = NewLicense {
                key: key.clone(),
                owner_id: owner_id.to_string(),
                status: LicenseStatus::Active,
                hwid: None,
                created_at: now,
                expires_at,
            };

            let mut tx = self.begin(OP).await?;
            let id = match tx.insert(&new_license).await {
                Ok(id) => id,
                Err(RepositoryError::UniqueViolation(UniqueField::Key)) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        "Generated license key collided, retrying"
                    );
                    continue;
                }
                Err(RepositoryError::UniqueViolation(UniqueField::Owner)) => {
                    return Err(LicenseError::DuplicateOwner(owner_id.to_string()));
                }
                Err(e) => return Err(store_failure(OP, e)),
            };

            let entry = NewAuditEntry::new(AuditAction::AddLicense, actor)
                .license(&key)
                .owner(owner_id)
                .detail(format!("expires_at={}", expires_at.to_rfc3339()));
            tx.append_audit(&entry, now)
                .await
                .map_err(|e| store_failure(OP, e))?;
            commit(tx, OP).await?;

            info!(
                license = %key,
                user_id = %owner_id,
                actor = %actor,
                expires_at = %expires_at,
                "License issued"
            );

            return Ok(LicenseRecord {
                id,
                key,
                owner_id: owner_id.to_string(),
                status: LicenseStatus::Active,
                hwid: None,
                created_at: now,
                updated_at: now,
                expires_at,
            });
        }

        error!(attempts = attempts, user_id = %owner_id, "License key generation exhausted");
        Err(LicenseError::KeyGenerationExhausted(attempts))
    }

    /// ライセンスを検証
    ///
    /// 未バインドのライセンスは提示されたHWIDに条件付き更新でバインドされる。
    /// 同時に検証した他の呼び出しが先にバインドした場合は、その値と比較する。
    pub async fn validate(
        &self,
        key: &str,
        hwid: &str,
        actor: &Actor,
    ) -> LicenseResult<LicenseRecord> {
        const OP: &str = "validate license";
        require_non_empty("license", key)?;
        require_non_empty("hwid", hwid)?;

        let record = self.find_by_key(OP, key).await?;
        let now = Utc::now();
        check_usable(&record, now)?;

        if let Some(bound) = record.bound_hwid() {
            return if bound == hwid {
                Ok(record)
            } else {
                warn!(license = %key, actor = %actor, "HWID mismatch on validation");
                Err(LicenseError::HwidMismatch(key.to_string()))
            };
        }

        let mut tx = self.begin(OP).await?;
        let bound = tx
            .conditional_update_hwid(key, hwid, now)
            .await
            .map_err(|e| store_failure(OP, e))?;

        if bound {
            let entry = NewAuditEntry::new(AuditAction::ValidateBind, actor)
                .license(key)
                .owner(&record.owner_id)
                .detail(format!("hwid={}", hwid));
            tx.append_audit(&entry, now)
                .await
                .map_err(|e| store_failure(OP, e))?;
            commit(tx, OP).await?;

            info!(license = %key, hwid = %hwid, actor = %actor, "HWID bound on first validation");
            return Ok(LicenseRecord {
                hwid: Some(hwid.to_string()),
                updated_at: now,
                ..record
            });
        }

        // 読み取り後に別の操作が先に変更した（バインド・凍結・削除など）
        drop(tx);
        let current = self.find_by_key(OP, key).await?;
        check_usable(&current, now)?;
        match current.bound_hwid() {
            Some(bound) if bound == hwid => Ok(current),
            _ => {
                warn!(license = %key, actor = %actor, "HWID mismatch after concurrent bind");
                Err(LicenseError::HwidMismatch(key.to_string()))
            }
        }
    }

    /// HWIDを強制的にバインド（管理者操作、既存の値は上書き）
    pub async fn bind(&self, key: &str, hwid: &str, actor: &Actor) -> LicenseResult<()> {
        const OP: &str = "bind license";
        require_non_empty("license", key)?;
        require_non_empty("hwid", hwid)?;

        let changes = LicenseChanges {
            hwid: Some(Some(hwid.to_string())),
            ..Default::default()
        };
        let entry = NewAuditEntry::new(AuditAction::BindHwid, actor)
            .license(key)
            .detail(format!("hwid={}", hwid));
        self.apply(OP, LicenseSelector::Key(key), &changes, &entry)
            .await?;

        info!(license = %key, hwid = %hwid, actor = %actor, "HWID bound");
        Ok(())
    }

    /// HWIDのバインドを解除
    pub async fn unbind(&self, key: &str, actor: &Actor) -> LicenseResult<()> {
        const OP: &str = "unbind license";
        require_non_empty("license", key)?;

        let changes = LicenseChanges {
            hwid: Some(None),
            ..Default::default()
        };
        let entry = NewAuditEntry::new(AuditAction::UnbindHwid, actor).license(key);
        self.apply(OP, LicenseSelector::Key(key), &changes, &entry)
            .await?;

        info!(license = %key, actor = %actor, "HWID unbound");
        Ok(())
    }

    /// ライセンスを凍結
    pub async fn freeze(&self, owner_id: &str, actor: &Actor) -> LicenseResult<()> {
        self.set_status(owner_id, LicenseStatus::Frozen, actor).await
    }

    /// ライセンスの凍結を解除
    pub async fn unfreeze(&self, owner_id: &str, actor: &Actor) -> LicenseResult<()> {
        self.set_status(owner_id, LicenseStatus::Active, actor).await
    }

    async fn set_status(
        &self,
        owner_id: &str,
        status: LicenseStatus,
        actor: &Actor,
    ) -> LicenseResult<()> {
        let (op, action) = match status {
            LicenseStatus::Frozen => ("freeze license", AuditAction::FreezeLicense),
            LicenseStatus::Active => ("unfreeze license", AuditAction::UnfreezeLicense),
        };
        require_non_empty("user_id", owner_id)?;

        let changes = LicenseChanges {
            status: Some(status),
            ..Default::default()
        };
        let entry = NewAuditEntry::new(action, actor).owner(owner_id);
        self.apply(op, LicenseSelector::Owner(owner_id), &changes, &entry)
            .await?;

        info!(user_id = %owner_id, status = %status, actor = %actor, "License status changed");
        Ok(())
    }

    /// 有効期限を `now + days` に設定し、新しい期限を返す
    ///
    /// 現在の期限に加算するのではなく、現在時刻から再計算する。
    pub async fn renew(
        &self,
        owner_id: &str,
        days: i64,
        actor: &Actor,
    ) -> LicenseResult<DateTime<Utc>> {
        const OP: &str = "renew license";
        require_non_empty("user_id", owner_id)?;
        if days <= 0 {
            return Err(LicenseError::InvalidArgument(format!(
                "days must be a positive integer, got {}",
                days
            )));
        }

        let now = Utc::now();
        let expires_at = add_days(now, days_duration(days)?)?;
        let changes = LicenseChanges {
            expires_at: Some(expires_at),
            ..Default::default()
        };
        let entry = NewAuditEntry::new(AuditAction::RenewLicense, actor)
            .owner(owner_id)
            .detail(format!("days={} expires_at={}", days, expires_at.to_rfc3339()));
        self.apply_at(OP, LicenseSelector::Owner(owner_id), &changes, &entry, now)
            .await?;

        info!(user_id = %owner_id, days = days, expires_at = %expires_at, actor = %actor, "License renewed");
        Ok(expires_at)
    }

    /// ライセンスを削除
    pub async fn delete(&self, owner_id: &str, actor: &Actor) -> LicenseResult<()> {
        const OP: &str = "delete license";
        require_non_empty("user_id", owner_id)?;

        let now = Utc::now();
        let mut tx = self.begin(OP).await?;
        let affected = tx
            .delete(owner_id)
            .await
            .map_err(|e| store_failure(OP, e))?;
        if affected == 0 {
            return Err(LicenseError::NotFound(format!("user_id {}", owner_id)));
        }

        let entry = NewAuditEntry::new(AuditAction::DeleteLicense, actor).owner(owner_id);
        tx.append_audit(&entry, now)
            .await
            .map_err(|e| store_failure(OP, e))?;
        commit(tx, OP).await?;

        info!(user_id = %owner_id, actor = %actor, "License deleted");
        Ok(())
    }

    /// ユーザーIDでライセンスを取得
    pub async fn get_by_owner(&self, owner_id: &str) -> LicenseResult<LicenseRecord> {
        const OP: &str = "get license by user_id";
        require_non_empty("user_id", owner_id)?;

        self.repository
            .find_by_owner(owner_id)
            .await
            .map_err(|e| store_failure(OP, e))?
            .ok_or_else(|| LicenseError::NotFound(format!("user_id {}", owner_id)))
    }

    /// ライセンスキーでライセンスを取得
    pub async fn get_by_key(&self, key: &str) -> LicenseResult<LicenseRecord> {
        require_non_empty("license", key)?;
        self.find_by_key("get license by key", key).await
    }

    /// 全ライセンスを挿入順で取得
    pub async fn list_all(&self) -> LicenseResult<LicenseSnapshot> {
        let records = self
            .repository
            .list_all()
            .await
            .map_err(|e| store_failure("list licenses", e))?;

        Ok(LicenseSnapshot {
            inner: records.into_iter(),
        })
    }

    /// 監査ログを新しい順に取得（`limit` は [`MAX_AUDIT_LIMIT`] で頭打ち）
    pub async fn audit_log(&self, limit: i64) -> LicenseResult<Vec<AuditEntry>> {
        if limit <= 0 {
            return Err(LicenseError::InvalidArgument(format!(
                "limit must be a positive integer, got {}",
                limit
            )));
        }

        self.repository
            .recent_audit(limit.min(MAX_AUDIT_LIMIT))
            .await
            .map_err(|e| store_failure("read audit log", e))
    }

    async fn find_by_key(&self, operation: &'static str, key: &str) -> LicenseResult<LicenseRecord> {
        self.repository
            .find_by_key(key)
            .await
            .map_err(|e| store_failure(operation, e))?
            .ok_or_else(|| LicenseError::NotFound(format!("license {}", key)))
    }

    async fn begin(&self, operation: &'static str) -> LicenseResult<Box<dyn LicenseTransaction>> {
        self.repository
            .begin()
            .await
            .map_err(|e| store_failure(operation, e))
    }

    async fn apply(
        &self,
        operation: &'static str,
        selector: LicenseSelector<'_>,
        changes: &LicenseChanges,
        entry: &NewAuditEntry,
    ) -> LicenseResult<()> {
        self.apply_at(operation, selector, changes, entry, Utc::now())
            .await
    }

    // 部分更新 + 監査ログ追記を1トランザクションで実行
    async fn apply_at(
        &self,
        operation: &'static str,
        selector: LicenseSelector<'_>,
        changes: &LicenseChanges,
        entry: &NewAuditEntry,
        now: DateTime<Utc>,
    ) -> LicenseResult<()> {
        let mut tx = self.begin(operation).await?;
        let affected = tx
            .update(selector, changes, now)
            .await
            .map_err(|e| store_failure(operation, e))?;
        if affected == 0 {
            return Err(match selector {
                LicenseSelector::Key(key) => LicenseError::NotFound(format!("license {}", key)),
                LicenseSelector::Owner(owner) => {
                    LicenseError::NotFound(format!("user_id {}", owner))
                }
            });
        }

        tx.append_audit(entry, now)
            .await
            .map_err(|e| store_failure(operation, e))?;
        commit(tx, operation).await
    }
}

async fn commit(tx: Box<dyn LicenseTransaction>, operation: &'static str) -> LicenseResult<()> {
    tx.commit().await.map_err(|e| store_failure(operation, e))
}

fn check_usable(record: &LicenseRecord, now: DateTime<Utc>) -> LicenseResult<()> {
    if record.status != LicenseStatus::Active {
        return Err(LicenseError::Inactive(record.key.clone()));
    }
    if record.is_expired_at(now) {
        return Err(LicenseError::Expired(record.key.clone()));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> LicenseResult<()> {
    if value.trim().is_empty() {
        return Err(LicenseError::InvalidArgument(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

fn days_duration(days: i64) -> LicenseResult<Duration> {
    Duration::try_days(days)
        .ok_or_else(|| LicenseError::InvalidArgument(format!("days out of range: {}", days)))
}

fn add_days(now: DateTime<Utc>, duration: Duration) -> LicenseResult<DateTime<Utc>> {
    now.checked_add_signed(duration).ok_or_else(|| {
        LicenseError::InvalidArgument(format!(
            "expiry out of range: {} days",
            duration.num_days()
        ))
    })
}

fn store_failure(operation: &'static str, err: RepositoryError) -> LicenseError {
    error!(operation = operation, error = %err, "License store operation failed");
    LicenseError::StoreFailure {
        operation,
        message: err.to_string(),
    }
}

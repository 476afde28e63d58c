//! ライセンスストア（SQLite実装）
//!
//! `UserLicense` テーブルに対する `LicenseRepository` / `LicenseTransaction` の実装

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use license_manager_common::types::{AuditEntry, LicenseRecord, LicenseStatus, NewAuditEntry};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use super::audit_log;
use super::traits::{
    LicenseChanges, LicenseRepository, LicenseSelector, LicenseTransaction, NewLicense,
    RepositoryError, RepositoryResult, UniqueField,
};

const SELECT_LICENSE: &str = "SELECT id, license, UserId AS user_id, createdAt AS created_at, \
     updatedAt AS updated_at, expiresAt AS expires_at, hwid, status FROM UserLicense";

/// SQLiteベースのライセンスストア
#[derive(Clone)]
pub struct SqliteLicenseRepository {
    pool: SqlitePool,
}

impl SqliteLicenseRepository {
    /// 接続プールからストアを作成
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> RepositoryResult<Option<LicenseRecord>> {
        let row = sqlx::query_as::<_, LicenseRow>(&format!("{} WHERE {} = ?", SELECT_LICENSE, column))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(LicenseRow::into_record).transpose()
    }
}

#[async_trait]
impl LicenseRepository for SqliteLicenseRepository {
    async fn find_by_key(&self, key: &str) -> RepositoryResult<Option<LicenseRecord>> {
        self.find_one("license", key).await
    }

    async fn find_by_owner(&self, owner_id: &str) -> RepositoryResult<Option<LicenseRecord>> {
        self.find_one("UserId", owner_id).await
    }

    async fn list_all(&self) -> RepositoryResult<Vec<LicenseRecord>> {
        let rows = sqlx::query_as::<_, LicenseRow>(&format!("{} ORDER BY id ASC", SELECT_LICENSE))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(LicenseRow::into_record).collect()
    }

    async fn recent_audit(&self, limit: i64) -> RepositoryResult<Vec<AuditEntry>> {
        audit_log::recent(&self.pool, limit).await
    }

    async fn begin(&self) -> RepositoryResult<Box<dyn LicenseTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteLicenseTransaction { tx }))
    }
}

/// SQLiteトランザクション
///
/// コミットされずにドロップされた場合はsqlxがロールバックする。
pub struct SqliteLicenseTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl LicenseTransaction for SqliteLicenseTransaction {
    async fn insert(&mut self, license: &NewLicense) -> RepositoryResult<i64> {
        let created_at = license.created_at.to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO UserLicense (license, UserId, createdAt, updatedAt, expiresAt, hwid, status)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&license.key)
        .bind(&license.owner_id)
        .bind(&created_at)
        .bind(&created_at)
        .bind(license.expires_at.to_rfc3339())
        .bind(license.hwid.as_deref())
        .bind(license.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(classify_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn conditional_update_hwid(
        &mut self,
        key: &str,
        hwid: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE UserLicense SET hwid = ?, updatedAt = ?
             WHERE license = ? AND (hwid IS NULL OR hwid = '')
               AND status = ? AND julianday(expiresAt) >= julianday(?)",
        )
        .bind(hwid)
        .bind(now.to_rfc3339())
        .bind(key)
        .bind(LicenseStatus::Active.as_str())
        .bind(now.to_rfc3339())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(
        &mut self,
        selector: LicenseSelector<'_>,
        changes: &LicenseChanges,
        now: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE UserLicense SET updatedAt = ");
        builder.push_bind(now.to_rfc3339());

        if let Some(status) = changes.status {
            builder.push(", status = ").push_bind(status.as_str());
        }
        if let Some(hwid) = &changes.hwid {
            builder.push(", hwid = ").push_bind(hwid.clone());
        }
        if let Some(expires_at) = changes.expires_at {
            builder.push(", expiresAt = ").push_bind(expires_at.to_rfc3339());
        }

        match selector {
            LicenseSelector::Key(key) => builder.push(" WHERE license = ").push_bind(key),
            LicenseSelector::Owner(owner_id) => builder.push(" WHERE UserId = ").push_bind(owner_id),
        };

        let result = builder.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&mut self, owner_id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM UserLicense WHERE UserId = ?")
            .bind(owner_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn append_audit(
        &mut self,
        entry: &NewAuditEntry,
        now: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        Ok(audit_log::append(&mut self.tx, entry, now).await?)
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let SqliteLicenseTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

/// 一意制約違反をカラム単位のエラーに変換する
fn classify_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &e {
        let message = db_err.message();
        if message.contains("UNIQUE constraint failed") {
            if message.contains("UserLicense.UserId") {
                return RepositoryError::UniqueViolation(UniqueField::Owner);
            }
            if message.contains("UserLicense.license") {
                return RepositoryError::UniqueViolation(UniqueField::Key);
            }
        }
    }
    RepositoryError::Database(e)
}

// SQLiteからの行取得用の内部型
#[derive(sqlx::FromRow)]
struct LicenseRow {
    id: i64,
    license: String,
    user_id: String,
    created_at: String,
    updated_at: String,
    expires_at: String,
    hwid: Option<String>,
    status: String,
}

impl LicenseRow {
    fn into_record(self) -> RepositoryResult<LicenseRecord> {
        let status = LicenseStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::Corrupt(format!(
                "UserLicense.status '{}' (id={})",
                self.status, self.id
            ))
        })?;

        Ok(LicenseRecord {
            id: self.id,
            status,
            hwid: self.hwid.filter(|h| !h.is_empty()),
            created_at: parse_timestamp(&self.created_at, "createdAt", self.id)?,
            updated_at: parse_timestamp(&self.updated_at, "updatedAt", self.id)?,
            expires_at: parse_timestamp(&self.expires_at, "expiresAt", self.id)?,
            key: self.license,
            owner_id: self.user_id,
        })
    }
}

fn parse_timestamp(value: &str, column: &str, id: i64) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            RepositoryError::Corrupt(format!(
                "UserLicense.{} '{}' (id={}): {}",
                column, value, id, e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use license_manager_common::types::{Actor, AuditAction};

    async fn setup_repository() -> SqliteLicenseRepository {
        SqliteLicenseRepository::new(crate::db::test_utils::test_db_pool().await)
    }

    fn new_license(key: &str, owner: &str) -> NewLicense {
        let now = Utc::now();
        NewLicense {
            key: key.to_string(),
            owner_id: owner.to_string(),
            status: LicenseStatus::Active,
            hwid: None,
            created_at: now,
            expires_at: now + Duration::days(30),
        }
    }

    async fn insert_committed(repo: &SqliteLicenseRepository, key: &str, owner: &str) -> i64 {
        let mut tx = repo.begin().await.unwrap();
        let id = tx.insert(&new_license(key, owner)).await.unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_repository().await;
        let id = insert_committed(&repo, "KEY0000001", "u1").await;

        let by_key = repo.find_by_key("KEY0000001").await.unwrap().unwrap();
        assert_eq!(by_key.id, id);
        assert_eq!(by_key.owner_id, "u1");
        assert_eq!(by_key.status, LicenseStatus::Active);
        assert!(by_key.hwid.is_none());

        let by_owner = repo.find_by_owner("u1").await.unwrap().unwrap();
        assert_eq!(by_owner, by_key);

        assert!(repo.find_by_key("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timestamps_round_trip_exactly() {
        let repo = setup_repository().await;
        let license = new_license("KEY0000001", "u1");
        let mut tx = repo.begin().await.unwrap();
        tx.insert(&license).await.unwrap();
        tx.commit().await.unwrap();

        let record = repo.find_by_key("KEY0000001").await.unwrap().unwrap();
        assert_eq!(record.created_at, license.created_at);
        assert_eq!(record.expires_at, license.expires_at);
    }

    #[tokio::test]
    async fn test_unique_violations_are_classified() {
        let repo = setup_repository().await;
        insert_committed(&repo, "KEY0000001", "u1").await;

        let mut tx = repo.begin().await.unwrap();
        let dup_owner = tx.insert(&new_license("KEY0000002", "u1")).await;
        assert!(matches!(
            dup_owner,
            Err(RepositoryError::UniqueViolation(UniqueField::Owner))
        ));

        let dup_key = tx.insert(&new_license("KEY0000001", "u2")).await;
        assert!(matches!(
            dup_key,
            Err(RepositoryError::UniqueViolation(UniqueField::Key))
        ));
    }

    #[tokio::test]
    async fn test_conditional_update_hwid_binds_once() {
        let repo = setup_repository().await;
        insert_committed(&repo, "KEY0000001", "u1").await;

        let mut tx = repo.begin().await.unwrap();
        assert!(tx
            .conditional_update_hwid("KEY0000001", "HW1", Utc::now())
            .await
            .unwrap());
        assert!(!tx
            .conditional_update_hwid("KEY0000001", "HW2", Utc::now())
            .await
            .unwrap());
        assert!(!tx
            .conditional_update_hwid("missing", "HW2", Utc::now())
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let record = repo.find_by_key("KEY0000001").await.unwrap().unwrap();
        assert_eq!(record.hwid.as_deref(), Some("HW1"));
    }

    #[tokio::test]
    async fn test_conditional_update_skips_frozen_and_expired() {
        let repo = setup_repository().await;
        insert_committed(&repo, "KEY0000001", "u1").await;
        insert_committed(&repo, "KEY0000002", "u2").await;

        let now = Utc::now();
        let mut tx = repo.begin().await.unwrap();
        tx.update(
            LicenseSelector::Owner("u1"),
            &LicenseChanges {
                status: Some(LicenseStatus::Frozen),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();
        tx.update(
            LicenseSelector::Owner("u2"),
            &LicenseChanges {
                expires_at: Some(now - Duration::seconds(1)),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();

        assert!(!tx
            .conditional_update_hwid("KEY0000001", "HW1", now)
            .await
            .unwrap());
        assert!(!tx
            .conditional_update_hwid("KEY0000002", "HW1", now)
            .await
            .unwrap());
        tx.commit().await.unwrap();

        assert!(repo.find_by_key("KEY0000001").await.unwrap().unwrap().hwid.is_none());
        assert!(repo.find_by_key("KEY0000002").await.unwrap().unwrap().hwid.is_none());
    }

    #[tokio::test]
    async fn test_conditional_update_treats_empty_string_as_unbound() {
        let repo = setup_repository().await;
        insert_committed(&repo, "KEY0000001", "u1").await;

        let mut tx = repo.begin().await.unwrap();
        tx.update(
            LicenseSelector::Key("KEY0000001"),
            &LicenseChanges {
                hwid: Some(Some(String::new())),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(tx
            .conditional_update_hwid("KEY0000001", "HW1", Utc::now())
            .await
            .unwrap());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_update_by_owner() {
        let repo = setup_repository().await;
        insert_committed(&repo, "KEY0000001", "u1").await;
        let new_expiry = Utc::now() + Duration::days(90);

        let mut tx = repo.begin().await.unwrap();
        let affected = tx
            .update(
                LicenseSelector::Owner("u1"),
                &LicenseChanges {
                    status: Some(LicenseStatus::Frozen),
                    expires_at: Some(new_expiry),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let missing = tx
            .update(
                LicenseSelector::Owner("nobody"),
                &LicenseChanges {
                    status: Some(LicenseStatus::Active),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(missing, 0);
        tx.commit().await.unwrap();

        let record = repo.find_by_owner("u1").await.unwrap().unwrap();
        assert_eq!(record.status, LicenseStatus::Frozen);
        assert_eq!(record.expires_at, new_expiry);
        assert!(record.hwid.is_none());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back_with_audit() {
        let repo = setup_repository().await;
        {
            let mut tx = repo.begin().await.unwrap();
            tx.insert(&new_license("KEY0000001", "u1")).await.unwrap();
            tx.append_audit(
                &NewAuditEntry::new(AuditAction::AddLicense, &Actor::system()).owner("u1"),
                Utc::now(),
            )
            .await
            .unwrap();
            // コミットせずにドロップ
        }

        assert!(repo.find_by_owner("u1").await.unwrap().is_none());
        assert!(repo.recent_audit(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_list_order() {
        let repo = setup_repository().await;
        insert_committed(&repo, "KEY0000001", "u1").await;
        insert_committed(&repo, "KEY0000002", "u2").await;
        insert_committed(&repo, "KEY0000003", "u3").await;

        let mut tx = repo.begin().await.unwrap();
        assert_eq!(tx.delete("u2").await.unwrap(), 1);
        assert_eq!(tx.delete("u2").await.unwrap(), 0);
        tx.commit().await.unwrap();

        let owners: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.owner_id)
            .collect();
        assert_eq!(owners, vec!["u1", "u3"]);
    }

    #[tokio::test]
    async fn test_status_outside_enum_is_rejected_by_schema() {
        let repo = setup_repository().await;
        insert_committed(&repo, "KEY0000001", "u1").await;

        let result = sqlx::query("UPDATE UserLicense SET status = 'expired' WHERE UserId = 'u1'")
            .execute(&repo.pool)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_row_with_bad_timestamp_is_corrupt() {
        let row = LicenseRow {
            id: 7,
            license: "KEY0000001".into(),
            user_id: "u1".into(),
            created_at: "yesterday".into(),
            updated_at: "yesterday".into(),
            expires_at: "tomorrow".into(),
            hwid: Some(String::new()),
            status: "active".into(),
        };
        assert!(matches!(row.into_record(), Err(RepositoryError::Corrupt(_))));
    }
}

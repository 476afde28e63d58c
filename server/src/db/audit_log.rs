//! 監査ログストレージ
//!
//! `TransactionLogs` テーブルへの追記と参照。追記は呼び出し側のトランザクション上で
//! 実行されるため、状態変更と監査ログは同時にコミット/ロールバックされる。
//! 更新・削除はトリガーで禁止している。

use chrono::{DateTime, Utc};
use license_manager_common::types::{AuditEntry, NewAuditEntry};
use sqlx::{SqliteConnection, SqlitePool};

use super::traits::{RepositoryError, RepositoryResult};

/// 監査ログを1件追記し、採番されたIDを返す
pub async fn append(
    conn: &mut SqliteConnection,
    entry: &NewAuditEntry,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO TransactionLogs (timestamp, action, actor, license, UserId, description)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(now.to_rfc3339())
    .bind(entry.action.as_str())
    .bind(entry.actor.to_string())
    .bind(entry.license_key.as_deref())
    .bind(entry.owner_id.as_deref())
    .bind(entry.description())
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// 新しい順に最大 `limit` 件取得
pub async fn recent(pool: &SqlitePool, limit: i64) -> RepositoryResult<Vec<AuditEntry>> {
    let rows = sqlx::query_as::<_, AuditRow>(
        "SELECT id, timestamp, action, actor, license, UserId AS user_id, description
         FROM TransactionLogs ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AuditRow::into_entry).collect()
}

// SQLiteからの行取得用の内部型
#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    timestamp: String,
    action: String,
    actor: String,
    license: Option<String>,
    user_id: Option<String>,
    description: String,
}

impl AuditRow {
    fn into_entry(self) -> RepositoryResult<AuditEntry> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| {
                RepositoryError::Corrupt(format!(
                    "TransactionLogs.timestamp '{}' (id={}): {}",
                    self.timestamp, self.id, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(AuditEntry {
            id: self.id,
            timestamp,
            action: self.action,
            actor: self.actor,
            license: self.license,
            user_id: self.user_id,
            description: self.description,
        })
    }
}

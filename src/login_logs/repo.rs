use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::login_logs::repo_types::{LoginLogEntry, LoginLogRow, NewLoginLog};

/// Number of entries returned by the login-history endpoint.
pub const HISTORY_LIMIT: i64 = 10;

/// Append-only audit log of login attempts.
#[async_trait]
pub trait LoginLogStore: Send + Sync {
    async fn append(&self, entry: NewLoginLog) -> anyhow::Result<LoginLogEntry>;
    /// Most recent entries for a user, newest first.
    async fn recent_for_user(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<LoginLogEntry>>;
}

#[derive(Clone)]
pub struct PgLoginLogStore {
    db: PgPool,
}

impl PgLoginLogStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LoginLogStore for PgLoginLogStore {
    async fn append(&self, entry: NewLoginLog) -> anyhow::Result<LoginLogEntry> {
        let entry = entry.into_entry(OffsetDateTime::now_utc());
        sqlx::query(
            r#"
            INSERT INTO login_logs
                (id, user_id, timestamp, ip_address, user_agent, status, auth_method, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.timestamp)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.status.as_str())
        .bind(entry.auth_method.as_str())
        .bind(entry.failure_reason.as_deref())
        .execute(&self.db)
        .await?;
        Ok(entry)
    }

    async fn recent_for_user(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<LoginLogEntry>> {
        let rows = sqlx::query_as::<_, LoginLogRow>(
            r#"
            SELECT id, user_id, timestamp, ip_address, user_agent, status, auth_method, failure_reason
              FROM login_logs
             WHERE user_id = $1
             ORDER BY timestamp DESC
             LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(LoginLogEntry::try_from).collect()
    }
}

//! Refresh session storage.
//!
//! Every issued refresh token is backed by exactly one row here. Access
//! tokens are never stored. A user may hold any number of sessions at once
//! (one per device or browser).

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

/// One active long-lived login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub id: i64,
    pub user_id: i64,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshSession {
    /// True once the stored expiry has been reached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    refresh_token: String,
    expires_at: i64,
}

impl From<SessionRow> for RefreshSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            refresh_token: row.refresh_token,
            expires_at: DateTime::from_timestamp(row.expires_at, 0).unwrap_or_default(),
        }
    }
}

/// Store for managing refresh sessions.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a new session. Existing sessions of the same user are untouched.
    pub async fn create(
        &self,
        user_id: i64,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshSession, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO sessions (user_id, refresh_token, expires_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(refresh_token)
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(RefreshSession {
            id: result.last_insert_rowid(),
            user_id,
            refresh_token: refresh_token.to_string(),
            expires_at: DateTime::from_timestamp(expires_at.timestamp(), 0).unwrap_or(expires_at),
        })
    }

    /// Exact-match lookup by refresh token.
    pub async fn find_by_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, refresh_token, expires_at FROM sessions WHERE refresh_token = ?",
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshSession::from))
    }

    /// Delete a session by id. Deleting an unknown id is not an error.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the session holding `refresh_token` and return it, if there was one.
    pub async fn delete_by_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "DELETE FROM sessions WHERE refresh_token = ? RETURNING id, user_id, refresh_token, expires_at",
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshSession::from))
    }

    /// List a user's sessions, newest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<RefreshSession>, sqlx::Error> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, refresh_token, expires_at FROM sessions WHERE user_id = ? ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RefreshSession::from).collect())
    }

    /// Delete every session whose expiry is at or before `now`.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete sessions whose user no longer exists.
    pub async fn delete_orphaned(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE user_id NOT IN (SELECT id FROM users)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

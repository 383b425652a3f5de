//! Users and password reset tokens.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::{from_db_time, to_db_time};

/// Stored login credentials for one user.
#[derive(Clone)]
pub struct UserRecord {
    pub username: String,
    /// Argon2id hash in PHC string format
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ResetTokenRecord {
    /// Hex-encoded SHA-256 of the token handed to the user
    pub token_hash: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Insert a user. Returns false if the username is already registered.
pub async fn insert_user(conn: &mut SqliteConnection, user: &UserRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(username) DO NOTHING
        "#,
    )
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(to_db_time(user.created_at))
    .bind(to_db_time(user.updated_at))
    .execute(&mut *conn)
    .await
    .context("Failed to save user")?;

    Ok(result.rows_affected() == 1)
}

pub async fn get_user(conn: &mut SqliteConnection, username: &str) -> Result<Option<UserRecord>> {
    let row = sqlx::query(
        r#"
        SELECT username, password_hash, created_at, updated_at
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch user")?;

    match row {
        Some(row) => {
            let created_at: String = row.get("created_at");
            let updated_at: String = row.get("updated_at");
            Ok(Some(UserRecord {
                username: row.get("username"),
                password_hash: row.get("password_hash"),
                created_at: from_db_time(&created_at)?,
                updated_at: from_db_time(&updated_at)?,
            }))
        }
        None => Ok(None),
    }
}

pub async fn update_password(
    conn: &mut SqliteConnection,
    username: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE username = ?")
        .bind(password_hash)
        .bind(to_db_time(now))
        .bind(username)
        .execute(&mut *conn)
        .await
        .context("Failed to update password")?;

    Ok(result.rows_affected() == 1)
}

pub async fn insert_reset_token(conn: &mut SqliteConnection, token: &ResetTokenRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reset_tokens (token_hash, username, created_at, expires_at, used_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&token.token_hash)
    .bind(&token.username)
    .bind(to_db_time(token.created_at))
    .bind(to_db_time(token.expires_at))
    .bind(token.used_at.map(to_db_time))
    .execute(&mut *conn)
    .await
    .context("Failed to save reset token")?;
    Ok(())
}

/// Mark every outstanding token of a user as used.
pub async fn invalidate_reset_tokens(
    conn: &mut SqliteConnection,
    username: &str,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result =
        sqlx::query("UPDATE reset_tokens SET used_at = ? WHERE username = ? AND used_at IS NULL")
            .bind(to_db_time(now))
            .bind(username)
            .execute(&mut *conn)
            .await
            .context("Failed to invalidate reset tokens")?;

    Ok(result.rows_affected())
}

/// Consume a token if it belongs to `username`, is unused and has not expired.
/// Returns false if no such token exists.
pub async fn consume_reset_token(
    conn: &mut SqliteConnection,
    token_hash: &str,
    username: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let now = to_db_time(now);
    let result = sqlx::query(
        r#"
        UPDATE reset_tokens
        SET used_at = ?
        WHERE token_hash = ? AND username = ? AND used_at IS NULL AND expires_at > ?
        "#,
    )
    .bind(&now)
    .bind(token_hash)
    .bind(username)
    .bind(&now)
    .execute(&mut *conn)
    .await
    .context("Failed to consume reset token")?;

    Ok(result.rows_affected() == 1)
}

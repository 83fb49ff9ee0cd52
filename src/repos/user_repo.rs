/*
 * Responsibility
 * - users テーブル (identity record) の保存/取得
 * - UserStore trait: credential manager / identity resolver が依存する境界
 * - PgUserStore: sqlx + Postgres 実装
 * - DB エラーは RepoError に変換して返す (unique violation -> Conflict)
 */
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::repos::error::{RepoError, RepoResult};

/// Stored identity. `password` holds the `salt.hash` encoding, never plaintext.
///
/// Serializable so it can flow through the response shape filter; the filter's
/// allow-list is what keeps `password` and `admin` out of responses.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub admin: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub admin: bool,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges<'a> {
    pub email: Option<&'a str>,
    pub password: Option<&'a str>,
    pub admin: Option<bool>,
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn list(&self) -> RepoResult<Vec<UserRow>>;

    // Exact match. Zero-or-more rows; the UNIQUE constraint keeps it at most one.
    async fn find_by_email(&self, email: &str) -> RepoResult<Vec<UserRow>>;

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<UserRow>>;

    // Returns `RepoError::Conflict` when the email is already taken.
    async fn insert(&self, new: NewUser<'_>) -> RepoResult<UserRow>;

    // `Ok(None)` when no row has this id.
    async fn update(&self, id: i64, changes: UserChanges<'_>) -> RepoResult<Option<UserRow>>;

    // `Ok(false)` when no row has this id.
    async fn delete(&self, id: i64) -> RepoResult<bool>;
}

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list(&self) -> RepoResult<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password, admin
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password, admin
            FROM users
            WHERE email = $1
            ORDER BY id
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password, admin
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert(&self, new: NewUser<'_>) -> RepoResult<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password, admin)
            VALUES ($1, $2, $3)
            RETURNING id, email, password, admin
            "#,
        )
        .bind(new.email)
        .bind(new.password)
        .bind(new.admin)
        .fetch_one(&self.pool)
        .await
        .map_err(RepoError::from_sqlx)?;

        tracing::debug!(user_id = row.id, "inserted user");
        Ok(row)
    }

    async fn update(&self, id: i64, changes: UserChanges<'_>) -> RepoResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET
                email = COALESCE($2, email),
                password = COALESCE($3, password),
                admin = COALESCE($4, admin)
            WHERE id = $1
            RETURNING id, email, password, admin
            "#,
        )
        .bind(id)
        .bind(changes.email)
        .bind(changes.password)
        .bind(changes.admin)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::from_sqlx)?;

        if row.is_some() {
            tracing::debug!(user_id = id, "updated user");
        }
        Ok(row)
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::debug!(user_id = id, "removed user");
        }
        Ok(deleted)
    }
}

//! PostgreSQL stores
//!
//! Uniqueness is enforced by the `UNIQUE` constraints in [`SCHEMA`]; a
//! violation is mapped to [`StoreError::Duplicate`].

use super::StoreError;
use crate::identity::{IdentityRecord, IdentityStore};
use crate::member::{Member, MemberStore};
use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use std::collections::BTreeMap;

/// Tables used by [`PgIdentityStore`] and [`PgMemberStore`]
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS social_members (
    id BIGSERIAL PRIMARY KEY,
    email TEXT UNIQUE,
    first_name TEXT,
    surname TEXT,
    locale TEXT,
    disabled BOOLEAN NOT NULL DEFAULT FALSE,
    extra JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS social_identities (
    id BIGSERIAL PRIMARY KEY,
    provider TEXT NOT NULL,
    uid TEXT NOT NULL,
    member_id BIGINT REFERENCES social_members (id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (provider, uid)
);
";

/// Create the tables if they do not exist
///
/// # Errors
///
/// Returns error if the DDL fails
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

fn map_unique(err: sqlx::Error, what: &str) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Duplicate(what.to_string())
        }
        other => StoreError::Database(other),
    }
}

/// Identities in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    /// Create a store over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_provider_uid(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<IdentityRecord>, StoreError> {
        let record = sqlx::query_as::<_, IdentityRecord>(
            r"
            SELECT id, provider, uid, member_id
            FROM social_identities
            WHERE provider = $1 AND uid = $2
            ",
        )
        .bind(provider)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<IdentityRecord>, StoreError> {
        let record = sqlx::query_as::<_, IdentityRecord>(
            r"
            SELECT id, provider, uid, member_id
            FROM social_identities
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert(
        &self,
        provider: &str,
        uid: &str,
        member_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO social_identities (provider, uid, member_id)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(provider)
        .bind(uid)
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, &format!("identity {provider}/{uid}")))?;

        Ok(id)
    }

    async fn update_member(&self, id: i64, member_id: Option<i64>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE social_identities
            SET member_id = $1, updated_at = NOW()
            WHERE id = $2
            ",
        )
        .bind(member_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct MemberRow {
    id: i64,
    email: Option<String>,
    first_name: Option<String>,
    surname: Option<String>,
    locale: Option<String>,
    disabled: bool,
    extra: Json<BTreeMap<String, String>>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Self {
            id: Some(row.id),
            email: row.email,
            first_name: row.first_name,
            surname: row.surname,
            locale: row.locale,
            disabled: row.disabled,
            extra: row.extra.0,
        }
    }
}

/// Members in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgMemberStore {
    pool: PgPool,
}

impl PgMemberStore {
    /// Create a store over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberStore for PgMemberStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Member>, StoreError> {
        let row = sqlx::query_as::<_, MemberRow>(
            r"
            SELECT id, email, first_name, surname, locale, disabled, extra
            FROM social_members
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Member::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>, StoreError> {
        let row = sqlx::query_as::<_, MemberRow>(
            r"
            SELECT id, email, first_name, surname, locale, disabled, extra
            FROM social_members
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Member::from))
    }

    async fn insert(&self, member: &Member) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO social_members (email, first_name, surname, locale, disabled, extra)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(&member.email)
        .bind(&member.first_name)
        .bind(&member.surname)
        .bind(&member.locale)
        .bind(member.disabled)
        .bind(Json(&member.extra))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "member email"))?;

        Ok(id)
    }

    async fn update(&self, member: &Member) -> Result<(), StoreError> {
        let id = member.id.ok_or(StoreError::NotFound)?;
        let result = sqlx::query(
            r"
            UPDATE social_members
            SET email = $1, first_name = $2, surname = $3, locale = $4,
                disabled = $5, extra = $6, updated_at = NOW()
            WHERE id = $7
            ",
        )
        .bind(&member.email)
        .bind(&member.first_name)
        .bind(&member.surname)
        .bind(&member.locale)
        .bind(member.disabled)
        .bind(Json(&member.extra))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "member email"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

//! SQL side of the versioned record store, shared by every meta table.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgHasArrayType, PgRow};
use sqlx::{Encode, FromRow, PgExecutor, Postgres, Type};

use crate::error::Result;
use crate::models::{CompletionMeta, MapMeta};
use crate::versioning::{Version, Versioned};

/// An append-only meta table. Queries alias the table as `m`.
pub trait MetaTable: Versioned + for<'r> FromRow<'r, PgRow> + Send + Unpin {
    /// Column naming the entity a row belongs to.
    const ENTITY_COLUMN: &'static str;
    const COLUMNS: &'static str;
    const FROM: &'static str;
}

impl MetaTable for MapMeta {
    const ENTITY_COLUMN: &'static str = "m.code";
    const COLUMNS: &'static str = "m.id, m.code, m.placement_curver, m.placement_allver, \
         m.difficulty, m.botb_difficulty, m.remake_of, m.created_at, m.deleted_at";
    const FROM: &'static str = "map_list_meta m";
}

impl MetaTable for CompletionMeta {
    const ENTITY_COLUMN: &'static str = "m.completion";
    const COLUMNS: &'static str = "m.id, m.completion, m.format, m.black_border, m.no_geraldo, \
         m.lcc, l.leftover AS lcc_leftover, m.accepted_by, m.created_at, m.deleted_at";
    const FROM: &'static str =
        "completions_meta m LEFT JOIN least_cost_chimps l ON l.id = m.lcc";
}

/// The version of `key` in effect at `at`, or `None` if the entity did not
/// exist yet.
pub async fn active_as_of<'e, T, K>(
    executor: impl PgExecutor<'e>,
    key: K,
    at: DateTime<Utc>,
) -> Result<Option<Version<T>>>
where
    T: MetaTable,
    K: for<'q> Encode<'q, Postgres> + Type<Postgres> + Send,
{
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1 AND m.created_at <= $2 \
         ORDER BY m.created_at DESC, m.id DESC LIMIT 1",
        T::COLUMNS,
        T::FROM,
        T::ENTITY_COLUMN
    );

    let row = sqlx::query_as::<_, T>(&sql)
        .bind(key)
        .bind(at)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|row| Version::classify(row, at)))
}

/// The newest version of `key`, whatever its state.
pub async fn latest<'e, T, K>(executor: impl PgExecutor<'e>, key: K) -> Result<Option<T>>
where
    T: MetaTable,
    K: for<'q> Encode<'q, Postgres> + Type<Postgres> + Send,
{
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1 ORDER BY m.created_at DESC, m.id DESC LIMIT 1",
        T::COLUMNS,
        T::FROM,
        T::ENTITY_COLUMN
    );

    let row = sqlx::query_as::<_, T>(&sql)
        .bind(key)
        .fetch_optional(executor)
        .await?;

    Ok(row)
}

/// Every version of `key`, oldest first.
pub async fn history<'e, T, K>(executor: impl PgExecutor<'e>, key: K) -> Result<Vec<T>>
where
    T: MetaTable,
    K: for<'q> Encode<'q, Postgres> + Type<Postgres> + Send,
{
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1 ORDER BY m.created_at, m.id",
        T::COLUMNS,
        T::FROM,
        T::ENTITY_COLUMN
    );

    let rows = sqlx::query_as::<_, T>(&sql)
        .bind(key)
        .fetch_all(executor)
        .await?;

    Ok(rows)
}

/// The version in effect at `at` of every entity that existed by then.
pub async fn all_as_of<'e, T>(
    executor: impl PgExecutor<'e>,
    at: DateTime<Utc>,
) -> Result<Vec<Version<T>>>
where
    T: MetaTable,
{
    let sql = format!(
        "SELECT DISTINCT ON ({entity}) {} FROM {} WHERE m.created_at <= $1 \
         ORDER BY {entity}, m.created_at DESC, m.id DESC",
        T::COLUMNS,
        T::FROM,
        entity = T::ENTITY_COLUMN
    );

    let rows = sqlx::query_as::<_, T>(&sql)
        .bind(at)
        .fetch_all(executor)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| Version::classify(row, at))
        .collect())
}

/// The newest version of every entity, for write paths.
pub async fn all_latest<'e, T>(executor: impl PgExecutor<'e>) -> Result<Vec<T>>
where
    T: MetaTable,
{
    let sql = format!(
        "SELECT DISTINCT ON ({entity}) {} FROM {} ORDER BY {entity}, m.created_at DESC, m.id DESC",
        T::COLUMNS,
        T::FROM,
        entity = T::ENTITY_COLUMN
    );

    let rows = sqlx::query_as::<_, T>(&sql).fetch_all(executor).await?;

    Ok(rows)
}

/// The newest version of each entity in `keys`.
pub async fn latest_for<'e, T, K>(executor: impl PgExecutor<'e>, keys: &[K]) -> Result<Vec<T>>
where
    T: MetaTable,
    K: for<'q> Encode<'q, Postgres> + Type<Postgres> + PgHasArrayType + Sync,
{
    let sql = format!(
        "SELECT DISTINCT ON ({entity}) {} FROM {} WHERE {entity} = ANY($1) \
         ORDER BY {entity}, m.created_at DESC, m.id DESC",
        T::COLUMNS,
        T::FROM,
        entity = T::ENTITY_COLUMN
    );

    let rows = sqlx::query_as::<_, T>(&sql)
        .bind(keys)
        .fetch_all(executor)
        .await?;

    Ok(rows)
}

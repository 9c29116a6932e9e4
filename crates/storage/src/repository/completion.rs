use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, QueryBuilder};
use validator::Validate;

use super::versioned;
use crate::dto::completion::{SubmitCompletionRequest, UpdateCompletionRequest};
use crate::dto::map::FieldChange;
use crate::error::{Result, StorageError};
use crate::models::{
    Completion, CompletionMeta, CompletionState, MapMeta, NewCompletionMeta, UserId,
};
use crate::services::permissions::{Capability, FormatGrant, PermissionService};
use crate::versioning::Version;

/// Repository for submitted runs and their judging history
pub struct CompletionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CompletionRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a completion's identity by ID
    pub async fn find(&self, id: i64) -> Result<Completion> {
        fetch_completion(&mut *self.pool.acquire().await?, id).await
    }

    /// The completion as it stood at `at`
    pub async fn state_as_of(&self, id: i64, at: DateTime<Utc>) -> Result<Version<CompletionState>> {
        let mut conn = self.pool.acquire().await?;

        let version = versioned::active_as_of::<CompletionMeta, _>(&mut *conn, id, at)
            .await?
            .ok_or(StorageError::NotFound)?;
        let completion = fetch_completion(&mut conn, id).await?;
        let players = fetch_players(&mut conn, version.row().id).await?;

        Ok(version.map(|meta| CompletionState {
            completion,
            meta,
            players,
        }))
    }

    /// Every judging version of the completion, oldest first
    pub async fn history(&self, id: i64) -> Result<Vec<CompletionMeta>> {
        let versions = versioned::history::<CompletionMeta, _>(self.pool, id).await?;
        if versions.is_empty() {
            return Err(StorageError::NotFound);
        }
        Ok(versions)
    }

    /// Submit a new run, pending acceptance
    pub async fn submit(&self, req: &SubmitCompletionRequest) -> Result<CompletionState> {
        req.validate()?;

        let mut tx = self.pool.begin().await?;
        require_listed_map(&mut tx, &req.map).await?;

        let at = Utc::now();
        let completion = sqlx::query_as::<_, Completion>(
            r#"
            INSERT INTO completions (map, submitted_at, subm_notes)
            VALUES ($1, $2, $3)
            RETURNING id, map, submitted_at, subm_notes, copied_from
            "#,
        )
        .bind(&req.map)
        .bind(at)
        .bind(&req.subm_notes)
        .fetch_one(&mut *tx)
        .await?;

        let lcc = match req.lcc_leftover {
            Some(leftover) => Some(insert_lcc(&mut tx, leftover).await?),
            None => None,
        };
        let new = NewCompletionMeta {
            completion: completion.id,
            format: req.format,
            black_border: req.black_border,
            no_geraldo: req.no_geraldo,
            lcc,
            accepted_by: None,
            deleted_at: None,
        };
        let state = append_version(&mut tx, completion, &new, req.lcc_leftover, &req.players, at)
            .await?;

        tx.commit().await?;

        tracing::info!(
            completion = state.completion.id,
            map = %state.completion.map,
            format = req.format,
            "Submitted completion"
        );
        Ok(state)
    }

    /// Mark a completion as accepted by `actor`
    pub async fn accept(
        &self,
        id: i64,
        actor: UserId,
        permissions: &dyn PermissionService,
    ) -> Result<CompletionState> {
        let grant = FormatGrant::resolve(permissions, actor, Capability::EditCompletion).await?;

        let mut tx = self.pool.begin().await?;
        let current = lock_live(&mut tx, id).await?;
        grant.require(current.meta.format)?;

        if current.meta.is_accepted() {
            return Ok(current);
        }

        let new = NewCompletionMeta {
            accepted_by: Some(actor),
            ..NewCompletionMeta::from(&current.meta)
        };
        let leftover = current.meta.lcc_leftover;
        let players = current.players.clone();
        let state =
            append_version(&mut tx, current.completion, &new, leftover, &players, Utc::now())
                .await?;

        tx.commit().await?;

        tracing::info!(completion = id, actor, "Accepted completion");
        Ok(state)
    }

    /// Change a completion's judging metadata
    pub async fn update(
        &self,
        id: i64,
        req: &UpdateCompletionRequest,
        actor: UserId,
        permissions: &dyn PermissionService,
    ) -> Result<CompletionState> {
        req.validate()?;
        if let FieldChange::Set(leftover) = req.lcc_leftover
            && leftover < 0
        {
            return Err(StorageError::Validation(
                "Leftover cannot be negative".to_string(),
            ));
        }
        let grant = FormatGrant::resolve(permissions, actor, Capability::EditCompletion).await?;

        let mut tx = self.pool.begin().await?;
        let current = lock_live(&mut tx, id).await?;
        grant.require(current.meta.format)?;
        if let Some(format) = req.format {
            grant.require(format)?;
        }

        let unchanged = NewCompletionMeta::from(&current.meta);
        let mut new = NewCompletionMeta {
            format: req.format.unwrap_or(unchanged.format),
            black_border: req.black_border.unwrap_or(unchanged.black_border),
            no_geraldo: req.no_geraldo.unwrap_or(unchanged.no_geraldo),
            ..unchanged.clone()
        };
        let leftover = req.lcc_leftover.apply(current.meta.lcc_leftover);
        let mut players = req
            .players
            .clone()
            .unwrap_or_else(|| current.players.clone());
        players.sort_unstable();
        players.dedup();

        if new == unchanged && leftover == current.meta.lcc_leftover && players == current.players
        {
            return Ok(current);
        }

        if leftover != current.meta.lcc_leftover {
            new.lcc = match leftover {
                Some(leftover) => Some(insert_lcc(&mut tx, leftover).await?),
                None => None,
            };
        }

        let state =
            append_version(&mut tx, current.completion, &new, leftover, &players, Utc::now())
                .await?;

        tx.commit().await?;

        tracing::info!(completion = id, actor, "Updated completion");
        Ok(state)
    }

    /// Delete a completion. Deleting it again changes nothing.
    pub async fn delete(
        &self,
        id: i64,
        actor: UserId,
        permissions: &dyn PermissionService,
    ) -> Result<CompletionState> {
        let grant = FormatGrant::resolve(permissions, actor, Capability::DeleteCompletion).await?;

        let mut tx = self.pool.begin().await?;
        let current = lock(&mut tx, id).await?;
        grant.require(current.meta.format)?;

        if current.meta.deleted_at.is_some() {
            return Ok(current);
        }

        let at = Utc::now();
        let new = NewCompletionMeta {
            deleted_at: Some(at),
            ..NewCompletionMeta::from(&current.meta)
        };
        let leftover = current.meta.lcc_leftover;
        let players = current.players.clone();
        let state = append_version(&mut tx, current.completion, &new, leftover, &players, at).await?;

        tx.commit().await?;

        tracing::info!(completion = id, actor, "Deleted completion");
        Ok(state)
    }

    /// Move every live completion of `from_map` that `actor` may edit onto
    /// `to_map`. Copies keep a link to their source, which is deleted.
    pub async fn transfer(
        &self,
        from_map: &str,
        to_map: &str,
        actor: UserId,
        permissions: &dyn PermissionService,
    ) -> Result<Vec<CompletionState>> {
        if from_map == to_map {
            return Err(StorageError::Validation(
                "Cannot transfer completions onto the same map".to_string(),
            ));
        }
        let grant = FormatGrant::resolve(permissions, actor, Capability::EditCompletion).await?;

        let mut tx = self.pool.begin().await?;
        require_listed_map(&mut tx, to_map).await?;

        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM completions WHERE map = $1 ORDER BY id FOR UPDATE",
        )
        .bind(from_map)
        .fetch_all(&mut *tx)
        .await?;

        let live: Vec<CompletionMeta> = versioned::latest_for::<CompletionMeta, _>(&mut *tx, &ids)
            .await?
            .into_iter()
            .filter(|meta| meta.deleted_at.is_none())
            .collect();
        if live.is_empty() {
            return Ok(Vec::new());
        }

        let authorized: Vec<CompletionMeta> = live
            .into_iter()
            .filter(|meta| grant.covers(meta.format))
            .collect();
        if authorized.is_empty() {
            return Err(StorageError::PermissionDenied);
        }

        let at = Utc::now();
        let mut copies = Vec::with_capacity(authorized.len());
        for meta in authorized {
            let source = fetch_completion(&mut tx, meta.completion).await?;
            let players = fetch_players(&mut tx, meta.id).await?;

            let copy = sqlx::query_as::<_, Completion>(
                r#"
                INSERT INTO completions (map, submitted_at, subm_notes, copied_from)
                VALUES ($1, $2, $3, $4)
                RETURNING id, map, submitted_at, subm_notes, copied_from
                "#,
            )
            .bind(to_map)
            .bind(source.submitted_at)
            .bind(&source.subm_notes)
            .bind(source.id)
            .fetch_one(&mut *tx)
            .await?;

            let lcc = match meta.lcc_leftover {
                Some(leftover) => Some(insert_lcc(&mut tx, leftover).await?),
                None => None,
            };
            let new = NewCompletionMeta {
                completion: copy.id,
                lcc,
                ..NewCompletionMeta::from(&meta)
            };
            copies.push(append_version(&mut tx, copy, &new, meta.lcc_leftover, &players, at).await?);

            let retired = NewCompletionMeta {
                deleted_at: Some(at),
                ..NewCompletionMeta::from(&meta)
            };
            append_version(&mut tx, source, &retired, meta.lcc_leftover, &players, at).await?;
        }

        tx.commit().await?;

        tracing::info!(
            from = from_map,
            to = to_map,
            count = copies.len(),
            actor,
            "Transferred completions"
        );
        Ok(copies)
    }
}

async fn fetch_completion(conn: &mut PgConnection, id: i64) -> Result<Completion> {
    sqlx::query_as::<_, Completion>(
        r#"
        SELECT id, map, submitted_at, subm_notes, copied_from
        FROM completions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(StorageError::NotFound)
}

async fn fetch_players(conn: &mut PgConnection, run: i64) -> Result<Vec<UserId>> {
    let players = sqlx::query_scalar("SELECT user_id FROM comp_players WHERE run = $1 ORDER BY user_id")
        .bind(run)
        .fetch_all(conn)
        .await?;
    Ok(players)
}

/// Fails unless `code` names a map that is currently on a list.
async fn require_listed_map(conn: &mut PgConnection, code: &str) -> Result<()> {
    let meta = versioned::latest::<MapMeta, _>(&mut *conn, code).await?;
    match meta {
        Some(meta) if meta.is_listed() => Ok(()),
        Some(_) => Err(StorageError::Validation(format!("Map {code} is not on any list"))),
        None => {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM maps WHERE code = $1)")
                    .bind(code)
                    .fetch_one(&mut *conn)
                    .await?;
            if exists {
                Err(StorageError::Validation(format!("Map {code} is not on any list")))
            } else {
                Err(StorageError::NotFound)
            }
        }
    }
}

/// Locks the completion row and loads its newest version.
async fn lock(conn: &mut PgConnection, id: i64) -> Result<CompletionState> {
    let completion = sqlx::query_as::<_, Completion>(
        r#"
        SELECT id, map, submitted_at, subm_notes, copied_from
        FROM completions
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StorageError::NotFound)?;

    let meta = versioned::latest::<CompletionMeta, _>(&mut *conn, id)
        .await?
        .ok_or(StorageError::NotFound)?;
    let players = fetch_players(conn, meta.id).await?;

    Ok(CompletionState {
        completion,
        meta,
        players,
    })
}

/// Like [`lock`], but a deleted completion counts as missing.
async fn lock_live(conn: &mut PgConnection, id: i64) -> Result<CompletionState> {
    let state = lock(conn, id).await?;
    if state.meta.deleted_at.is_some() {
        return Err(StorageError::NotFound);
    }
    Ok(state)
}

async fn insert_lcc(conn: &mut PgConnection, leftover: i32) -> Result<i64> {
    let id = sqlx::query_scalar("INSERT INTO least_cost_chimps (leftover) VALUES ($1) RETURNING id")
        .bind(leftover)
        .fetch_one(conn)
        .await?;
    Ok(id)
}

async fn append_version(
    conn: &mut PgConnection,
    completion: Completion,
    new: &NewCompletionMeta,
    lcc_leftover: Option<i32>,
    players: &[UserId],
    at: DateTime<Utc>,
) -> Result<CompletionState> {
    let mut players = players.to_vec();
    players.sort_unstable();
    players.dedup();
    if players.is_empty() {
        return Err(StorageError::Validation(
            "A completion needs at least one player".to_string(),
        ));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO completions_meta (
            completion, format, black_border, no_geraldo, lcc, accepted_by, created_at, deleted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(new.completion)
    .bind(new.format)
    .bind(new.black_border)
    .bind(new.no_geraldo)
    .bind(new.lcc)
    .bind(new.accepted_by)
    .bind(at)
    .bind(new.deleted_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        let err = StorageError::from(e);
        if err.is_foreign_key_violation() {
            StorageError::Validation(format!("Unknown format {}", new.format))
        } else {
            err
        }
    })?;

    let mut query = QueryBuilder::new("INSERT INTO comp_players (run, user_id) ");
    query.push_values(&players, |mut row, player| {
        row.push_bind(id).push_bind(*player);
    });
    query.build().execute(&mut *conn).await?;

    Ok(CompletionState {
        completion,
        meta: CompletionMeta {
            id,
            completion: new.completion,
            format: new.format,
            black_border: new.black_border,
            no_geraldo: new.no_geraldo,
            lcc: new.lcc,
            lcc_leftover,
            accepted_by: new.accepted_by,
            created_at: at,
            deleted_at: new.deleted_at,
        },
        players,
    })
}

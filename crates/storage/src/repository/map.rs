use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, QueryBuilder};
use validator::Validate;

use super::versioned;
use crate::dto::map::{CreateMapRequest, FieldChange, FieldEdit, UpdateMapRequest};
use crate::error::{Result, StorageError};
use crate::models::{ListField, Map, MapMeta, NewMapMeta, RetroMap, UserId};
use crate::services::map_edits::{materialize, plan_map_edits, touched_fields};
use crate::services::permissions::{Capability, FormatGrant, PermissionService, authorize_edits};
use crate::services::placement::{LadderAudit, find_gaps};
use crate::versioning::Version;

/// First key of the `(class, format)` advisory locks guarding list fields.
const FIELD_LOCK_CLASS: i32 = 0x4d4c;

/// Repository for maps and their list membership history
pub struct MapRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> MapRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a map's identity by code
    pub async fn find(&self, code: &str) -> Result<Map> {
        sqlx::query_as::<_, Map>(
            r#"
            SELECT code, name, preview_url, notes, created_at
            FROM maps
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(self.pool)
        .await?
        .ok_or(StorageError::NotFound)
    }

    /// The map's list membership as of `at`
    pub async fn meta_as_of(&self, code: &str, at: DateTime<Utc>) -> Result<Version<MapMeta>> {
        versioned::active_as_of::<MapMeta, _>(self.pool, code, at)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Every version of the map, oldest first
    pub async fn history(&self, code: &str) -> Result<Vec<MapMeta>> {
        let versions = versioned::history::<MapMeta, _>(self.pool, code).await?;
        if versions.is_empty() {
            return Err(StorageError::NotFound);
        }
        Ok(versions)
    }

    /// Every map listed as of `at`
    pub async fn list_as_of(&self, at: DateTime<Utc>) -> Result<Vec<MapMeta>> {
        let versions = versioned::all_as_of::<MapMeta>(self.pool, at).await?;
        Ok(versions
            .into_iter()
            .filter_map(Version::into_active)
            .collect())
    }

    pub async fn find_retro_map(&self, id: i32) -> Result<RetroMap> {
        sqlx::query_as::<_, RetroMap>("SELECT id, name, game FROM retro_maps WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Checks a dense ladder as of `at`
    pub async fn audit_ladder(&self, field: ListField, at: DateTime<Utc>) -> Result<LadderAudit> {
        let maps = self.list_as_of(at).await?;
        Ok(find_gaps(maps.iter().filter_map(|meta| meta.field(field))))
    }

    /// Create a map and place it on the lists the request names
    pub async fn create(
        &self,
        req: &CreateMapRequest,
        actor: UserId,
        permissions: &dyn PermissionService,
    ) -> Result<MapMeta> {
        req.validate()?;

        let edits = req.edits();
        if edits.is_empty() {
            return Err(StorageError::Validation(
                "A map must be placed on at least one list".to_string(),
            ));
        }
        let grant = FormatGrant::resolve(permissions, actor, Capability::EditMap).await?;
        let edits = authorize_edits(edits, &grant)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO maps (code, name, preview_url, notes)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&req.code)
        .bind(&req.name)
        .bind(&req.preview_url)
        .bind(&req.notes)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let err = StorageError::from(e);
            if err.is_unique_violation() {
                StorageError::ConstraintViolation("Map code already exists".to_string())
            } else {
                err
            }
        })?;

        apply_edits(&mut *tx, &req.code, &edits).await?;
        let meta = versioned::latest::<MapMeta, _>(&mut *tx, req.code.as_str())
            .await?
            .ok_or(StorageError::NotFound)?;

        tx.commit().await?;

        tracing::info!(code = %req.code, actor, "Created map");
        Ok(meta)
    }

    /// Change a map's list fields. Fields the actor may not edit are
    /// ignored.
    pub async fn update(
        &self,
        code: &str,
        req: &UpdateMapRequest,
        actor: UserId,
        permissions: &dyn PermissionService,
    ) -> Result<Option<MapMeta>> {
        let grant = FormatGrant::resolve(permissions, actor, Capability::EditMap).await?;
        let edits = authorize_edits(req.edits(), &grant)?;

        self.write(code, &edits).await
    }

    /// Take a map off every list the actor may delete from. The map is
    /// deleted once no list holds it.
    pub async fn delete(
        &self,
        code: &str,
        actor: UserId,
        permissions: &dyn PermissionService,
    ) -> Result<Option<MapMeta>> {
        let grant = FormatGrant::resolve(permissions, actor, Capability::DeleteMap).await?;
        let edits = ListField::ALL
            .into_iter()
            .map(|field| FieldEdit {
                field,
                change: FieldChange::Clear,
            })
            .collect();
        let edits = authorize_edits(edits, &grant)?;

        self.write(code, &edits).await
    }

    async fn write(&self, code: &str, edits: &[FieldEdit]) -> Result<Option<MapMeta>> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM maps WHERE code = $1)")
            .bind(code)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(StorageError::NotFound);
        }

        apply_edits(&mut *tx, code, edits).await?;
        let meta = versioned::latest::<MapMeta, _>(&mut *tx, code).await?;

        tx.commit().await?;
        Ok(meta)
    }
}

/// Applies `edits` to `target` inside the caller's transaction and appends
/// the resulting versions.
///
/// Field locks are taken first, in format order, then the rows of every map
/// that changes, in code order. The latest versions are read again once the
/// rows are locked so that writers of other fields are not overwritten.
async fn apply_edits(
    conn: &mut PgConnection,
    target: &str,
    edits: &[FieldEdit],
) -> Result<Vec<NewMapMeta>> {
    if edits.is_empty() {
        return Ok(Vec::new());
    }

    lock_fields(conn, &touched_fields(edits)).await?;

    let snapshot: Vec<MapMeta> = versioned::all_latest::<MapMeta>(&mut *conn)
        .await?
        .into_iter()
        .filter(MapMeta::is_listed)
        .collect();

    let deltas = plan_map_edits(&snapshot, target, edits)?;
    if deltas.is_empty() {
        return Ok(Vec::new());
    }

    let codes = deltas.codes();
    sqlx::query_scalar::<_, String>(
        "SELECT code FROM maps WHERE code = ANY($1) ORDER BY code FOR UPDATE",
    )
    .bind(&codes)
    .fetch_all(&mut *conn)
    .await?;

    let latest: HashMap<String, MapMeta> = versioned::latest_for::<MapMeta, _>(&mut *conn, &codes)
        .await?
        .into_iter()
        .map(|meta| (meta.code.clone(), meta))
        .collect();

    let at = Utc::now();
    let versions = materialize(&latest, &deltas, at);
    insert_versions(conn, &versions, at).await?;

    tracing::info!(
        code = target,
        fields = edits.len(),
        versions = versions.len(),
        "Applied map list edits"
    );
    Ok(versions)
}

async fn lock_fields(conn: &mut PgConnection, fields: &[ListField]) -> Result<()> {
    let mut formats: Vec<i32> = fields.iter().map(|field| field.format()).collect();
    formats.sort_unstable();
    formats.dedup();

    for format in formats {
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(FIELD_LOCK_CLASS)
            .bind(format)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn insert_versions(
    conn: &mut PgConnection,
    versions: &[NewMapMeta],
    at: DateTime<Utc>,
) -> Result<()> {
    if versions.is_empty() {
        return Ok(());
    }

    let mut query = QueryBuilder::new(
        r#"
        INSERT INTO map_list_meta (
            code, placement_curver, placement_allver, difficulty,
            botb_difficulty, remake_of, created_at, deleted_at
        )
        "#,
    );
    query.push_values(versions, |mut row, version| {
        row.push_bind(&version.code)
            .push_bind(version.placement_curver)
            .push_bind(version.placement_allver)
            .push_bind(version.difficulty)
            .push_bind(version.botb_difficulty)
            .push_bind(version.remake_of)
            .push_bind(at)
            .push_bind(version.deleted_at);
    });

    query.build().execute(conn).await.map_err(|e| {
        let err = StorageError::from(e);
        if err.is_foreign_key_violation() {
            StorageError::Validation("remake_of must reference an existing retro map".to_string())
        } else {
            err
        }
    })?;

    Ok(())
}

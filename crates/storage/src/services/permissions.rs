//! Capability checks against the external permission service.
//!
//! Map edits are authorized field by field: each list field belongs to one
//! format, and a caller may hold a capability for some formats only. The
//! fields they are not allowed to touch are dropped from the request rather
//! than failing it, unless nothing at all is left.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::dto::map::FieldEdit;
use crate::error::{Result, StorageError};
use crate::models::{FormatId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    EditMap,
    DeleteMap,
    EditCompletion,
    DeleteCompletion,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EditMap => "edit:map",
            Self::DeleteMap => "delete:map",
            Self::EditCompletion => "edit:completion",
            Self::DeleteCompletion => "delete:completion",
        }
    }
}

/// Query contract of the permission/role service.
#[async_trait]
pub trait PermissionService: Send + Sync {
    /// Whether `user` holds `capability` for `format`, or globally when
    /// `format` is `None`.
    async fn user_has_capability(
        &self,
        user: UserId,
        capability: Capability,
        format: Option<FormatId>,
    ) -> Result<bool>;

    /// Every format for which `user` holds `capability`.
    async fn formats_granting_capability(
        &self,
        user: UserId,
        capability: Capability,
    ) -> Result<Vec<FormatId>>;
}

/// The set of formats a capability covers for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatGrant {
    All,
    Formats(HashSet<FormatId>),
}

impl FormatGrant {
    pub async fn resolve(
        permissions: &dyn PermissionService,
        user: UserId,
        capability: Capability,
    ) -> Result<Self> {
        if permissions
            .user_has_capability(user, capability, None)
            .await?
        {
            return Ok(FormatGrant::All);
        }

        let formats = permissions
            .formats_granting_capability(user, capability)
            .await?;
        Ok(FormatGrant::Formats(formats.into_iter().collect()))
    }

    pub fn covers(&self, format: FormatId) -> bool {
        match self {
            FormatGrant::All => true,
            FormatGrant::Formats(formats) => formats.contains(&format),
        }
    }

    /// Fails with `PermissionDenied` unless `format` is covered.
    pub fn require(&self, format: FormatId) -> Result<()> {
        if self.covers(format) {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied)
        }
    }
}

/// Keeps the edits whose field's format is covered by `grant`.
///
/// A non-empty request with nothing authorized is rejected; an empty request
/// stays empty.
pub fn authorize_edits(edits: Vec<FieldEdit>, grant: &FormatGrant) -> Result<Vec<FieldEdit>> {
    if edits.is_empty() {
        return Ok(edits);
    }

    let requested = edits.len();
    let authorized: Vec<FieldEdit> = edits
        .into_iter()
        .filter(|edit| grant.covers(edit.field.format()))
        .collect();

    if authorized.is_empty() {
        return Err(StorageError::PermissionDenied);
    }

    if authorized.len() < requested {
        tracing::debug!(
            requested,
            authorized = authorized.len(),
            "Dropping unauthorized field edits"
        );
    }

    Ok(authorized)
}

/// In-memory permission service: a fixed list of grants.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    grants: Vec<(UserId, Capability, Option<FormatId>)>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `capability` to `user` for `format`, or for every format when
    /// `format` is `None`.
    pub fn grant(mut self, user: UserId, capability: Capability, format: Option<FormatId>) -> Self {
        self.grants.push((user, capability, format));
        self
    }

    /// Grants every capability on every format.
    pub fn superuser(self, user: UserId) -> Self {
        [
            Capability::EditMap,
            Capability::DeleteMap,
            Capability::EditCompletion,
            Capability::DeleteCompletion,
        ]
        .into_iter()
        .fold(self, |perms, capability| perms.grant(user, capability, None))
    }
}

#[async_trait]
impl PermissionService for StaticPermissions {
    async fn user_has_capability(
        &self,
        user: UserId,
        capability: Capability,
        format: Option<FormatId>,
    ) -> Result<bool> {
        Ok(self.grants.iter().any(|(u, c, f)| {
            *u == user && *c == capability && (f.is_none() || (format.is_some() && *f == format))
        }))
    }

    async fn formats_granting_capability(
        &self,
        user: UserId,
        capability: Capability,
    ) -> Result<Vec<FormatId>> {
        let mut formats: Vec<FormatId> = self
            .grants
            .iter()
            .filter(|(u, c, _)| *u == user && *c == capability)
            .filter_map(|(_, _, f)| *f)
            .collect();
        formats.sort_unstable();
        formats.dedup();
        Ok(formats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::map::FieldChange;
    use crate::models::ListField;
    use crate::models::format::{EXPERT_LIST, MAPLIST};

    fn edit(field: ListField) -> FieldEdit {
        FieldEdit {
            field,
            change: FieldChange::Clear,
        }
    }

    #[tokio::test]
    async fn test_global_grant_covers_everything() {
        let perms = StaticPermissions::new().grant(1, Capability::EditMap, None);
        let grant = FormatGrant::resolve(&perms, 1, Capability::EditMap).await.unwrap();

        assert_eq!(grant, FormatGrant::All);
        assert!(grant.covers(MAPLIST));
        assert!(grant.covers(EXPERT_LIST));
    }

    #[tokio::test]
    async fn test_scoped_grant_covers_only_its_formats() {
        let perms = StaticPermissions::new()
            .grant(1, Capability::EditMap, Some(EXPERT_LIST))
            .grant(2, Capability::EditMap, None);
        let grant = FormatGrant::resolve(&perms, 1, Capability::EditMap).await.unwrap();

        assert!(grant.covers(EXPERT_LIST));
        assert!(!grant.covers(MAPLIST));
        assert!(grant.require(MAPLIST).is_err());

        let nothing = FormatGrant::resolve(&perms, 1, Capability::DeleteMap).await.unwrap();
        assert_eq!(nothing, FormatGrant::Formats(HashSet::new()));
    }

    #[test]
    fn test_unauthorized_edits_are_dropped_silently() {
        let grant = FormatGrant::Formats(HashSet::from([EXPERT_LIST]));
        let edits = vec![edit(ListField::PlacementCurver), edit(ListField::Difficulty)];

        let kept = authorize_edits(edits, &grant).unwrap();
        assert_eq!(kept, vec![edit(ListField::Difficulty)]);
    }

    #[test]
    fn test_nothing_authorized_is_denied() {
        let grant = FormatGrant::Formats(HashSet::from([EXPERT_LIST]));
        let edits = vec![edit(ListField::PlacementCurver), edit(ListField::RemakeOf)];

        assert!(matches!(
            authorize_edits(edits, &grant),
            Err(StorageError::PermissionDenied)
        ));
        assert!(authorize_edits(Vec::new(), &grant).unwrap().is_empty());
    }
}

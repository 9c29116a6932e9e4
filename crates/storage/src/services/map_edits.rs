//! Planning of map list edits.
//!
//! Planning happens in two steps so the repository can take its locks in a
//! fixed order. [`plan_map_edits`] reads the ladders (under the field locks)
//! and decides which field of which map takes which value. [`materialize`]
//! then applies those deltas on top of each affected map's freshly locked
//! latest version and yields the versions to append, one per map.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use super::placement::plan_shifts;
use crate::dto::map::{FieldChange, FieldEdit};
use crate::error::{Result, StorageError};
use crate::models::format::TIER_COUNT;
use crate::models::{FieldKind, ListField, MapMeta, NewMapMeta};

/// Field values to write, per map code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapDeltas {
    changes: BTreeMap<String, BTreeMap<ListField, Option<i32>>>,
}

impl MapDeltas {
    fn set(&mut self, code: &str, field: ListField, value: Option<i32>) {
        self.changes
            .entry(code.to_string())
            .or_default()
            .insert(field, value);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Codes of every map that may receive a new version, in lock order.
    pub fn codes(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }

    pub fn get(&self, code: &str, field: ListField) -> Option<Option<i32>> {
        self.changes.get(code).and_then(|fields| fields.get(&field).copied())
    }
}

/// Fields a set of edits needs exclusive access to, in lock order.
pub fn touched_fields(edits: &[FieldEdit]) -> Vec<ListField> {
    edits
        .iter()
        .map(|edit| edit.field)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Decides every field value that changes when `edits` are applied to
/// `target`.
///
/// `snapshot` holds the latest live version of every listed map. Each edit is
/// planned against it independently: list fields never influence each other.
pub fn plan_map_edits(snapshot: &[MapMeta], target: &str, edits: &[FieldEdit]) -> Result<MapDeltas> {
    let mut deltas = MapDeltas::default();
    let current = snapshot.iter().find(|meta| meta.code == target);

    for edit in edits {
        let field = edit.field;
        let existing = current.and_then(|meta| meta.field(field));

        match field.kind() {
            FieldKind::Dense => {
                let ladder: Vec<(&str, i32)> = snapshot
                    .iter()
                    .filter_map(|meta| meta.field(field).map(|rank| (meta.code.as_str(), rank)))
                    .collect();
                let requested = edit.change.apply(existing);

                for shift in plan_shifts(field, &ladder, &target, requested)? {
                    deltas.set(shift.key, field, shift.to);
                }
            }
            FieldKind::Tier => {
                if let FieldChange::Set(tier) = edit.change
                    && !(0..TIER_COUNT).contains(&tier)
                {
                    return Err(StorageError::Validation(format!(
                        "{field} must be between 0 and {}",
                        TIER_COUNT - 1
                    )));
                }
                deltas.set(target, field, edit.change.apply(existing));
            }
            FieldKind::Singleton => {
                if let FieldChange::Set(reference) = edit.change {
                    for holder in snapshot
                        .iter()
                        .filter(|meta| meta.code != target && meta.field(field) == Some(reference))
                    {
                        tracing::info!(
                            field = %field,
                            reference,
                            from = %holder.code,
                            to = %target,
                            "Reassigning singleton reference"
                        );
                        deltas.set(&holder.code, field, None);
                    }
                }
                deltas.set(target, field, edit.change.apply(existing));
            }
        }
    }

    Ok(deltas)
}

/// Builds the versions to append from `deltas` and each map's latest version.
///
/// Maps whose values do not actually change get no version. A version with
/// no list field set is a deleted version; one with any field set is live.
pub fn materialize(
    latest: &HashMap<String, MapMeta>,
    deltas: &MapDeltas,
    at: DateTime<Utc>,
) -> Vec<NewMapMeta> {
    let mut versions = Vec::new();

    for (code, fields) in &deltas.changes {
        let current = latest.get(code);
        let unchanged = NewMapMeta::from_current(code, current);

        let mut draft = unchanged.clone();
        for (field, value) in fields {
            draft.set_field(*field, *value);
        }

        draft.deleted_at = if draft.is_listed() {
            None
        } else {
            current
                .filter(|meta| !meta.is_listed())
                .and_then(|meta| meta.deleted_at)
                .or(Some(at))
        };

        let is_noop = match current {
            Some(_) => draft == unchanged,
            None => !draft.is_listed(),
        };
        if !is_noop {
            versions.push(draft);
        }
    }

    versions
}

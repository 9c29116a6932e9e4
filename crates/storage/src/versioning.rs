//! Point-in-time resolution over append-only meta rows.
//!
//! Map and completion metadata are never edited in place: every change is a
//! new row. Given the full history of one entity, the row in effect at a
//! timestamp is the latest one created at or before it (ties broken by row
//! id). That row may itself carry a `deleted_at` that has already passed, in
//! which case the entity exists but is deleted as of the timestamp.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A row in an append-only version history.
pub trait Versioned {
    fn version_id(&self) -> i64;
    fn created_at(&self) -> DateTime<Utc>;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    /// Whether this row, once selected, counts as deleted at `at`.
    fn is_deleted_at(&self, at: DateTime<Utc>) -> bool {
        self.deleted_at().is_some_and(|deleted| deleted <= at)
    }
}

/// The resolved state of an entity at a reference timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "version", rename_all = "lowercase")]
pub enum Version<T> {
    Active(T),
    Deleted(T),
}

impl<T: Versioned> Version<T> {
    /// Classifies an already selected row against the reference timestamp.
    pub fn classify(row: T, at: DateTime<Utc>) -> Self {
        if row.is_deleted_at(at) {
            Version::Deleted(row)
        } else {
            Version::Active(row)
        }
    }
}

impl<T> Version<T> {
    pub fn row(&self) -> &T {
        match self {
            Version::Active(row) | Version::Deleted(row) => row,
        }
    }

    pub fn into_row(self) -> T {
        match self {
            Version::Active(row) | Version::Deleted(row) => row,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Version::Deleted(_))
    }

    pub fn active(&self) -> Option<&T> {
        match self {
            Version::Active(row) => Some(row),
            Version::Deleted(_) => None,
        }
    }

    pub fn into_active(self) -> Option<T> {
        match self {
            Version::Active(row) => Some(row),
            Version::Deleted(_) => None,
        }
    }

    /// Transforms the row while keeping its state.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Version<U> {
        match self {
            Version::Active(row) => Version::Active(f(row)),
            Version::Deleted(row) => Version::Deleted(f(row)),
        }
    }
}

/// Picks the version of a single entity in effect at `at`.
///
/// Returns `None` when no row had been created yet, meaning the entity did
/// not exist at that time.
pub fn resolve_as_of<T, I>(rows: I, at: DateTime<Utc>) -> Option<Version<T>>
where
    T: Versioned,
    I: IntoIterator<Item = T>,
{
    rows.into_iter()
        .filter(|row| row.created_at() <= at)
        .max_by_key(|row| (row.created_at(), row.version_id()))
        .map(|row| Version::classify(row, at))
}

/// Picks the newest version regardless of time, as write paths do.
pub fn resolve_latest<T, I>(rows: I) -> Option<T>
where
    T: Versioned,
    I: IntoIterator<Item = T>,
{
    rows.into_iter()
        .max_by_key(|row| (row.created_at(), row.version_id()))
}

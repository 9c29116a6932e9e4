use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::format::FormatId;
use crate::versioning::Versioned;

pub type UserId = i64;

/// Immutable identity of a submitted run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Completion {
    pub id: i64,
    pub map: String,
    pub submitted_at: DateTime<Utc>,
    pub subm_notes: Option<String>,
    pub copied_from: Option<i64>,
}

/// One historical state of a completion's judging metadata.
///
/// `lcc_leftover` is joined in from `least_cost_chimps` when the row is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CompletionMeta {
    pub id: i64,
    pub completion: i64,
    pub format: FormatId,
    pub black_border: bool,
    pub no_geraldo: bool,
    pub lcc: Option<i64>,
    pub lcc_leftover: Option<i32>,
    pub accepted_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CompletionMeta {
    pub fn is_accepted(&self) -> bool {
        self.accepted_by.is_some()
    }
}

impl Versioned for CompletionMeta {
    fn version_id(&self) -> i64 {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// A completion version together with the users who took part in it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompletionState {
    pub completion: Completion,
    pub meta: CompletionMeta,
    pub players: Vec<UserId>,
}

/// Field values of a completion version about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompletionMeta {
    pub completion: i64,
    pub format: FormatId,
    pub black_border: bool,
    pub no_geraldo: bool,
    pub lcc: Option<i64>,
    pub accepted_by: Option<UserId>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&CompletionMeta> for NewCompletionMeta {
    fn from(meta: &CompletionMeta) -> Self {
        Self {
            completion: meta.completion,
            format: meta.format,
            black_border: meta.black_border,
            no_geraldo: meta.no_geraldo,
            lcc: meta.lcc,
            accepted_by: meta.accepted_by,
            deleted_at: meta.deleted_at,
        }
    }
}

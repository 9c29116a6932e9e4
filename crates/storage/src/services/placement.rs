//! Dense ladder maintenance.
//!
//! A dense ladder assigns the positions `1..=N` to exactly the N maps that
//! hold the field. Every insert, move or clear is expressed as the full list
//! of position changes it causes, so the caller can write them all in one
//! transaction and nobody ever observes a gap or a duplicate.

use std::collections::BTreeMap;

use crate::error::{Result, StorageError};
use crate::models::ListField;

/// A position change for one ladder member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankShift<K> {
    pub key: K,
    pub from: Option<i32>,
    pub to: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOp {
    Unchanged,
    Insert { at: i32 },
    Move { from: i32, to: i32 },
    Clear { from: i32 },
}

impl PlacementOp {
    pub fn between(current: Option<i32>, requested: Option<i32>) -> Self {
        match (current, requested) {
            (None, None) => Self::Unchanged,
            (None, Some(at)) => Self::Insert { at },
            (Some(from), None) => Self::Clear { from },
            (Some(from), Some(to)) if from == to => Self::Unchanged,
            (Some(from), Some(to)) => Self::Move { from, to },
        }
    }
}

/// Computes every position change needed to give `target` the `requested`
/// position on `field`'s ladder.
///
/// `ladder` holds every current member with its position. The target is
/// found in it by key; when absent it is treated as unranked.
pub fn plan_shifts<K>(
    field: ListField,
    ladder: &[(K, i32)],
    target: &K,
    requested: Option<i32>,
) -> Result<Vec<RankShift<K>>>
where
    K: Clone + PartialEq,
{
    let current = ladder
        .iter()
        .find(|(key, _)| key == target)
        .map(|(_, rank)| *rank);
    let size = ladder.len() as i32;

    let op = PlacementOp::between(current, requested);
    let mut shifts = Vec::new();

    let mut shift_others = |select: &dyn Fn(i32) -> bool, delta: i32| {
        for (key, rank) in ladder {
            if key != target && select(*rank) {
                shifts.push(RankShift {
                    key: key.clone(),
                    from: Some(*rank),
                    to: Some(rank + delta),
                });
            }
        }
    };

    match op {
        PlacementOp::Unchanged => return Ok(Vec::new()),
        PlacementOp::Insert { at } => {
            check_range(field, at, size + 1)?;
            shift_others(&|rank| rank >= at, 1);
        }
        PlacementOp::Move { from, to } => {
            check_range(field, to, size)?;
            if to < from {
                shift_others(&|rank| rank >= to && rank < from, 1);
            } else {
                shift_others(&|rank| rank > from && rank <= to, -1);
            }
        }
        PlacementOp::Clear { from } => {
            shift_others(&|rank| rank > from, -1);
        }
    }

    shifts.push(RankShift {
        key: target.clone(),
        from: current,
        to: requested,
    });

    Ok(shifts)
}

fn check_range(field: ListField, position: i32, max: i32) -> Result<()> {
    if position < 1 || position > max {
        return Err(StorageError::PositionOutOfRange {
            field: field.column(),
            max,
        });
    }
    Ok(())
}

/// Result of checking a ladder for density.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LadderAudit {
    pub size: usize,
    pub duplicates: Vec<i32>,
    pub missing: Vec<i32>,
    pub out_of_range: Vec<i32>,
}

impl LadderAudit {
    pub fn is_dense(&self) -> bool {
        self.duplicates.is_empty() && self.missing.is_empty() && self.out_of_range.is_empty()
    }
}

/// Checks that `ranks` are exactly `1..=ranks.len()`.
pub fn find_gaps<I>(ranks: I) -> LadderAudit
where
    I: IntoIterator<Item = i32>,
{
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    let mut size = 0usize;
    for rank in ranks {
        *counts.entry(rank).or_default() += 1;
        size += 1;
    }

    let max = size as i32;
    LadderAudit {
        size,
        duplicates: counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(rank, _)| *rank)
            .collect(),
        missing: (1..=max).filter(|rank| !counts.contains_key(rank)).collect(),
        out_of_range: counts
            .keys()
            .copied()
            .filter(|rank| *rank < 1 || *rank > max)
            .collect(),
    }
}

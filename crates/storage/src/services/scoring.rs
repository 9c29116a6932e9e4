//! Leaderboard scoring.
//!
//! Turns the live map list and the live completion versions of a format into
//! per-user scores. Everything here is pure; loading the inputs as of a
//! reference time is the repository's job.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use sqlx::FromRow;

use super::config_store::ConfigStore;
use crate::dto::leaderboard::{LeaderboardEntry, LeaderboardMetric};
use crate::error::{Result, StorageError};
use crate::models::{FieldKind, FormatId, ListField, MapMeta, UserId};

const EXPERT_TIERS: [&str; 5] = ["casual", "medium", "high", "true", "extreme"];
const BOTB_TIERS: [&str; 5] = ["beginner", "intermediate", "advanced", "expert", "extreme"];

/// How much a map is worth before multipliers.
#[derive(Debug, Clone, PartialEq)]
pub enum BasePoints {
    /// Exponential curve over ladder positions `1..=map_count`.
    Curve {
        map_count: i32,
        top: f64,
        bottom: f64,
        slope: f64,
    },
    /// Points per difficulty tier, indexed by tier.
    Tiers(Vec<Decimal>),
    /// Same points for every listed map.
    Flat(Decimal),
}

/// Scoring parameters of one format's leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub field: ListField,
    pub base: BasePoints,
    pub bb_multiplier: Decimal,
    pub ng_multiplier: Decimal,
    pub record_bonus: Decimal,
    pub decimal_digits: u32,
}

impl ScoringConfig {
    /// Reads the parameters for the leaderboard of `field`'s format.
    pub async fn load(store: &dyn ConfigStore, field: ListField) -> Result<Self> {
        let digits = store.get("decimal_digits").await?.as_i64("decimal_digits")?;
        let decimal_digits = u32::try_from(digits)
            .map_err(|_| StorageError::InvalidConfig("decimal_digits cannot be negative".into()))?;

        let (base, bb_multiplier, ng_multiplier, record_bonus) = match field {
            ListField::PlacementCurver | ListField::PlacementAllver => {
                let map_count = store.get("map_count").await?.as_i64("map_count")?;
                let bottom = float(store, "points_bottom_map").await?;
                if !(bottom > 0.0 && bottom.is_finite()) {
                    return Err(StorageError::InvalidConfig(
                        "points_bottom_map must be positive".into(),
                    ));
                }
                let top = float(store, "points_top_map").await?;
                if !(top > 0.0 && top.is_finite()) {
                    return Err(StorageError::InvalidConfig(
                        "points_top_map must be positive".into(),
                    ));
                }
                let slope = float(store, "formula_slope").await?;
                if !slope.is_finite() {
                    return Err(StorageError::InvalidConfig(
                        "formula_slope must be a finite number".into(),
                    ));
                }
                let base = BasePoints::Curve {
                    map_count: i32::try_from(map_count).map_err(|_| {
                        StorageError::InvalidConfig("map_count is out of range".into())
                    })?,
                    top,
                    bottom,
                    slope,
                };
                (
                    base,
                    decimal(store, "points_multi_bb").await?,
                    decimal(store, "points_multi_gerry").await?,
                    decimal(store, "points_extra_lcc").await?,
                )
            }
            ListField::Difficulty => (
                BasePoints::Tiers(load_tiers(store, "exp_points", &EXPERT_TIERS).await?),
                decimal(store, "exp_bb_multi").await?,
                decimal(store, "exp_nogerry_multi").await?,
                decimal(store, "exp_lcc_extra").await?,
            ),
            ListField::BotbDifficulty => (
                BasePoints::Tiers(load_tiers(store, "botb_points", &BOTB_TIERS).await?),
                decimal(store, "botb_bb_multi").await?,
                decimal(store, "botb_nogerry_multi").await?,
                decimal(store, "botb_lcc_extra").await?,
            ),
            ListField::RemakeOf => (
                BasePoints::Flat(decimal(store, "nostalgia_points").await?),
                decimal(store, "nostalgia_bb_multi").await?,
                decimal(store, "nostalgia_nogerry_multi").await?,
                decimal(store, "nostalgia_lcc_extra").await?,
            ),
        };

        Ok(Self {
            field,
            base,
            bb_multiplier,
            ng_multiplier,
            record_bonus,
            decimal_digits,
        })
    }

    /// Base points of a map, or `None` when the map is not part of this
    /// format's pool.
    pub fn base_points(&self, meta: &MapMeta) -> Option<Decimal> {
        let value = meta.field(self.field)?;

        match (&self.base, self.field.kind()) {
            (
                BasePoints::Curve {
                    map_count,
                    top,
                    bottom,
                    slope,
                },
                FieldKind::Dense,
            ) => (1..=*map_count).contains(&value).then(|| {
                curve_points(value, *map_count, *top, *bottom, *slope, self.decimal_digits)
            }),
            (BasePoints::Tiers(points), FieldKind::Tier) => {
                usize::try_from(value).ok().and_then(|tier| points.get(tier)).copied()
            }
            (BasePoints::Flat(points), _) => Some(*points),
            _ => None,
        }
    }

    /// Multiplier earned by black border and/or no Geraldo, at least 1.
    pub fn multiplier(&self, black_border: bool, no_geraldo: bool) -> Decimal {
        let multiplier = match (black_border, no_geraldo) {
            (true, true) => self.bb_multiplier * self.ng_multiplier,
            (true, false) => self.bb_multiplier,
            (false, true) => self.ng_multiplier,
            (false, false) => Decimal::ONE,
        };
        multiplier.max(Decimal::ONE)
    }
}

async fn decimal(store: &dyn ConfigStore, name: &str) -> Result<Decimal> {
    store.get(name).await?.as_decimal(name)
}

async fn float(store: &dyn ConfigStore, name: &str) -> Result<f64> {
    store.get(name).await?.as_f64(name)
}

async fn load_tiers(store: &dyn ConfigStore, prefix: &str, tiers: &[&str]) -> Result<Vec<Decimal>> {
    let mut points = Vec::with_capacity(tiers.len());
    for tier in tiers {
        let name = format!("{prefix}_{tier}");
        points.push(decimal(store, &name).await?);
    }
    Ok(points)
}

/// Points of the map at `rank` on a ladder of `count` maps: `top` for the
/// first, `bottom` for the last, exponential in between.
pub fn curve_points(rank: i32, count: i32, top: f64, bottom: f64, slope: f64, digits: u32) -> Decimal {
    if rank < 1 || rank > count {
        return Decimal::ZERO;
    }

    let points = if count == 1 {
        top
    } else {
        let position = 1.0 + f64::from(1 - rank) / f64::from(count - 1);
        bottom * (top / bottom).powf(position.powf(slope))
    };

    Decimal::from_f64(points)
        .unwrap_or_default()
        .round_dp(digits)
}

/// A completion as it stands at the reference time, with its players.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RunRecord {
    pub completion: i64,
    pub map: String,
    pub submitted_at: DateTime<Utc>,
    pub format: FormatId,
    pub black_border: bool,
    pub no_geraldo: bool,
    pub lcc_leftover: Option<i32>,
    pub accepted: bool,
    pub deleted: bool,
    pub players: Vec<UserId>,
}

/// What one user earned on one map, across all their runs on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MapCredit {
    black_border: bool,
    no_geraldo: bool,
    holds_record: bool,
}

/// Finds each map's current least-cost record: the highest leftover,
/// earliest submission on ties.
pub fn current_records<'a, I>(runs: I) -> HashMap<&'a str, &'a RunRecord>
where
    I: IntoIterator<Item = &'a RunRecord>,
{
    let mut records: HashMap<&str, &RunRecord> = HashMap::new();

    for run in runs {
        let Some(leftover) = run.lcc_leftover else {
            continue;
        };
        let better = match records.get(run.map.as_str()) {
            None => true,
            Some(best) => {
                let best_leftover = best.lcc_leftover.unwrap_or(i32::MIN);
                (leftover, std::cmp::Reverse(run.submitted_at), std::cmp::Reverse(run.completion))
                    > (
                        best_leftover,
                        std::cmp::Reverse(best.submitted_at),
                        std::cmp::Reverse(best.completion),
                    )
            }
        };
        if better {
            records.insert(run.map.as_str(), run);
        }
    }

    records
}

/// Computes the standings of one format for one metric.
///
/// `formats` holds the format itself and every rule-subset descendant whose
/// completions count toward it. `maps` are the live map versions and `runs`
/// the completion versions, both resolved at the same reference time.
pub fn compute_leaderboard(
    config: &ScoringConfig,
    formats: &HashSet<FormatId>,
    maps: &[MapMeta],
    runs: &[RunRecord],
    metric: LeaderboardMetric,
) -> Vec<LeaderboardEntry> {
    let pool: HashMap<&str, Decimal> = maps
        .iter()
        .filter_map(|meta| config.base_points(meta).map(|points| (meta.code.as_str(), points)))
        .collect();

    let qualifying: Vec<&RunRecord> = runs
        .iter()
        .filter(|run| {
            run.accepted
                && !run.deleted
                && formats.contains(&run.format)
                && pool.contains_key(run.map.as_str())
        })
        .collect();

    let records = current_records(qualifying.iter().copied());

    let mut credits: BTreeMap<(UserId, &str), MapCredit> = BTreeMap::new();
    for run in &qualifying {
        let holds_record = records
            .get(run.map.as_str())
            .is_some_and(|record| record.completion == run.completion);

        for player in &run.players {
            let credit = credits.entry((*player, run.map.as_str())).or_default();
            credit.black_border |= run.black_border;
            credit.no_geraldo |= run.no_geraldo;
            credit.holds_record |= holds_record;
        }
    }

    let mut scores: BTreeMap<UserId, Decimal> = BTreeMap::new();
    for ((user, map), credit) in credits {
        let earned = match metric {
            LeaderboardMetric::BlackBorder => flag(credit.black_border),
            LeaderboardMetric::NoGeraldo => flag(credit.no_geraldo),
            LeaderboardMetric::Lcc => flag(credit.holds_record),
            LeaderboardMetric::Points => {
                let base = pool.get(map).copied().unwrap_or_default();
                let bonus = if credit.holds_record {
                    config.record_bonus
                } else {
                    Decimal::ZERO
                };
                base * config.multiplier(credit.black_border, credit.no_geraldo) + bonus
            }
        };
        *scores.entry(user).or_default() += earned;
    }

    rank_scores(scores)
}

fn flag(set: bool) -> Decimal {
    if set { Decimal::ONE } else { Decimal::ZERO }
}

/// Orders users by score and assigns shared ranks: a user's rank is one plus
/// the number of users with a strictly greater score. Zero scores are left
/// out.
pub fn rank_scores(scores: BTreeMap<UserId, Decimal>) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<(UserId, Decimal)> = scores
        .into_iter()
        .filter(|(_, score)| !score.is_zero())
        .collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut entries = Vec::with_capacity(ordered.len());
    let mut rank = 0i64;
    let mut previous: Option<Decimal> = None;

    for (position, (user_id, score)) in ordered.into_iter().enumerate() {
        if previous != Some(score) {
            rank = position as i64 + 1;
            previous = Some(score);
        }
        entries.push(LeaderboardEntry {
            user_id,
            score,
            rank,
        });
    }

    entries
}

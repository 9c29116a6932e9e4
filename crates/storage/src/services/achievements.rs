use crate::dto::leaderboard::{LeaderboardEntry, RoleAssignment};
use crate::models::AchievementRole;

/// Picks the single best role a leaderboard entry qualifies for.
///
/// `roles` must all belong to the same `(format, metric)` leaderboard. A
/// `for_first` role needs rank 1; any other role needs the score to reach its
/// threshold. First-place roles win over threshold roles, then the highest
/// threshold wins.
pub fn best_role<'a>(
    roles: &'a [AchievementRole],
    entry: Option<&LeaderboardEntry>,
) -> Option<&'a AchievementRole> {
    let entry = entry?;

    roles
        .iter()
        .filter(|role| {
            if role.for_first {
                entry.rank == 1
            } else {
                entry.score >= role.threshold.into()
            }
        })
        .max_by_key(|role| (role.for_first, role.threshold, std::cmp::Reverse(role.id)))
}

/// Best role for every user on a leaderboard; users who qualify for none
/// are left out.
pub fn assign_all(
    leaderboard: &[LeaderboardEntry],
    roles: &[AchievementRole],
) -> Vec<RoleAssignment> {
    leaderboard
        .iter()
        .filter_map(|entry| {
            best_role(roles, Some(entry)).map(|role| RoleAssignment {
                user_id: entry.user_id,
                role: role.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::MAPLIST;
    use rust_decimal::Decimal;

    fn role(id: i32, threshold: i32, for_first: bool) -> AchievementRole {
        AchievementRole {
            id,
            lb_format: MAPLIST,
            lb_type: "points".to_string(),
            threshold,
            for_first,
            name: format!("role-{id}"),
            tooltip: None,
            clr_border: 0,
            clr_inner: 0,
            discord_role: None,
        }
    }

    fn entry(user_id: i64, score: i64, rank: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id,
            score: Decimal::from(score),
            rank,
        }
    }

    fn roles() -> Vec<AchievementRole> {
        vec![role(1, 100, false), role(2, 500, false), role(3, 0, true), role(4, 1000, false)]
    }

    #[test]
    fn test_highest_reached_threshold_wins() {
        let roles = roles();
        assert_eq!(best_role(&roles, Some(&entry(1, 650, 2))).map(|r| r.id), Some(2));
        assert_eq!(best_role(&roles, Some(&entry(1, 500, 3))).map(|r| r.id), Some(2));
        assert_eq!(best_role(&roles, Some(&entry(1, 99, 9))), None);
    }

    #[test]
    fn test_first_place_role_is_preferred() {
        let roles = roles();
        assert_eq!(best_role(&roles, Some(&entry(1, 2000, 1))).map(|r| r.id), Some(3));
    }

    #[test]
    fn test_tied_first_places_both_qualify() {
        let roles = roles();
        let board = vec![entry(1, 300, 1), entry(2, 300, 1), entry(3, 120, 3), entry(4, 10, 4)];

        let assigned: Vec<(i64, i32)> = assign_all(&board, &roles)
            .into_iter()
            .map(|a| (a.user_id, a.role.id))
            .collect();
        assert_eq!(assigned, vec![(1, 3), (2, 3), (3, 1)]);
    }

    #[test]
    fn test_unranked_user_gets_nothing() {
        assert_eq!(best_role(&roles(), None), None);
    }
}

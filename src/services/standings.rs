// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Race standings computation.
//!
//! Pure functions over a flat list of efforts:
//! 1. Reduce efforts to each user's best time per segment
//! 2. Score users by total time (TIME) or placement points (POINTS)
//! 3. Sort into leaderboard order
//!
//! All sorts are stable, so users with equal scores keep the order in which
//! they first appeared in the effort list.

use crate::models::{Effort, ScoringMode, UserStanding};
use std::collections::{HashMap, HashSet};

/// Points awarded per segment by zero-based finishing position.
/// Positions past the end of the table earn nothing.
pub const POINTS_TABLE: [u32; 10] = [10, 8, 6, 5, 4, 3, 2, 1, 1, 1];

/// Points for a zero-based finishing position on one segment.
pub fn points_for_position(position: usize) -> u32 {
    POINTS_TABLE.get(position).copied().unwrap_or(0)
}

/// A user's best time on each segment they attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBestTimes {
    pub user_id: String,
    pub user_name: String,
    pub times: HashMap<String, u32>,
}

/// Best times grouped by user, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct UserEfforts {
    users: Vec<UserBestTimes>,
    index: HashMap<String, usize>,
}

impl UserEfforts {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, user_id: &str) -> Option<&UserBestTimes> {
        self.index.get(user_id).map(|&i| &self.users[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserBestTimes> {
        self.users.iter()
    }

    /// Record a best time directly (used when times were reduced elsewhere).
    pub fn insert(&mut self, user_id: &str, user_name: &str, segment_id: &str, elapsed_time: u32) {
        let user = self.entry(user_id, user_name);
        user.times
            .entry(segment_id.to_string())
            .and_modify(|best| *best = (*best).min(elapsed_time))
            .or_insert(elapsed_time);
    }

    fn entry(&mut self, user_id: &str, user_name: &str) -> &mut UserBestTimes {
        let i = match self.index.get(user_id) {
            Some(&i) => i,
            None => {
                self.users.push(UserBestTimes {
                    user_id: user_id.to_string(),
                    user_name: user_name.to_string(),
                    times: HashMap::new(),
                });
                self.index.insert(user_id.to_string(), self.users.len() - 1);
                self.users.len() - 1
            }
        };
        &mut self.users[i]
    }
}

/// Keep only the minimum elapsed time per (user, segment) pair.
///
/// The per-pair result does not depend on the order of `efforts`. The display
/// name is taken from each user's first effort.
pub fn group_best_efforts_by_user(efforts: &[Effort]) -> UserEfforts {
    let mut grouped = UserEfforts::default();
    for effort in efforts {
        grouped.insert(
            &effort.user_id,
            &effort.user_name,
            &effort.segment_id,
            effort.elapsed_time,
        );
    }
    grouped
}

/// TIME mode: total of best times, lowest first.
///
/// Only users whose attempted segments are exactly the race's segments are
/// ranked. Missing a segment or riding one outside the race leaves a user
/// out without error.
pub fn compute_time_standings(
    user_efforts: &UserEfforts,
    segment_ids: &[String],
) -> Vec<UserStanding> {
    let segments = distinct_segments(segment_ids);
    if segments.is_empty() {
        return Vec::new();
    }

    let mut standings: Vec<UserStanding> = user_efforts
        .iter()
        .filter(|user| user.times.len() == segments.len())
        .filter_map(|user| {
            let score = segments
                .iter()
                .map(|seg| user.times.get(*seg).map(|&t| u64::from(t)))
                .sum::<Option<u64>>()?;

            Some(UserStanding {
                user_id: user.user_id.clone(),
                user_name: user.user_name.clone(),
                times: user.times.clone(),
                points: HashMap::new(),
                score,
            })
        })
        .collect();

    standings.sort_by_key(|s| s.score);
    standings
}

/// POINTS mode: placement points summed over segments, highest first.
///
/// On each segment the users who attempted it are ranked by time and paid
/// from [`POINTS_TABLE`]. A segment a user never rode adds nothing and gets
/// no entry in their `points` map.
pub fn compute_points_standings(
    user_efforts: &UserEfforts,
    segment_ids: &[String],
) -> Vec<UserStanding> {
    let users: Vec<&UserBestTimes> = user_efforts.iter().collect();
    let mut points: Vec<HashMap<String, u32>> = vec![HashMap::new(); users.len()];

    for segment_id in distinct_segments(segment_ids) {
        let mut ranking: Vec<(usize, u32)> = users
            .iter()
            .enumerate()
            .filter_map(|(i, user)| user.times.get(segment_id).map(|&t| (i, t)))
            .collect();
        ranking.sort_by_key(|&(_, time)| time);

        for (position, (i, _)) in ranking.into_iter().enumerate() {
            points[i].insert(segment_id.clone(), points_for_position(position));
        }
    }

    let mut standings: Vec<UserStanding> = users
        .into_iter()
        .zip(points)
        .map(|(user, points)| {
            let score = points.values().map(|&p| u64::from(p)).sum();
            UserStanding {
                user_id: user.user_id.clone(),
                user_name: user.user_name.clone(),
                times: user.times.clone(),
                points,
                score,
            }
        })
        .collect();

    standings.sort_by(|a, b| b.score.cmp(&a.score));
    standings
}

/// Compute the leaderboard for a race.
pub fn compute_standings(
    efforts: &[Effort],
    segment_ids: &[String],
    mode: ScoringMode,
) -> Vec<UserStanding> {
    let user_efforts = group_best_efforts_by_user(efforts);

    match mode {
        ScoringMode::Time => compute_time_standings(&user_efforts, segment_ids),
        ScoringMode::Points => compute_points_standings(&user_efforts, segment_ids),
    }
}

/// Segment ids in order, with repeats dropped so no segment counts twice.
fn distinct_segments(segment_ids: &[String]) -> Vec<&String> {
    let mut seen = HashSet::new();
    segment_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .collect()
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Derived leaderboard rows.

use serde::Serialize;
use std::collections::HashMap;

/// One user's aggregate result in a race.
///
/// Built fresh by every standings computation and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStanding {
    pub user_id: String,
    pub user_name: String,
    /// Best elapsed time per segment the user completed
    pub times: HashMap<String, u32>,
    /// Points earned per segment (empty in TIME mode)
    pub points: HashMap<String, u32>,
    /// Total time (TIME mode, lower is better) or total points (POINTS mode, higher is better)
    pub score: u64,
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Segment efforts and race scoring modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// One timed attempt by one user on one segment.
///
/// `elapsed_time` is unsigned, so a negative time cannot be constructed or
/// deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Effort {
    /// Opaque user identifier, stable per user
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    /// Display name (not unique)
    #[validate(length(max = 200))]
    pub user_name: String,
    /// Opaque segment identifier
    #[validate(length(min = 1, max = 64))]
    pub segment_id: String,
    /// Elapsed time in seconds
    pub elapsed_time: u32,
}

impl Effort {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        segment_id: impl Into<String>,
        elapsed_time: u32,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            segment_id: segment_id.into(),
            elapsed_time,
        }
    }
}

/// How a race is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScoringMode {
    /// Sum of best times; every segment must be completed. Lower is better.
    Time,
    /// Placement points per segment; partial completion allowed. Higher is better.
    Points,
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::Time => write!(f, "TIME"),
            ScoringMode::Points => write!(f, "POINTS"),
        }
    }
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TIME" => Ok(ScoringMode::Time),
            "POINTS" => Ok(ScoringMode::Points),
            other => Err(format!("unknown scoring mode: {}", other)),
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod credential;
pub mod effort;
pub mod standing;
pub mod user;

pub use credential::StoredCredential;
pub use effort::{Effort, ScoringMode};
pub use standing::UserStanding;
pub use user::{SessionUser, User};

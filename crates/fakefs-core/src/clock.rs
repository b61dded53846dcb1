// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Time source used for stamping entry timestamps

use chrono::{DateTime, Utc};

/// Supplies "now" for every timestamp the engine records. Tests inject a
/// fixed implementation to make time-dependent behavior reproducible.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock source, the default outside tests
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

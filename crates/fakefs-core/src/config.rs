// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for the fake filesystem

use serde::{Deserialize, Serialize};

/// Main filesystem configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FsConfig {
    /// Drive present from the start; also the root of the initial current
    /// directory. Must be a drive letter followed by a colon.
    pub default_drive: String,
    /// Emit change notifications to subscribed sinks.
    pub track_events: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self { default_drive: "C:".to_string(), track_events: true }
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Seeding DSL for pre-populating an engine before first use

use std::fmt;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::FsConfig;
use crate::error::FsResult;
use crate::path::{AbsolutePath, EmptyPathPolicy};
use crate::types::{EntryTimes, FileAttributes};
use crate::vfs::{FakeFs, FsState};

pub(crate) enum Seed {
    Directory(String),
    File { path: String, content: Vec<u8> },
    Attributes { path: String, attributes: FileAttributes },
    Times { path: String, times: EntryTimes },
}

/// Builds a seeded [`FakeFs`]. Seed paths must be absolute; they are
/// validated with the full path grammar at [`build`] time and applied in
/// declaration order, with missing parent chains created implicitly.
///
/// [`build`]: FakeFsBuilder::build
pub struct FakeFsBuilder {
    config: FsConfig,
    clock: Arc<dyn Clock>,
    seeds: Vec<Seed>,
    current_directory: Option<String>,
}

impl FakeFsBuilder {
    pub fn new() -> Self {
        Self {
            config: FsConfig::default(),
            clock: Arc::new(SystemClock),
            seeds: Vec::new(),
            current_directory: None,
        }
    }

    pub fn with_config(mut self, config: FsConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock seeded entries and later operations read "now" from.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mounts an additional drive, e.g. `"D:"`.
    pub fn with_drive(mut self, drive: &str) -> Self {
        self.seeds.push(Seed::Directory(drive.to_string()));
        self
    }

    /// Mounts a network share, e.g. `r"\\server\share"`.
    pub fn with_share(mut self, share: &str) -> Self {
        self.seeds.push(Seed::Directory(share.to_string()));
        self
    }

    pub fn with_directory(mut self, path: &str) -> Self {
        self.seeds.push(Seed::Directory(path.to_string()));
        self
    }

    pub fn with_file(self, path: &str, text: &str) -> Self {
        self.with_file_bytes(path, text.as_bytes().to_vec())
    }

    pub fn with_file_bytes(mut self, path: &str, content: Vec<u8>) -> Self {
        self.seeds.push(Seed::File { path: path.to_string(), content });
        self
    }

    /// Overrides the attributes of an already-declared seed entry.
    pub fn with_attributes(mut self, path: &str, attributes: FileAttributes) -> Self {
        self.seeds.push(Seed::Attributes { path: path.to_string(), attributes });
        self
    }

    /// Overrides all three timestamps of an already-declared seed entry.
    pub fn with_file_times(mut self, path: &str, times: EntryTimes) -> Self {
        self.seeds.push(Seed::Times { path: path.to_string(), times });
        self
    }

    pub fn with_current_directory(mut self, path: &str) -> Self {
        self.current_directory = Some(path.to_string());
        self
    }

    pub(crate) fn push_seed(&mut self, seed: Seed) {
        self.seeds.push(seed);
    }

    /// Validates and applies every seed, first offender wins.
    pub fn build(self) -> FsResult<FakeFs> {
        let mut state = FsState::new(self.config, self.clock)?;
        for seed in self.seeds {
            match seed {
                Seed::Directory(path) => {
                    let path =
                        AbsolutePath::parse(&path, None, EmptyPathPolicy::EmptyOrWhitespace)?;
                    state.seed_directory(&path)?;
                }
                Seed::File { path, content } => {
                    let path =
                        AbsolutePath::parse(&path, None, EmptyPathPolicy::EmptyNameNotLegal)?;
                    state.seed_file(&path, content)?;
                }
                Seed::Attributes { path, attributes } => {
                    let path =
                        AbsolutePath::parse(&path, None, EmptyPathPolicy::EmptyNameNotLegal)?;
                    let id = state.entry_at(&path)?;
                    state.seed_attributes(id, attributes)?;
                }
                Seed::Times { path, times } => {
                    let path =
                        AbsolutePath::parse(&path, None, EmptyPathPolicy::EmptyNameNotLegal)?;
                    let id = state.entry_at(&path)?;
                    state.seed_times(id, times)?;
                }
            }
        }
        let fs = FakeFs::from_state(state);
        if let Some(current) = self.current_directory {
            fs.set_current_directory(&current)?;
        }
        Ok(fs)
    }
}

impl Default for FakeFsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FakeFsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeFsBuilder")
            .field("config", &self.config)
            .field("current_directory", &self.current_directory)
            .finish_non_exhaustive()
    }
}

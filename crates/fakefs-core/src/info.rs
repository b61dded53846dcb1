// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Cached metadata view of a single path

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::FsResult;
use crate::types::{EntryKind, EntryProperties, FileAttributes};
use crate::vfs::FsState;

/// Snapshot view of one path's metadata. The first accessor call captures
/// a snapshot; later calls replay it, including a captured failure, until
/// [`refresh`] recaptures. An entry appearing or vanishing after the
/// capture is invisible until then.
///
/// [`refresh`]: EntryInfo::refresh
pub struct EntryInfo {
    state: Arc<Mutex<FsState>>,
    path: String,
    cached: Mutex<Option<FsResult<EntryProperties>>>,
}

impl EntryInfo {
    pub(crate) fn new(state: Arc<Mutex<FsState>>, path: String) -> Self {
        Self { state, path, cached: Mutex::new(None) }
    }

    fn query(&self) -> FsResult<EntryProperties> {
        self.state.lock().unwrap().properties_query(&self.path)
    }

    fn snapshot(&self) -> FsResult<EntryProperties> {
        let mut cached = self.cached.lock().unwrap();
        cached.get_or_insert_with(|| self.query()).clone()
    }

    /// Drops the cached snapshot and captures a fresh one.
    pub fn refresh(&self) {
        let fresh = self.query();
        *self.cached.lock().unwrap() = Some(fresh);
    }

    /// Path text the view was requested with.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.snapshot().is_ok()
    }

    pub fn kind(&self) -> FsResult<EntryKind> {
        Ok(self.snapshot()?.kind)
    }

    pub fn attributes(&self) -> FsResult<FileAttributes> {
        Ok(self.snapshot()?.attributes)
    }

    pub fn created(&self) -> FsResult<DateTime<Utc>> {
        Ok(self.snapshot()?.created)
    }

    pub fn accessed(&self) -> FsResult<DateTime<Utc>> {
        Ok(self.snapshot()?.accessed)
    }

    pub fn written(&self) -> FsResult<DateTime<Utc>> {
        Ok(self.snapshot()?.written)
    }

    /// Content length; zero for directories.
    pub fn len(&self) -> FsResult<u64> {
        Ok(self.snapshot()?.len)
    }
}

impl fmt::Debug for EntryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryInfo")
            .field("path", &self.path)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

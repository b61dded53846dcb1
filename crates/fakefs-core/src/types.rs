// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for the fake filesystem

use chrono::{DateTime, Utc};

bitflags::bitflags! {
    /// Attribute bits as exposed by the modeled OS.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
        const NORMAL = 0x0080;
        const TEMPORARY = 0x0100;
        const OFFLINE = 0x1000;
    }
}

impl FileAttributes {
    /// Bits that forbid replacing an existing file through create/truncate.
    pub(crate) fn blocks_overwrite(self) -> bool {
        self.intersects(FileAttributes::READ_ONLY | FileAttributes::HIDDEN)
    }

    /// Bits that forbid deleting an entry without the recursive-delete force.
    pub(crate) fn blocks_delete(self) -> bool {
        self.intersects(
            FileAttributes::READ_ONLY | FileAttributes::HIDDEN | FileAttributes::SYSTEM,
        )
    }
}

/// Entry kind as observed through the public surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Creation/access/write timestamps of an entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryTimes {
    pub created: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub written: DateTime<Utc>,
}

impl EntryTimes {
    pub fn all(at: DateTime<Utc>) -> Self {
        Self { created: at, accessed: at, written: at }
    }
}

/// How an open resolves against an existing or missing file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    CreateNew,
    Create,
    Open,
    OpenOrCreate,
    Truncate,
    Append,
}

/// Requested data access for an open stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileAccess {
    Read,
    Write,
    ReadWrite,
}

impl FileAccess {
    pub fn can_read(self) -> bool {
        matches!(self, FileAccess::Read | FileAccess::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, FileAccess::Write | FileAccess::ReadWrite)
    }
}

/// File open options beyond mode and access
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenOptions {
    /// Buffer capacity reserved for fresh creates.
    pub size_hint: u64,
    /// Unlink the entry when the last handle closes.
    pub delete_on_close: bool,
    /// Refuse to share the file with other open handles.
    pub exclusive: bool,
    /// On-the-fly encryption; always refused, kept for call-site parity.
    pub encrypted: bool,
}

/// Directory entry information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub len: u64,
}

/// One-critical-section snapshot of an entry's metadata
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryProperties {
    pub kind: EntryKind,
    pub attributes: FileAttributes,
    pub created: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub written: DateTime<Utc>,
    pub len: u64,
}

/// Event kinds for filesystem change notifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Created { path: String },
    Removed { path: String },
    Modified { path: String },
    Renamed { from: String, to: String },
}

/// Event sink trait for receiving filesystem change notifications.
///
/// Delivery happens inside the engine's critical section; a sink that
/// calls back into the filesystem deadlocks.
pub trait EventSink: Send + Sync {
    fn on_event(&self, evt: &EventKind);
}

/// Opaque event subscription identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_masks() {
        assert!(FileAttributes::READ_ONLY.blocks_overwrite());
        assert!(FileAttributes::HIDDEN.blocks_overwrite());
        assert!(!FileAttributes::ARCHIVE.blocks_overwrite());
        assert!(FileAttributes::SYSTEM.blocks_delete());
        assert!(!(FileAttributes::ARCHIVE | FileAttributes::NORMAL).blocks_delete());
    }

    #[test]
    fn access_capabilities() {
        assert!(FileAccess::Read.can_read());
        assert!(!FileAccess::Read.can_write());
        assert!(FileAccess::ReadWrite.can_read() && FileAccess::ReadWrite.can_write());
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! FakeFS Core: an in-memory filesystem with Windows semantics
//!
//! This crate models drive letters, UNC shares, case-insensitive but
//! case-preserving names, attribute bits, timestamps, sharing rules and
//! host-identical error messages entirely in memory, so code that talks
//! to a filesystem can be exercised deterministically without touching
//! the real disk.

pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod info;
pub mod path;
pub mod stream;
pub mod types;

mod manifest;
mod pattern;
mod resolve;
mod tree;
mod vfs;

// Re-export key types
pub use builder::FakeFsBuilder;
pub use clock::{Clock, SystemClock};
pub use config::FsConfig;
pub use error::{ErrorKind, FsError, FsResult};
pub use info::EntryInfo;
pub use path::{AbsolutePath, EmptyPathPolicy, PathRoot};
pub use stream::FakeFileStream;
pub use types::{
    DirEntry, EntryKind, EntryProperties, EntryTimes, EventKind, EventSink, FileAccess,
    FileAttributes, OpenMode, OpenOptions, SubscriptionId,
};
pub use vfs::FakeFs;

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Tree walkers with per-call-site error selection

use crate::error::{FsError, FsResult};
use crate::path::{AbsolutePath, PathComponent};
use crate::tree::{EntryId, EntryTree};

/// Which error a resolver failure spot raises. Plain selectors instead of
/// closures keep policies `Copy`, comparable and loggable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorSelector {
    DirectoryNotFound,
    FileNotFound,
    NetworkPathNotFound,
    DirectoryNameInvalid,
    AccessDenied,
    PathInvalid,
    PathIsDrive,
    FileInUse,
}

impl ErrorSelector {
    pub(crate) fn build(self, display: &AbsolutePath) -> FsError {
        match self {
            ErrorSelector::DirectoryNotFound => FsError::DirectoryNotFound(display.text()),
            ErrorSelector::FileNotFound => FsError::FileNotFound(display.text()),
            ErrorSelector::NetworkPathNotFound => FsError::NetworkPathNotFound,
            ErrorSelector::DirectoryNameInvalid => FsError::DirectoryNameInvalid,
            ErrorSelector::AccessDenied => FsError::AccessDenied(display.text()),
            ErrorSelector::PathInvalid => FsError::PathInvalid,
            ErrorSelector::PathIsDrive => FsError::PathIsDrive,
            ErrorSelector::FileInUse => FsError::FileInUse(display.text()),
        }
    }
}

/// Error choices for the four failure spots of a directory walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DirectoryErrorPolicy {
    pub network_share_not_found: ErrorSelector,
    pub intermediate_is_file: ErrorSelector,
    pub terminal_is_file: ErrorSelector,
    pub directory_not_found: ErrorSelector,
}

impl Default for DirectoryErrorPolicy {
    fn default() -> Self {
        Self {
            network_share_not_found: ErrorSelector::NetworkPathNotFound,
            intermediate_is_file: ErrorSelector::DirectoryNotFound,
            terminal_is_file: ErrorSelector::DirectoryNotFound,
            directory_not_found: ErrorSelector::DirectoryNotFound,
        }
    }
}

pub(crate) struct DirectoryResolver<'t> {
    tree: &'t EntryTree,
    policy: DirectoryErrorPolicy,
}

impl<'t> DirectoryResolver<'t> {
    pub fn new(tree: &'t EntryTree) -> Self {
        Self { tree, policy: DirectoryErrorPolicy::default() }
    }

    pub fn with_policy(tree: &'t EntryTree, policy: DirectoryErrorPolicy) -> Self {
        Self { tree, policy }
    }

    pub fn resolve(&self, path: &AbsolutePath) -> FsResult<EntryId> {
        self.resolve_as(path, path)
    }

    /// Resolves `path` to a directory entry. `display` feeds error text;
    /// a caller resolving the containing directory of a leaf passes the
    /// full original path there.
    pub fn resolve_as(&self, path: &AbsolutePath, display: &AbsolutePath) -> FsResult<EntryId> {
        let mut cursor = self.resolve_volume(path, display)?;
        for component in path.walk() {
            cursor = self.step(cursor, component, display)?;
        }
        Ok(cursor)
    }

    /// Missing directories fold to `None`; only engine faults error.
    pub fn try_resolve(&self, path: &AbsolutePath) -> FsResult<Option<EntryId>> {
        let Some(mut cursor) = self.tree.root(path.root()) else {
            return Ok(None);
        };
        for component in path.walk() {
            if self.tree.child_file(cursor, component.name)?.is_some() {
                return Ok(None);
            }
            match self.tree.child_dir(cursor, component.name)? {
                Some(next) => cursor = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cursor))
    }

    fn resolve_volume(&self, path: &AbsolutePath, display: &AbsolutePath) -> FsResult<EntryId> {
        match self.tree.root(path.root()) {
            Some(id) => Ok(id),
            None if path.is_local() => Err(self.policy.directory_not_found.build(display)),
            None => Err(self.policy.network_share_not_found.build(display)),
        }
    }

    fn step(
        &self,
        cursor: EntryId,
        component: PathComponent<'_>,
        display: &AbsolutePath,
    ) -> FsResult<EntryId> {
        if self.tree.child_file(cursor, component.name)?.is_some() {
            let selector = if component.is_last {
                self.policy.terminal_is_file
            } else {
                self.policy.intermediate_is_file
            };
            return Err(selector.build(display));
        }
        match self.tree.child_dir(cursor, component.name)? {
            Some(next) => Ok(next),
            None => Err(self.policy.directory_not_found.build(display)),
        }
    }
}

/// Error choices for resolving a path that must name a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FileErrorPolicy {
    pub file_not_found: ErrorSelector,
    pub terminal_is_directory: ErrorSelector,
    pub bare_volume: ErrorSelector,
    pub directory: DirectoryErrorPolicy,
}

impl Default for FileErrorPolicy {
    fn default() -> Self {
        Self {
            file_not_found: ErrorSelector::FileNotFound,
            terminal_is_directory: ErrorSelector::AccessDenied,
            bare_volume: ErrorSelector::PathIsDrive,
            directory: DirectoryErrorPolicy::default(),
        }
    }
}

/// A leaf that resolved to an existing file.
pub(crate) struct ResolvedFile {
    pub parent: EntryId,
    pub file: EntryId,
}

/// Outcome of resolving a create-capable file path: the containing
/// directory is strict, the leaf may or may not exist yet.
pub(crate) struct FileResolution {
    pub parent: EntryId,
    pub existing: Option<EntryId>,
    pub name: String,
}

pub(crate) struct FileResolver<'t> {
    tree: &'t EntryTree,
    policy: FileErrorPolicy,
}

impl<'t> FileResolver<'t> {
    pub fn new(tree: &'t EntryTree) -> Self {
        Self { tree, policy: FileErrorPolicy::default() }
    }

    pub fn with_policy(tree: &'t EntryTree, policy: FileErrorPolicy) -> Self {
        Self { tree, policy }
    }

    pub fn resolve(&self, path: &AbsolutePath) -> FsResult<ResolvedFile> {
        let resolution = self.try_resolve(path)?;
        match resolution.existing {
            Some(file) => Ok(ResolvedFile { parent: resolution.parent, file }),
            None => Err(self.policy.file_not_found.build(path)),
        }
    }

    pub fn try_resolve(&self, path: &AbsolutePath) -> FsResult<FileResolution> {
        let (name, parent_path) = match (path.file_name(), path.parent()) {
            (Some(name), Some(parent)) => (name.to_string(), parent),
            _ => return Err(self.policy.bare_volume.build(path)),
        };
        let parent = DirectoryResolver::with_policy(self.tree, self.policy.directory)
            .resolve_as(&parent_path, path)?;
        if self.tree.child_dir(parent, &name)?.is_some() {
            return Err(self.policy.terminal_is_directory.build(path));
        }
        let existing = self.tree.child_file(parent, &name)?;
        Ok(FileResolution { parent, existing, name })
    }
}

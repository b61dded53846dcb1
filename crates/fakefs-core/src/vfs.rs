// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Engine core: shared state behind the tree lock plus one handler per
//! public operation

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::info::EntryInfo;
use crate::path::{AbsolutePath, EmptyPathPolicy};
use crate::pattern::SearchPattern;
use crate::resolve::{DirectoryErrorPolicy, DirectoryResolver, ErrorSelector, FileResolver};
use crate::stream::FakeFileStream;
use crate::tree::{validate_file_time, EntryId, EntryTree};
use crate::types::{
    DirEntry, EntryKind, EntryProperties, EntryTimes, EventKind, FileAccess, FileAttributes,
    OpenMode, OpenOptions,
};
#[cfg(feature = "events")]
use crate::types::{EventSink, SubscriptionId};

// Content ceiling, the host's limit for array-backed streams.
const MAX_STREAM_LEN: u64 = i32::MAX as u64;
// Largest buffer reservation an open-options size hint can request.
const SIZE_HINT_CAP: u64 = 1 << 16;

/// Key of one open stream in the handle registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct HandleId(u64);

/// Registry record for one open stream. Content lives on the file entry;
/// the cursor is per handle.
#[derive(Debug)]
pub(crate) struct OpenHandle {
    pub entry: EntryId,
    /// Path the stream was opened under, kept for naming and errors.
    pub path: AbsolutePath,
    pub access: FileAccess,
    pub exclusive: bool,
    pub position: u64,
    /// Lowest offset an append stream may seek back to.
    pub append_floor: Option<u64>,
}

fn validate_open_combination(mode: OpenMode, access: FileAccess) -> FsResult<()> {
    let invalid = match mode {
        OpenMode::Append => access != FileAccess::Write,
        OpenMode::CreateNew | OpenMode::Create | OpenMode::Truncate => !access.can_write(),
        OpenMode::Open | OpenMode::OpenOrCreate => false,
    };
    if invalid {
        return Err(FsError::InvalidOpenCombination { mode, access });
    }
    Ok(())
}

/// Which timestamp a time setter targets.
#[derive(Clone, Copy, Debug)]
enum TimeField {
    Created,
    Accessed,
    Written,
}

/// Everything the tree lock guards. Each public operation locks once and
/// runs resolve-then-mutate on `&mut FsState`, so no caller can observe a
/// half-applied change.
pub(crate) struct FsState {
    config: FsConfig,
    tree: EntryTree,
    current_dir: EntryId,
    handles: HashMap<HandleId, OpenHandle>,
    next_handle_id: u64,
    clock: Arc<dyn Clock>,
    #[cfg(feature = "events")]
    event_sinks: HashMap<SubscriptionId, Arc<dyn EventSink>>,
    #[cfg(feature = "events")]
    next_subscription_id: u64,
}

impl FsState {
    pub(crate) fn new(config: FsConfig, clock: Arc<dyn Clock>) -> FsResult<Self> {
        let drive =
            AbsolutePath::parse(&config.default_drive, None, EmptyPathPolicy::EmptyOrWhitespace)?;
        if !drive.is_local() || !drive.is_volume_root() {
            return Err(FsError::PathInvalid);
        }
        let mut tree = EntryTree::new();
        let root = tree.ensure_root(drive.root(), clock.now());
        Ok(Self {
            config,
            tree,
            current_dir: root,
            handles: HashMap::new(),
            next_handle_id: 0,
            clock,
            #[cfg(feature = "events")]
            event_sinks: HashMap::new(),
            #[cfg(feature = "events")]
            next_subscription_id: 0,
        })
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current directory in stored casing; the base for relative input.
    fn base_path(&self) -> FsResult<AbsolutePath> {
        self.tree.path_of(self.current_dir)
    }

    fn parse_path(&self, raw: &str, policy: EmptyPathPolicy) -> FsResult<AbsolutePath> {
        let base = self.base_path()?;
        AbsolutePath::parse(raw, Some(&base), policy)
    }

    #[cfg(feature = "events")]
    fn emit(&self, event: EventKind) {
        if !self.config.track_events {
            return;
        }
        for sink in self.event_sinks.values() {
            sink.on_event(&event);
        }
    }

    #[cfg(not(feature = "events"))]
    fn emit(&self, _event: EventKind) {}

    fn any_handle_on(&self, entry: EntryId) -> bool {
        self.handles.values().any(|handle| handle.entry == entry)
    }

    fn sharing_conflict(&self, entry: EntryId, exclusive_request: bool) -> bool {
        self.handles
            .values()
            .any(|handle| handle.entry == entry && (handle.exclusive || exclusive_request))
    }

    fn handle(&self, id: HandleId) -> FsResult<&OpenHandle> {
        self.handles
            .get(&id)
            .ok_or_else(|| FsError::Internal("stream handle missing from registry".into()))
    }

    fn handle_mut(&mut self, id: HandleId) -> FsResult<&mut OpenHandle> {
        self.handles
            .get_mut(&id)
            .ok_or_else(|| FsError::Internal("stream handle missing from registry".into()))
    }

    // ---- seeding, used before the engine is handed out ----

    /// Creates a directory chain, materializing the volume root on first
    /// use. Seeding bypasses handler rules and emits no events.
    pub(crate) fn seed_directory(&mut self, path: &AbsolutePath) -> FsResult<EntryId> {
        let now = self.now();
        let mut cursor = match self.tree.root(path.root()) {
            Some(id) => id,
            None => self.tree.ensure_root(path.root(), now),
        };
        for component in path.walk() {
            if self.tree.child_file(cursor, component.name)?.is_some() {
                return Err(FsError::AlreadyExists(path.text()));
            }
            cursor = match self.tree.child_dir(cursor, component.name)? {
                Some(next) => next,
                None => self.tree.new_directory(cursor, component.name, now)?,
            };
        }
        Ok(cursor)
    }

    pub(crate) fn seed_file(&mut self, path: &AbsolutePath, content: Vec<u8>) -> FsResult<EntryId> {
        let (Some(name), Some(parent_path)) = (path.file_name(), path.parent()) else {
            return Err(FsError::PathIsDrive);
        };
        let parent = self.seed_directory(&parent_path)?;
        if self.tree.child_any(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists(path.text()));
        }
        let now = self.now();
        self.tree.new_file(parent, name, content, now)
    }

    pub(crate) fn seed_attributes(
        &mut self,
        id: EntryId,
        attributes: FileAttributes,
    ) -> FsResult<()> {
        let is_dir = self.tree.entry(id)?.is_dir();
        self.tree.entry_mut(id)?.attributes = sanitize_attributes(attributes, is_dir);
        Ok(())
    }

    pub(crate) fn seed_times(&mut self, id: EntryId, times: EntryTimes) -> FsResult<()> {
        validate_file_time(times.created)?;
        validate_file_time(times.accessed)?;
        validate_file_time(times.written)?;
        self.tree.entry_mut(id)?.times = times;
        Ok(())
    }

    // ---- generic resolution ----

    /// Resolves a path to an entry of either kind. Misses report the
    /// file-variant NotFound; missing parents the directory variant.
    pub(crate) fn entry_at(&self, path: &AbsolutePath) -> FsResult<EntryId> {
        if path.is_volume_root() {
            return match self.tree.root(path.root()) {
                Some(id) => Ok(id),
                None if path.is_local() => Err(FsError::DirectoryNotFound(path.text())),
                None => Err(FsError::NetworkPathNotFound),
            };
        }
        let (Some(name), Some(parent_path)) = (path.file_name(), path.parent()) else {
            return Err(FsError::PathIsDrive);
        };
        let parent = DirectoryResolver::new(&self.tree).resolve_as(&parent_path, path)?;
        match self.tree.child_any(parent, name)? {
            Some(id) => Ok(id),
            None => Err(FsError::FileNotFound(path.text())),
        }
    }

    fn find_kind(&self, raw: &str) -> Option<EntryKind> {
        let path = self.parse_path(raw, EmptyPathPolicy::EmptyNameNotLegal).ok()?;
        if path.is_volume_root() {
            self.tree.root(path.root())?;
            return Some(EntryKind::Directory);
        }
        let parent_path = path.parent()?;
        let parent = DirectoryResolver::new(&self.tree).try_resolve(&parent_path).ok()??;
        let id = self.tree.child_any(parent, path.file_name()?).ok()??;
        Some(self.tree.entry(id).ok()?.kind())
    }

    fn properties_at(&self, path: &AbsolutePath) -> FsResult<EntryProperties> {
        let id = self.entry_at(path)?;
        Ok(self.tree.entry(id)?.properties())
    }

    pub(crate) fn properties_query(&self, raw: &str) -> FsResult<EntryProperties> {
        let path = self.parse_path(raw, EmptyPathPolicy::EmptyNameNotLegal)?;
        self.properties_at(&path)
    }

    // ---- file open/create ----

    fn open_file(
        &mut self,
        path: &AbsolutePath,
        mode: OpenMode,
        access: FileAccess,
        options: OpenOptions,
    ) -> FsResult<HandleId> {
        if options.encrypted {
            return Err(FsError::AccessDenied(path.text()));
        }
        let resolution = FileResolver::new(&self.tree).try_resolve(path)?;
        let now = self.now();

        let entry = match resolution.existing {
            Some(existing) => {
                match mode {
                    OpenMode::CreateNew => {
                        return Err(FsError::FileAlreadyExists(path.text()));
                    }
                    OpenMode::Create => {
                        if self.tree.entry(existing)?.attributes.blocks_overwrite() {
                            return Err(FsError::AccessDenied(path.text()));
                        }
                    }
                    _ => {
                        if access.can_write()
                            && self
                                .tree
                                .entry(existing)?
                                .attributes
                                .contains(FileAttributes::READ_ONLY)
                        {
                            return Err(FsError::AccessDenied(path.text()));
                        }
                    }
                }
                if self.tree.file_node(existing)?.delete_on_close {
                    return Err(FsError::AccessDenied(path.text()));
                }
                if self.sharing_conflict(existing, options.exclusive) {
                    return Err(FsError::FileInUse(path.text()));
                }
                if matches!(mode, OpenMode::Create | OpenMode::Truncate) {
                    self.tree.file_node_mut(existing)?.content.clear();
                    let times = &mut self.tree.entry_mut(existing)?.times;
                    times.written = now;
                    times.accessed = now;
                    let canonical = self.tree.path_of(existing)?.text();
                    self.emit(EventKind::Modified { path: canonical });
                } else {
                    self.tree.entry_mut(existing)?.times.accessed = now;
                }
                existing
            }
            None => match mode {
                OpenMode::Open | OpenMode::Truncate => {
                    return Err(FsError::FileNotFound(path.text()));
                }
                _ => {
                    let created = self.tree.new_file(
                        resolution.parent,
                        &resolution.name,
                        Vec::with_capacity(options.size_hint.min(SIZE_HINT_CAP) as usize),
                        now,
                    )?;
                    self.tree.touch_children_changed(resolution.parent, now)?;
                    let canonical = self.tree.path_of(created)?.text();
                    self.emit(EventKind::Created { path: canonical });
                    created
                }
            },
        };

        let file = self.tree.file_node_mut(entry)?;
        file.open_handles += 1;
        if options.delete_on_close {
            file.delete_on_close = true;
        }
        let append_floor = match mode {
            OpenMode::Append => Some(file.content.len() as u64),
            _ => None,
        };

        self.next_handle_id += 1;
        let handle = HandleId(self.next_handle_id);
        self.handles.insert(
            handle,
            OpenHandle {
                entry,
                path: path.clone(),
                access,
                exclusive: options.exclusive,
                position: append_floor.unwrap_or(0),
                append_floor,
            },
        );
        Ok(handle)
    }

    // ---- deletion ----

    fn delete_file_at(&mut self, path: &AbsolutePath, force: bool) -> FsResult<()> {
        let resolved = FileResolver::new(&self.tree).resolve(path)?;
        self.remove_file_entry(resolved.parent, resolved.file, path, force)
    }

    fn remove_file_entry(
        &mut self,
        parent: EntryId,
        file: EntryId,
        display: &AbsolutePath,
        force: bool,
    ) -> FsResult<()> {
        if self.tree.entry(file)?.attributes.blocks_delete() && !force {
            return Err(FsError::AccessDenied(display.text()));
        }
        let node = self.tree.file_node(file)?;
        if node.open_handles > 0 {
            if node.delete_on_close {
                // Removal is already pending at last close.
                return Ok(());
            }
            return Err(FsError::FileInUse(display.text()));
        }
        let canonical = self.tree.path_of(file)?.text();
        self.tree.unlink_child(parent, file)?;
        self.tree.discard(file);
        let now = self.now();
        self.tree.touch_children_changed(parent, now)?;
        self.emit(EventKind::Removed { path: canonical });
        Ok(())
    }

    fn delete_directory_at(&mut self, path: &AbsolutePath, recursive: bool) -> FsResult<()> {
        let policy = DirectoryErrorPolicy {
            terminal_is_file: ErrorSelector::DirectoryNameInvalid,
            ..DirectoryErrorPolicy::default()
        };
        let target = DirectoryResolver::with_policy(&self.tree, policy).resolve(path)?;
        let Some(parent) = self.tree.entry(target)?.parent else {
            return Err(FsError::AccessDenied(path.text()));
        };
        if self.tree.entry(target)?.attributes.blocks_delete() {
            return Err(FsError::AccessDenied(path.text()));
        }
        let current_path = self.base_path()?;
        let target_path = self.tree.path_of(target)?;
        if current_path.is_beneath(&target_path) {
            return Err(FsError::FileInUse(path.text()));
        }
        let children = self.tree.merged_children(target)?;
        if !children.is_empty() {
            if !recursive {
                return Err(FsError::DirectoryNotEmpty);
            }
            // Validate before mutating so a blocked subtree leaves the
            // tree untouched.
            self.assert_subtree_closed(target, path)?;
            self.remove_subtree(target)?;
        }
        let canonical = target_path.text();
        self.tree.unlink_child(parent, target)?;
        self.tree.discard(target);
        let now = self.now();
        self.tree.touch_children_changed(parent, now)?;
        self.emit(EventKind::Removed { path: canonical });
        Ok(())
    }

    fn assert_subtree_closed(&self, dir: EntryId, display: &AbsolutePath) -> FsResult<()> {
        for child in self.tree.merged_children(dir)? {
            let entry = self.tree.entry(child)?;
            let child_display = display.join(&entry.name);
            match entry.as_file() {
                Some(file) => {
                    if file.open_handles > 0 {
                        return Err(FsError::FileInUse(child_display.text()));
                    }
                }
                None => self.assert_subtree_closed(child, &child_display)?,
            }
        }
        Ok(())
    }

    fn remove_subtree(&mut self, dir: EntryId) -> FsResult<()> {
        for child in self.tree.merged_children(dir)? {
            if self.tree.entry(child)?.is_dir() {
                self.remove_subtree(child)?;
            }
            self.tree.unlink_child(dir, child)?;
            self.tree.discard(child);
        }
        Ok(())
    }

    // ---- directories ----

    fn create_directory_chain(&mut self, path: &AbsolutePath) -> FsResult<EntryId> {
        let Some(mut cursor) = self.tree.root(path.root()) else {
            return Err(if path.is_local() {
                FsError::DirectoryNotFound(path.text())
            } else {
                FsError::NetworkPathNotFound
            });
        };
        let now = self.now();
        for component in path.walk() {
            if self.tree.child_file(cursor, component.name)?.is_some() {
                return Err(if component.is_last {
                    FsError::AlreadyExists(path.text())
                } else {
                    FsError::DirectoryNotFound(path.text())
                });
            }
            cursor = match self.tree.child_dir(cursor, component.name)? {
                Some(next) => next,
                None => {
                    let created = self.tree.new_directory(cursor, component.name, now)?;
                    self.tree.touch_children_changed(cursor, now)?;
                    let canonical = self.tree.path_of(created)?.text();
                    self.emit(EventKind::Created { path: canonical });
                    created
                }
            };
        }
        Ok(cursor)
    }

    fn set_current_directory_at(&mut self, path: &AbsolutePath) -> FsResult<()> {
        if !path.is_local() {
            return Err(FsError::PathInvalid);
        }
        let policy = DirectoryErrorPolicy {
            terminal_is_file: ErrorSelector::DirectoryNameInvalid,
            ..DirectoryErrorPolicy::default()
        };
        self.current_dir = DirectoryResolver::with_policy(&self.tree, policy).resolve(path)?;
        Ok(())
    }

    // ---- move and copy ----

    fn move_entry_at(&mut self, source: &AbsolutePath, destination: &AbsolutePath) -> FsResult<()> {
        if source.root() != destination.root() {
            return Err(FsError::RootsNotIdentical);
        }
        let (Some(src_name), Some(src_parent_path)) = (source.file_name(), source.parent()) else {
            return Err(FsError::PathIsDrive);
        };
        let (Some(dst_name), Some(dst_parent_path)) =
            (destination.file_name(), destination.parent())
        else {
            return Err(FsError::PathIsDrive);
        };
        let src_parent = DirectoryResolver::new(&self.tree).resolve_as(&src_parent_path, source)?;
        let Some(entry) = self.tree.child_any(src_parent, src_name)? else {
            return Err(FsError::FileNotFound(source.text()));
        };
        if source == destination {
            return Err(FsError::SourceEqualsDestination);
        }
        if self.tree.entry(entry)?.is_dir() {
            if destination.is_beneath(source) {
                return Err(FsError::FileInUse(source.text()));
            }
            self.assert_subtree_closed(entry, source)?;
        } else if self.any_handle_on(entry) {
            return Err(FsError::FileInUse(source.text()));
        }
        let dst_parent =
            DirectoryResolver::new(&self.tree).resolve_as(&dst_parent_path, destination)?;
        if self.tree.child_any(dst_parent, dst_name)?.is_some() {
            return Err(FsError::AlreadyExists(destination.text()));
        }

        let canonical_from = self.tree.path_of(entry)?.text();
        self.tree.unlink_child(src_parent, entry)?;
        self.tree.rename(entry, dst_name)?;
        self.tree.link_child(dst_parent, entry)?;
        let now = self.now();
        self.tree.touch_children_changed(src_parent, now)?;
        self.tree.touch_children_changed(dst_parent, now)?;
        let canonical_to = self.tree.path_of(entry)?.text();
        self.emit(EventKind::Renamed { from: canonical_from, to: canonical_to });
        Ok(())
    }

    fn copy_file_at(
        &mut self,
        source: &AbsolutePath,
        destination: &AbsolutePath,
        overwrite: bool,
    ) -> FsResult<()> {
        let resolved = FileResolver::new(&self.tree).resolve(source)?;
        if self.sharing_conflict(resolved.file, false) {
            return Err(FsError::FileInUse(source.text()));
        }
        let resolution = FileResolver::new(&self.tree).try_resolve(destination)?;
        if resolution.existing == Some(resolved.file) {
            return Err(FsError::FileInUse(source.text()));
        }
        let now = self.now();
        let content = self.tree.file_node(resolved.file)?.content.clone();
        let (attributes, written) = {
            let entry = self.tree.entry(resolved.file)?;
            (entry.attributes, entry.times.written)
        };

        match resolution.existing {
            Some(existing) => {
                if !overwrite {
                    return Err(FsError::FileAlreadyExists(destination.text()));
                }
                if self.tree.entry(existing)?.attributes.blocks_overwrite() {
                    return Err(FsError::AccessDenied(destination.text()));
                }
                if self.any_handle_on(existing) {
                    return Err(FsError::FileInUse(destination.text()));
                }
                self.tree.file_node_mut(existing)?.content = content;
                let entry = self.tree.entry_mut(existing)?;
                entry.attributes = attributes;
                entry.times.written = written;
                entry.times.accessed = now;
                let canonical = self.tree.path_of(existing)?.text();
                self.emit(EventKind::Modified { path: canonical });
            }
            None => {
                let created =
                    self.tree.new_file(resolution.parent, &resolution.name, content, now)?;
                let entry = self.tree.entry_mut(created)?;
                entry.attributes = attributes;
                entry.times.written = written;
                self.tree.touch_children_changed(resolution.parent, now)?;
                let canonical = self.tree.path_of(created)?.text();
                self.emit(EventKind::Created { path: canonical });
            }
        }
        Ok(())
    }

    // ---- metadata ----

    fn set_attributes_at(
        &mut self,
        path: &AbsolutePath,
        attributes: FileAttributes,
    ) -> FsResult<()> {
        let id = self.entry_at(path)?;
        let is_dir = self.tree.entry(id)?.is_dir();
        self.tree.entry_mut(id)?.attributes = sanitize_attributes(attributes, is_dir);
        let canonical = self.tree.path_of(id)?.text();
        self.emit(EventKind::Modified { path: canonical });
        Ok(())
    }

    fn set_time_at(
        &mut self,
        path: &AbsolutePath,
        at: DateTime<Utc>,
        field: TimeField,
    ) -> FsResult<()> {
        let id = self.entry_at(path)?;
        let times = &mut self.tree.entry_mut(id)?.times;
        match field {
            TimeField::Created => times.created = at,
            TimeField::Accessed => times.accessed = at,
            TimeField::Written => times.written = at,
        }
        let canonical = self.tree.path_of(id)?.text();
        self.emit(EventKind::Modified { path: canonical });
        Ok(())
    }

    // ---- enumeration ----

    fn enumerate_at(
        &self,
        base: &AbsolutePath,
        pattern: &SearchPattern,
        recursive: bool,
        filter: Option<EntryKind>,
    ) -> FsResult<Vec<String>> {
        let policy = DirectoryErrorPolicy {
            terminal_is_file: ErrorSelector::DirectoryNameInvalid,
            ..DirectoryErrorPolicy::default()
        };
        let mut start = DirectoryResolver::with_policy(&self.tree, policy).resolve(base)?;
        let mut display = base.clone();
        for name in pattern.prefix() {
            display = display.join(name);
            start = match self.tree.child_dir(start, name)? {
                Some(next) => next,
                None => return Err(FsError::DirectoryNotFound(display.text())),
            };
        }
        let mut results = Vec::new();
        self.collect_matches(start, &display, pattern, recursive, filter, &mut results)?;
        Ok(results)
    }

    fn collect_matches(
        &self,
        dir: EntryId,
        display: &AbsolutePath,
        pattern: &SearchPattern,
        recursive: bool,
        filter: Option<EntryKind>,
        out: &mut Vec<String>,
    ) -> FsResult<()> {
        for child in self.tree.merged_children(dir)? {
            let entry = self.tree.entry(child)?;
            let child_display = display.join(&entry.name);
            let wanted = filter.map_or(true, |kind| entry.kind() == kind);
            if wanted && pattern.matches(&entry.name) {
                out.push(child_display.text());
            }
            if recursive && entry.is_dir() {
                self.collect_matches(child, &child_display, pattern, recursive, filter, out)?;
            }
        }
        Ok(())
    }

    fn list_directory_at(&self, path: &AbsolutePath) -> FsResult<Vec<DirEntry>> {
        let policy = DirectoryErrorPolicy {
            terminal_is_file: ErrorSelector::DirectoryNameInvalid,
            ..DirectoryErrorPolicy::default()
        };
        let dir = DirectoryResolver::with_policy(&self.tree, policy).resolve(path)?;
        let mut rows = Vec::new();
        for child in self.tree.merged_children(dir)? {
            let entry = self.tree.entry(child)?;
            rows.push(DirEntry { name: entry.name.clone(), kind: entry.kind(), len: entry.len() });
        }
        Ok(rows)
    }

    // ---- stream backing, one registry slot per open handle ----

    pub(crate) fn read_stream(&mut self, id: HandleId, buf: &mut [u8]) -> FsResult<usize> {
        let (entry, position, can_read) = {
            let handle = self.handle(id)?;
            (handle.entry, handle.position, handle.access.can_read())
        };
        if !can_read {
            return Err(FsError::AccessDenied(self.handle(id)?.path.text()));
        }
        let now = self.now();
        let file = self.tree.file_node(entry)?;
        let len = file.content.len() as u64;
        // Nothing past the end; the cursor stays where the seek put it.
        if position >= len {
            self.tree.entry_mut(entry)?.times.accessed = now;
            return Ok(0);
        }
        let start = position as usize;
        let count = (len as usize - start).min(buf.len());
        buf[..count].copy_from_slice(&file.content[start..start + count]);
        self.tree.entry_mut(entry)?.times.accessed = now;
        self.handle_mut(id)?.position = position + count as u64;
        Ok(count)
    }

    pub(crate) fn write_stream(&mut self, id: HandleId, buf: &[u8]) -> FsResult<usize> {
        let (entry, position, can_write) = {
            let handle = self.handle(id)?;
            (handle.entry, handle.position, handle.access.can_write())
        };
        if !can_write {
            return Err(FsError::AccessDenied(self.handle(id)?.path.text()));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let end = position
            .checked_add(buf.len() as u64)
            .filter(|end| *end <= MAX_STREAM_LEN)
            .ok_or(FsError::StreamTooLong)?;
        let now = self.now();
        let file = self.tree.file_node_mut(entry)?;
        let start = position as usize;
        let end = end as usize;
        if file.content.len() < end {
            // Gap past the old end reads back as zeroes.
            file.content.resize(end, 0);
        }
        file.content[start..end].copy_from_slice(buf);
        let times = &mut self.tree.entry_mut(entry)?.times;
        times.written = now;
        times.accessed = now;
        self.handle_mut(id)?.position = end as u64;
        let canonical = self.tree.path_of(entry)?.text();
        self.emit(EventKind::Modified { path: canonical });
        Ok(buf.len())
    }

    pub(crate) fn stream_len(&self, id: HandleId) -> FsResult<u64> {
        let entry = self.handle(id)?.entry;
        Ok(self.tree.file_node(entry)?.content.len() as u64)
    }

    pub(crate) fn stream_set_len(&mut self, id: HandleId, len: u64) -> FsResult<()> {
        let (entry, can_write) = {
            let handle = self.handle(id)?;
            (handle.entry, handle.access.can_write())
        };
        if !can_write {
            return Err(FsError::AccessDenied(self.handle(id)?.path.text()));
        }
        if len > MAX_STREAM_LEN {
            return Err(FsError::StreamTooLong);
        }
        let now = self.now();
        let file = self.tree.file_node_mut(entry)?;
        file.content.resize(len as usize, 0);
        let times = &mut self.tree.entry_mut(entry)?.times;
        times.written = now;
        times.accessed = now;
        let handle = self.handle_mut(id)?;
        if handle.position > len {
            handle.position = len;
        }
        let canonical = self.tree.path_of(entry)?.text();
        self.emit(EventKind::Modified { path: canonical });
        Ok(())
    }

    pub(crate) fn stream_position(&self, id: HandleId) -> FsResult<u64> {
        Ok(self.handle(id)?.position)
    }

    pub(crate) fn stream_seek(&mut self, id: HandleId, target: u64) -> FsResult<u64> {
        let handle = self.handle(id)?;
        if let Some(floor) = handle.append_floor {
            if target < floor {
                return Err(FsError::SeekBeforeAppend);
            }
        }
        self.handle_mut(id)?.position = target;
        Ok(target)
    }

    pub(crate) fn stream_path_text(&self, id: HandleId) -> FsResult<String> {
        Ok(self.handle(id)?.path.text())
    }

    /// Drops a registry slot. The last close of a pending-delete file
    /// unlinks it within the same critical section.
    pub(crate) fn close_handle(&mut self, id: HandleId) -> FsResult<()> {
        let Some(open) = self.handles.remove(&id) else {
            return Ok(());
        };
        let file = self.tree.file_node_mut(open.entry)?;
        file.open_handles = file.open_handles.saturating_sub(1);
        if file.open_handles > 0 || !file.delete_on_close {
            return Ok(());
        }
        let parent = self
            .tree
            .entry(open.entry)?
            .parent
            .ok_or_else(|| FsError::Internal("open file has no containing directory".into()))?;
        let canonical = self.tree.path_of(open.entry)?.text();
        self.tree.unlink_child(parent, open.entry)?;
        self.tree.discard(open.entry);
        let now = self.now();
        self.tree.touch_children_changed(parent, now)?;
        self.emit(EventKind::Removed { path: canonical });
        Ok(())
    }
}

/// Strips bits callers cannot control and keeps the kind bit owned by the
/// engine.
fn sanitize_attributes(attributes: FileAttributes, is_dir: bool) -> FileAttributes {
    let mut stored = attributes
        & (FileAttributes::READ_ONLY
            | FileAttributes::HIDDEN
            | FileAttributes::SYSTEM
            | FileAttributes::ARCHIVE
            | FileAttributes::NORMAL
            | FileAttributes::TEMPORARY
            | FileAttributes::OFFLINE);
    if stored != FileAttributes::NORMAL {
        stored.remove(FileAttributes::NORMAL);
    }
    if is_dir {
        stored.insert(FileAttributes::DIRECTORY);
        stored.remove(FileAttributes::NORMAL);
    }
    stored
}

/// The engine facade. Open streams share the inner state handle, so the
/// value itself is cheap to park behind an `Arc` and use from many
/// threads.
pub struct FakeFs {
    state: Arc<Mutex<FsState>>,
}

impl FakeFs {
    /// Engine on the system clock with the configured default drive
    /// already mounted.
    pub fn new(config: FsConfig) -> FsResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine on an injected clock; tests pin timestamps this way.
    pub fn with_clock(config: FsConfig, clock: Arc<dyn Clock>) -> FsResult<Self> {
        Ok(Self::from_state(FsState::new(config, clock)?))
    }

    pub(crate) fn from_state(state: FsState) -> Self {
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap()
    }

    /// Creates (or truncates) a file and returns a read-write stream
    /// positioned at offset zero.
    pub fn create_file(&self, path: &str) -> FsResult<FakeFileStream> {
        self.create_file_with(path, OpenOptions::default())
    }

    pub fn create_file_with(&self, path: &str, options: OpenOptions) -> FsResult<FakeFileStream> {
        self.open_file_with(path, OpenMode::Create, FileAccess::ReadWrite, options)
    }

    pub fn open_file(
        &self,
        path: &str,
        mode: OpenMode,
        access: FileAccess,
    ) -> FsResult<FakeFileStream> {
        self.open_file_with(path, mode, access, OpenOptions::default())
    }

    pub fn open_file_with(
        &self,
        path: &str,
        mode: OpenMode,
        access: FileAccess,
        options: OpenOptions,
    ) -> FsResult<FakeFileStream> {
        validate_open_combination(mode, access)?;
        let mut state = self.lock();
        let path = state.parse_path(path, EmptyPathPolicy::EmptyNameNotLegal)?;
        let handle = state.open_file(&path, mode, access, options)?;
        debug!(path = %path, ?mode, ?access, "file opened");
        Ok(FakeFileStream::attach(Arc::clone(&self.state), handle))
    }

    pub fn delete_file(&self, path: &str) -> FsResult<()> {
        let mut state = self.lock();
        let path = state.parse_path(path, EmptyPathPolicy::EmptyNameNotLegal)?;
        state.delete_file_at(&path, false)?;
        debug!(path = %path, "file deleted");
        Ok(())
    }

    pub fn copy_file(&self, source: &str, destination: &str, overwrite: bool) -> FsResult<()> {
        let mut state = self.lock();
        let source = state.parse_path(source, EmptyPathPolicy::EmptyFileNameNotLegal)?;
        let destination = state.parse_path(destination, EmptyPathPolicy::EmptyFileNameNotLegal)?;
        state.copy_file_at(&source, &destination, overwrite)?;
        debug!(from = %source, to = %destination, "file copied");
        Ok(())
    }

    /// Moves or renames a file or directory within one volume.
    pub fn move_entry(&self, source: &str, destination: &str) -> FsResult<()> {
        let mut state = self.lock();
        let source = state.parse_path(source, EmptyPathPolicy::EmptyFileNameNotLegal)?;
        let destination = state.parse_path(destination, EmptyPathPolicy::EmptyFileNameNotLegal)?;
        state.move_entry_at(&source, &destination)?;
        debug!(from = %source, to = %destination, "entry moved");
        Ok(())
    }

    /// Creates the full directory chain; existing directories on the way
    /// are fine.
    pub fn create_directory(&self, path: &str) -> FsResult<()> {
        let mut state = self.lock();
        let path = state.parse_path(path, EmptyPathPolicy::EmptyOrWhitespace)?;
        state.create_directory_chain(&path)?;
        debug!(path = %path, "directory created");
        Ok(())
    }

    pub fn delete_directory(&self, path: &str, recursive: bool) -> FsResult<()> {
        let mut state = self.lock();
        let path = state.parse_path(path, EmptyPathPolicy::EmptyOrWhitespace)?;
        state.delete_directory_at(&path, recursive)?;
        debug!(path = %path, recursive, "directory deleted");
        Ok(())
    }

    pub fn set_current_directory(&self, path: &str) -> FsResult<()> {
        let mut state = self.lock();
        let path = state.parse_path(path, EmptyPathPolicy::EmptyOrWhitespace)?;
        state.set_current_directory_at(&path)?;
        debug!(path = %path, "current directory set");
        Ok(())
    }

    /// Current directory rendered from stored entries, so the casing is
    /// the one recorded at creation.
    pub fn current_directory(&self) -> FsResult<String> {
        let state = self.lock();
        Ok(state.base_path()?.text())
    }

    pub fn attributes(&self, path: &str) -> FsResult<FileAttributes> {
        let state = self.lock();
        Ok(state.properties_query(path)?.attributes)
    }

    pub fn set_attributes(&self, path: &str, attributes: FileAttributes) -> FsResult<()> {
        let mut state = self.lock();
        let path = state.parse_path(path, EmptyPathPolicy::EmptyNameNotLegal)?;
        state.set_attributes_at(&path, attributes)?;
        debug!(path = %path, ?attributes, "attributes set");
        Ok(())
    }

    pub fn set_creation_time(&self, path: &str, at: DateTime<Utc>) -> FsResult<()> {
        self.set_time(path, at, TimeField::Created)
    }

    pub fn set_last_access_time(&self, path: &str, at: DateTime<Utc>) -> FsResult<()> {
        self.set_time(path, at, TimeField::Accessed)
    }

    pub fn set_last_write_time(&self, path: &str, at: DateTime<Utc>) -> FsResult<()> {
        self.set_time(path, at, TimeField::Written)
    }

    fn set_time(&self, path: &str, at: DateTime<Utc>, field: TimeField) -> FsResult<()> {
        validate_file_time(at)?;
        let mut state = self.lock();
        let path = state.parse_path(path, EmptyPathPolicy::EmptyNameNotLegal)?;
        state.set_time_at(&path, at, field)?;
        debug!(path = %path, ?field, "time set");
        Ok(())
    }

    /// One-critical-section metadata snapshot of a file or directory.
    pub fn entry_properties(&self, path: &str) -> FsResult<EntryProperties> {
        self.lock().properties_query(path)
    }

    /// Cached snapshot view over [`entry_properties`]; the capture runs on
    /// first access.
    ///
    /// [`entry_properties`]: FakeFs::entry_properties
    pub fn entry_info(&self, path: &str) -> EntryInfo {
        EntryInfo::new(Arc::clone(&self.state), path.to_string())
    }

    pub fn file_exists(&self, path: &str) -> bool {
        matches!(self.lock().find_kind(path), Some(EntryKind::File))
    }

    pub fn directory_exists(&self, path: &str) -> bool {
        matches!(self.lock().find_kind(path), Some(EntryKind::Directory))
    }

    /// True when any entry sits at `path`; never fails, bad input reads
    /// as absent.
    pub fn exists(&self, path: &str) -> bool {
        self.lock().find_kind(path).is_some()
    }

    pub fn enumerate_files(
        &self,
        path: &str,
        pattern: Option<&str>,
        recursive: bool,
    ) -> FsResult<Vec<String>> {
        self.enumerate(path, pattern, recursive, Some(EntryKind::File))
    }

    pub fn enumerate_directories(
        &self,
        path: &str,
        pattern: Option<&str>,
        recursive: bool,
    ) -> FsResult<Vec<String>> {
        self.enumerate(path, pattern, recursive, Some(EntryKind::Directory))
    }

    pub fn enumerate_entries(
        &self,
        path: &str,
        pattern: Option<&str>,
        recursive: bool,
    ) -> FsResult<Vec<String>> {
        self.enumerate(path, pattern, recursive, None)
    }

    fn enumerate(
        &self,
        path: &str,
        pattern: Option<&str>,
        recursive: bool,
        filter: Option<EntryKind>,
    ) -> FsResult<Vec<String>> {
        let pattern = SearchPattern::compile(pattern.unwrap_or("*"))?;
        let state = self.lock();
        let base = state.parse_path(path, EmptyPathPolicy::EmptyOrWhitespace)?;
        state.enumerate_at(&base, &pattern, recursive, filter)
    }

    /// Direct children with name, kind and length, sorted by folded name.
    pub fn list_directory(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let state = self.lock();
        let path = state.parse_path(path, EmptyPathPolicy::EmptyOrWhitespace)?;
        state.list_directory_at(&path)
    }

    #[cfg(feature = "events")]
    pub fn subscribe_events(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        let mut state = self.lock();
        state.next_subscription_id += 1;
        let id = SubscriptionId::new(state.next_subscription_id);
        state.event_sinks.insert(id, sink);
        id
    }

    /// Removes a sink; reports whether the subscription was known.
    #[cfg(feature = "events")]
    pub fn unsubscribe_events(&self, subscription: SubscriptionId) -> bool {
        self.lock().event_sinks.remove(&subscription).is_some()
    }
}

impl fmt::Debug for FakeFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeFs").finish_non_exhaustive()
    }
}

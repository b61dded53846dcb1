// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Entry tree: the in-memory forest of volumes, directories and files

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::error::{FsError, FsResult};
use crate::path::{fold, AbsolutePath, PathRoot};
use crate::types::{EntryKind, EntryProperties, EntryTimes, FileAttributes};

// Supported file-time window, [1601-01-01, 10000-01-01) as Unix seconds.
const MIN_FILE_TIME_UNIX: i64 = -11_644_473_600;
const MAX_FILE_TIME_UNIX: i64 = 253_402_300_800;

pub(crate) fn validate_file_time(time: DateTime<Utc>) -> FsResult<()> {
    let seconds = time.timestamp();
    if seconds < MIN_FILE_TIME_UNIX || seconds >= MAX_FILE_TIME_UNIX {
        return Err(FsError::FileTimeOutOfRange);
    }
    Ok(())
}

/// Arena index of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct EntryId(u64);

/// Directory payload. Children are split by kind and keyed by folded name,
/// which keeps lookups case-insensitive and iteration sorted.
#[derive(Debug, Default)]
pub(crate) struct DirNode {
    pub dirs: BTreeMap<String, EntryId>,
    pub files: BTreeMap<String, EntryId>,
}

/// File payload: content plus the bookkeeping the stream layer maintains.
#[derive(Debug, Default)]
pub(crate) struct FileNode {
    pub content: Vec<u8>,
    pub open_handles: u32,
    pub delete_on_close: bool,
}

#[derive(Debug)]
pub(crate) enum EntryBody {
    Directory(DirNode),
    File(FileNode),
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub id: EntryId,
    pub parent: Option<EntryId>,
    /// Creation casing, authoritative until a rename.
    pub name: String,
    pub attributes: FileAttributes,
    pub times: EntryTimes,
    pub body: EntryBody,
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self.body {
            EntryBody::Directory(_) => EntryKind::Directory,
            EntryBody::File(_) => EntryKind::File,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.body, EntryBody::Directory(_))
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match &self.body {
            EntryBody::File(file) => Some(file),
            EntryBody::Directory(_) => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileNode> {
        match &mut self.body {
            EntryBody::File(file) => Some(file),
            EntryBody::Directory(_) => None,
        }
    }

    pub fn len(&self) -> u64 {
        match &self.body {
            EntryBody::File(file) => file.content.len() as u64,
            EntryBody::Directory(_) => 0,
        }
    }

    /// Attribute set as reported, with the no-bits case surfacing NORMAL.
    pub fn effective_attributes(&self) -> FileAttributes {
        if self.attributes.is_empty() {
            FileAttributes::NORMAL
        } else {
            self.attributes
        }
    }

    pub fn properties(&self) -> EntryProperties {
        EntryProperties {
            kind: self.kind(),
            attributes: self.effective_attributes(),
            created: self.times.created,
            accessed: self.times.accessed,
            written: self.times.written,
            len: self.len(),
        }
    }
}

/// The forest. Volume roots are entries with no parent; every other entry
/// hangs off exactly one directory's child map.
#[derive(Debug)]
pub(crate) struct EntryTree {
    nodes: HashMap<EntryId, Entry>,
    roots: BTreeMap<String, EntryId>,
    root_tokens: HashMap<EntryId, PathRoot>,
    next_id: u64,
}

impl EntryTree {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: BTreeMap::new(),
            root_tokens: HashMap::new(),
            next_id: 0,
        }
    }

    fn alloc(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId(self.next_id)
    }

    pub fn entry(&self, id: EntryId) -> FsResult<&Entry> {
        self.nodes
            .get(&id)
            .ok_or_else(|| FsError::Internal(format!("entry {id:?} missing from arena")))
    }

    pub fn entry_mut(&mut self, id: EntryId) -> FsResult<&mut Entry> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| FsError::Internal(format!("entry {id:?} missing from arena")))
    }

    fn dir_node(&self, id: EntryId) -> FsResult<&DirNode> {
        match &self.entry(id)?.body {
            EntryBody::Directory(dir) => Ok(dir),
            EntryBody::File(_) => {
                Err(FsError::Internal(format!("entry {id:?} used as a directory")))
            }
        }
    }

    fn dir_node_mut(&mut self, id: EntryId) -> FsResult<&mut DirNode> {
        match &mut self.entry_mut(id)?.body {
            EntryBody::Directory(dir) => Ok(dir),
            EntryBody::File(_) => {
                Err(FsError::Internal(format!("entry {id:?} used as a directory")))
            }
        }
    }

    pub fn file_node(&self, id: EntryId) -> FsResult<&FileNode> {
        match &self.entry(id)?.body {
            EntryBody::File(file) => Ok(file),
            EntryBody::Directory(_) => Err(FsError::Internal(format!("entry {id:?} used as a file"))),
        }
    }

    pub fn file_node_mut(&mut self, id: EntryId) -> FsResult<&mut FileNode> {
        match &mut self.entry_mut(id)?.body {
            EntryBody::File(file) => Ok(file),
            EntryBody::Directory(_) => Err(FsError::Internal(format!("entry {id:?} used as a file"))),
        }
    }

    pub fn root(&self, root: &PathRoot) -> Option<EntryId> {
        self.roots.get(&root.key()).copied()
    }

    /// Looks up or creates the root entry for a volume. The first creation
    /// fixes the volume's stored casing.
    pub fn ensure_root(&mut self, root: &PathRoot, now: DateTime<Utc>) -> EntryId {
        if let Some(id) = self.root(root) {
            return id;
        }
        let id = self.alloc();
        self.nodes.insert(
            id,
            Entry {
                id,
                parent: None,
                name: root.text(),
                attributes: FileAttributes::DIRECTORY,
                times: EntryTimes::all(now),
                body: EntryBody::Directory(DirNode::default()),
            },
        );
        self.roots.insert(root.key(), id);
        self.root_tokens.insert(id, root.clone());
        id
    }

    pub fn child_dir(&self, parent: EntryId, name: &str) -> FsResult<Option<EntryId>> {
        Ok(self.dir_node(parent)?.dirs.get(&fold(name)).copied())
    }

    pub fn child_file(&self, parent: EntryId, name: &str) -> FsResult<Option<EntryId>> {
        Ok(self.dir_node(parent)?.files.get(&fold(name)).copied())
    }

    pub fn child_any(&self, parent: EntryId, name: &str) -> FsResult<Option<EntryId>> {
        let dir = self.dir_node(parent)?;
        let key = fold(name);
        Ok(dir.dirs.get(&key).or_else(|| dir.files.get(&key)).copied())
    }

    pub fn new_directory(
        &mut self,
        parent: EntryId,
        name: &str,
        now: DateTime<Utc>,
    ) -> FsResult<EntryId> {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Entry {
                id,
                parent: Some(parent),
                name: name.to_string(),
                attributes: FileAttributes::DIRECTORY,
                times: EntryTimes::all(now),
                body: EntryBody::Directory(DirNode::default()),
            },
        );
        self.link_child(parent, id)?;
        Ok(id)
    }

    pub fn new_file(
        &mut self,
        parent: EntryId,
        name: &str,
        content: Vec<u8>,
        now: DateTime<Utc>,
    ) -> FsResult<EntryId> {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Entry {
                id,
                parent: Some(parent),
                name: name.to_string(),
                attributes: FileAttributes::ARCHIVE,
                times: EntryTimes::all(now),
                body: EntryBody::File(FileNode { content, ..FileNode::default() }),
            },
        );
        self.link_child(parent, id)?;
        Ok(id)
    }

    /// Hangs `child` off `parent` under the child's folded name. The name
    /// must be free in both child maps.
    pub fn link_child(&mut self, parent: EntryId, child: EntryId) -> FsResult<()> {
        let (key, is_dir) = {
            let entry = self.entry(child)?;
            (fold(&entry.name), entry.is_dir())
        };
        let dir = self.dir_node_mut(parent)?;
        if dir.dirs.contains_key(&key) || dir.files.contains_key(&key) {
            return Err(FsError::Internal(format!("child name collision on {key:?}")));
        }
        if is_dir {
            dir.dirs.insert(key, child);
        } else {
            dir.files.insert(key, child);
        }
        self.entry_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn unlink_child(&mut self, parent: EntryId, child: EntryId) -> FsResult<()> {
        let (key, is_dir) = {
            let entry = self.entry(child)?;
            (fold(&entry.name), entry.is_dir())
        };
        let dir = self.dir_node_mut(parent)?;
        let removed =
            if is_dir { dir.dirs.remove(&key) } else { dir.files.remove(&key) };
        if removed != Some(child) {
            return Err(FsError::Internal(format!("child {key:?} not linked where expected")));
        }
        self.entry_mut(child)?.parent = None;
        Ok(())
    }

    /// Drops an unlinked entry from the arena.
    pub fn discard(&mut self, id: EntryId) {
        self.nodes.remove(&id);
    }

    pub fn rename(&mut self, id: EntryId, new_name: &str) -> FsResult<()> {
        self.entry_mut(id)?.name = new_name.to_string();
        Ok(())
    }

    /// Children of a directory, both kinds, ordered by folded name.
    pub fn merged_children(&self, parent: EntryId) -> FsResult<Vec<EntryId>> {
        let dir = self.dir_node(parent)?;
        let mut rows: Vec<(&String, EntryId)> =
            dir.dirs.iter().chain(dir.files.iter()).map(|(key, id)| (key, *id)).collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        Ok(rows.into_iter().map(|(_, id)| id).collect())
    }

    /// Rebuilds the absolute path of an entry from its parent chain, in
    /// stored casing.
    pub fn path_of(&self, id: EntryId) -> FsResult<AbsolutePath> {
        let mut names = Vec::new();
        let mut cursor = id;
        loop {
            let entry = self.entry(cursor)?;
            match entry.parent {
                Some(parent) => {
                    names.push(entry.name.clone());
                    cursor = parent;
                }
                None => {
                    let root = self
                        .root_tokens
                        .get(&cursor)
                        .ok_or_else(|| FsError::Internal("entry chain ends off-root".into()))?;
                    names.reverse();
                    return Ok(AbsolutePath::from_parts(root.clone(), names));
                }
            }
        }
    }

    /// Marks a directory's content as changed.
    pub fn touch_children_changed(&mut self, dir: EntryId, now: DateTime<Utc>) -> FsResult<()> {
        let entry = self.entry_mut(dir)?;
        entry.times.written = now;
        entry.times.accessed = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::EmptyPathPolicy;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2004-02-14T08:30:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    fn drive_c() -> PathRoot {
        PathRoot::Drive('C')
    }

    #[test]
    fn roots_are_created_once_per_volume() {
        let mut tree = EntryTree::new();
        let first = tree.ensure_root(&drive_c(), now());
        let again = tree.ensure_root(&PathRoot::Drive('c'), now());
        assert_eq!(first, again);
    }

    #[test]
    fn lookups_fold_case_and_storage_preserves_it() {
        let mut tree = EntryTree::new();
        let root = tree.ensure_root(&drive_c(), now());
        let dir = tree.new_directory(root, "Some", now()).expect("directory created");
        let file =
            tree.new_file(dir, "File.TXT", b"abc".to_vec(), now()).expect("file created");

        assert_eq!(tree.child_dir(root, "SOME").expect("lookup works"), Some(dir));
        assert_eq!(tree.child_file(dir, "file.txt").expect("lookup works"), Some(file));
        assert_eq!(tree.entry(file).expect("entry exists").name, "File.TXT");
        assert_eq!(tree.entry(file).expect("entry exists").len(), 3);
    }

    #[test]
    fn link_rejects_colliding_names_across_kinds() {
        let mut tree = EntryTree::new();
        let root = tree.ensure_root(&drive_c(), now());
        tree.new_directory(root, "data", now()).expect("directory created");
        let err = tree.new_file(root, "DATA", Vec::new(), now()).expect_err("collision");
        assert!(matches!(err, FsError::Internal(_)));
    }

    #[test]
    fn unlink_then_relink_moves_an_entry() {
        let mut tree = EntryTree::new();
        let root = tree.ensure_root(&drive_c(), now());
        let src = tree.new_directory(root, "src", now()).expect("directory created");
        let dst = tree.new_directory(root, "dst", now()).expect("directory created");
        let file = tree.new_file(src, "a.txt", Vec::new(), now()).expect("file created");

        tree.unlink_child(src, file).expect("unlink works");
        tree.rename(file, "b.txt").expect("rename works");
        tree.link_child(dst, file).expect("relink works");

        assert_eq!(tree.child_file(src, "a.txt").expect("lookup works"), None);
        assert_eq!(tree.child_file(dst, "B.TXT").expect("lookup works"), Some(file));
        assert_eq!(tree.path_of(file).expect("path builds").text(), r"C:\dst\b.txt");
    }

    #[test]
    fn merged_children_sort_across_kinds() {
        let mut tree = EntryTree::new();
        let root = tree.ensure_root(&drive_c(), now());
        tree.new_file(root, "beta.txt", Vec::new(), now()).expect("file created");
        tree.new_directory(root, "Alpha", now()).expect("directory created");
        tree.new_file(root, "gamma.txt", Vec::new(), now()).expect("file created");

        let names: Vec<String> = tree
            .merged_children(root)
            .expect("children listed")
            .into_iter()
            .map(|id| tree.entry(id).expect("entry exists").name.clone())
            .collect();
        assert_eq!(names, ["Alpha", "beta.txt", "gamma.txt"]);
    }

    #[test]
    fn path_of_renders_share_roots() {
        let mut tree = EntryTree::new();
        let root = PathRoot::Share { server: "server".into(), share: "share".into() };
        let root_id = tree.ensure_root(&root, now());
        let dir = tree.new_directory(root_id, "team", now()).expect("directory created");
        assert_eq!(tree.path_of(dir).expect("path builds").text(), r"\\server\share\team");
    }

    #[test]
    fn effective_attributes_surface_normal_for_empty() {
        let mut tree = EntryTree::new();
        let root = tree.ensure_root(&drive_c(), now());
        let file = tree.new_file(root, "a.txt", Vec::new(), now()).expect("file created");
        tree.entry_mut(file).expect("entry exists").attributes = FileAttributes::empty();
        assert_eq!(
            tree.entry(file).expect("entry exists").effective_attributes(),
            FileAttributes::NORMAL
        );
    }

    #[test]
    fn file_time_range_is_enforced() {
        let too_small = DateTime::parse_from_rfc3339("1600-12-31T23:59:59Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        assert_eq!(validate_file_time(too_small), Err(FsError::FileTimeOutOfRange));
        assert_eq!(validate_file_time(now()), Ok(()));
    }

    #[test]
    fn parsed_paths_agree_with_rebuilt_paths() {
        let mut tree = EntryTree::new();
        let root = tree.ensure_root(&drive_c(), now());
        let dir = tree.new_directory(root, "SOME", now()).expect("directory created");
        let sub = tree.new_directory(dir, "folder", now()).expect("directory created");

        let requested =
            AbsolutePath::parse(r"c:\some\FOLDER", None, EmptyPathPolicy::EmptyNameNotLegal)
                .expect("path parses");
        let stored = tree.path_of(sub).expect("path builds");
        assert_eq!(stored, requested);
        assert_eq!(stored.text(), r"C:\SOME\folder");
    }
}

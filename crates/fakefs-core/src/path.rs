// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path grammar of the drive-letter/UNC naming dialect

use std::borrow::Cow;
use std::fmt;

use crate::error::{FsError, FsResult};

/// Component separator used in rendered paths.
pub(crate) const SEPARATOR: char = '\\';

const EXTENDED_PREFIX: &str = r"\\?\";
const EXTENDED_UNC_PREFIX: &str = r"UNC\";

/// Device names the modeled OS reserves in every directory context.
const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Uppercase-based fold used for name keys and case-insensitive equality.
pub(crate) fn fold(name: &str) -> String {
    name.to_uppercase()
}

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

fn is_illegal_path_char(c: char) -> bool {
    matches!(c, '<' | '>' | '|' | '"' | '*' | '?') || (c as u32) < 0x20
}

fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or("");
    RESERVED_DEVICE_NAMES.iter().any(|reserved| stem.eq_ignore_ascii_case(reserved))
}

fn validate_name(name: &str) -> FsResult<()> {
    // Illegal characters are rejected up front; a colon is only ever legal
    // as part of the drive root token.
    if name.contains(':') {
        return Err(FsError::UnsupportedFormat);
    }
    if is_reserved_device_name(name) {
        return Err(FsError::ReservedName);
    }
    Ok(())
}

/// Message selection for empty input; the host file, file-move and
/// directory entry points each report it with different text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmptyPathPolicy {
    /// "Empty path name is not legal."
    EmptyNameNotLegal,
    /// "Empty file name is not legal."
    EmptyFileNameNotLegal,
    /// "Path cannot be the empty string or all whitespace."
    EmptyOrWhitespace,
}

impl EmptyPathPolicy {
    fn error(self) -> FsError {
        match self {
            EmptyPathPolicy::EmptyNameNotLegal => FsError::EmptyPath,
            EmptyPathPolicy::EmptyFileNameNotLegal => FsError::EmptyFileName,
            EmptyPathPolicy::EmptyOrWhitespace => FsError::EmptyOrWhitespacePath,
        }
    }
}

/// Volume designator of an absolute path
#[derive(Clone, Debug)]
pub enum PathRoot {
    /// Local drive, e.g. `C:`.
    Drive(char),
    /// Network share, e.g. `\\server\share`.
    Share { server: String, share: String },
}

impl PathRoot {
    pub fn is_local(&self) -> bool {
        matches!(self, PathRoot::Drive(_))
    }

    /// Case-folded volume identity, the key for root lookups.
    pub(crate) fn key(&self) -> String {
        match self {
            PathRoot::Drive(letter) => format!("{}:", letter.to_ascii_uppercase()),
            PathRoot::Share { server, share } => fold(&format!(r"\\{server}\{share}")),
        }
    }

    /// Root token in the casing it was written with.
    pub fn text(&self) -> String {
        match self {
            PathRoot::Drive(letter) => format!("{letter}:"),
            PathRoot::Share { server, share } => format!(r"\\{server}\{share}"),
        }
    }
}

impl PartialEq for PathRoot {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PathRoot {}

impl std::hash::Hash for PathRoot {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// One name along a path, with position flags used to shape errors.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PathComponent<'a> {
    pub name: &'a str,
    pub is_first: bool,
    pub is_last: bool,
}

/// A fully parsed path: a volume root plus the names below it.
///
/// Comparisons fold case; rendering preserves the casing the path was
/// written with. The extended-length prefix never survives parsing.
#[derive(Clone, Debug)]
pub struct AbsolutePath {
    root: PathRoot,
    components: Vec<String>,
}

impl AbsolutePath {
    /// Parses `raw` against the dialect grammar. Relative inputs resolve
    /// lexically against `base`; no tree state is consulted.
    pub fn parse(
        raw: &str,
        base: Option<&AbsolutePath>,
        empty_policy: EmptyPathPolicy,
    ) -> FsResult<Self> {
        if raw.is_empty() {
            return Err(empty_policy.error());
        }
        let trimmed = raw.trim_end();
        if trimmed.is_empty() {
            return Err(FsError::IllegalPath);
        }

        let (body, extended) = strip_extended_prefix(trimmed);
        if body.chars().any(is_illegal_path_char) {
            return Err(FsError::IllegalCharacters);
        }

        if let Some(rest) = strip_unc_start(&body) {
            return parse_share(rest);
        }
        if is_drive_rooted(&body) {
            return parse_drive(&body);
        }
        if extended {
            // The extended prefix admits only the two absolute forms.
            return Err(FsError::UnsupportedFormat);
        }

        let base = base.ok_or(FsError::IllegalPath)?;
        let mut path = if body.starts_with(is_separator) {
            AbsolutePath { root: base.root.clone(), components: Vec::new() }
        } else {
            base.clone()
        };
        push_segments(&mut path.components, &body)?;
        Ok(path)
    }

    pub(crate) fn from_parts(root: PathRoot, components: Vec<String>) -> Self {
        Self { root, components }
    }

    pub fn root(&self) -> &PathRoot {
        &self.root
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_local(&self) -> bool {
        self.root.is_local()
    }

    pub fn is_volume_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<AbsolutePath> {
        if self.components.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.components.pop();
        Some(parent)
    }

    pub(crate) fn join(&self, name: &str) -> AbsolutePath {
        let mut child = self.clone();
        child.components.push(name.to_string());
        child
    }

    /// True when `self` is `other` or lies beneath it.
    pub(crate) fn is_beneath(&self, other: &AbsolutePath) -> bool {
        self.root == other.root
            && self.components.len() >= other.components.len()
            && other
                .components
                .iter()
                .zip(&self.components)
                .all(|(theirs, ours)| fold(theirs) == fold(ours))
    }

    pub(crate) fn walk(&self) -> impl Iterator<Item = PathComponent<'_>> + '_ {
        let last = self.components.len().saturating_sub(1);
        self.components.iter().enumerate().map(move |(index, name)| PathComponent {
            name,
            is_first: index == 0,
            is_last: index == last,
        })
    }

    /// Canonical rendering; a bare drive root keeps its trailing separator
    /// (`C:\`), everything else renders without one.
    pub fn text(&self) -> String {
        let mut out = self.root.text();
        if self.components.is_empty() {
            if self.root.is_local() {
                out.push(SEPARATOR);
            }
            return out;
        }
        for name in &self.components {
            out.push(SEPARATOR);
            out.push_str(name);
        }
        out
    }
}

impl fmt::Display for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl PartialEq for AbsolutePath {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(ours, theirs)| fold(ours) == fold(theirs))
    }
}

impl Eq for AbsolutePath {}

fn strip_extended_prefix(path: &str) -> (Cow<'_, str>, bool) {
    match path.strip_prefix(EXTENDED_PREFIX) {
        Some(rest) => match rest.strip_prefix(EXTENDED_UNC_PREFIX) {
            Some(unc_rest) => (Cow::Owned(format!(r"\\{unc_rest}")), true),
            None => (Cow::Borrowed(rest), true),
        },
        None => (Cow::Borrowed(path), false),
    }
}

fn strip_unc_start(body: &str) -> Option<&str> {
    let mut chars = body.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if is_separator(first) && is_separator(second) => {
            Some(chars.as_str())
        }
        _ => None,
    }
}

fn is_drive_rooted(body: &str) -> bool {
    let mut chars = body.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

fn parse_drive(body: &str) -> FsResult<AbsolutePath> {
    // is_drive_rooted guarantees an ASCII letter and a colon up front.
    let letter = body.as_bytes()[0] as char;
    let mut path = AbsolutePath { root: PathRoot::Drive(letter), components: Vec::new() };
    push_segments(&mut path.components, &body[2..])?;
    Ok(path)
}

fn parse_share(rest: &str) -> FsResult<AbsolutePath> {
    let mut names = rest.split(is_separator).filter(|segment| !segment.is_empty());
    let server = names.next().ok_or(FsError::UncPathInvalid)?;
    let share = names.next().ok_or(FsError::UncPathInvalid)?;
    validate_name(server)?;
    validate_name(share)?;

    let mut components = Vec::new();
    for segment in names {
        match segment {
            "." => {}
            ".." => {
                components.pop();
            }
            name => {
                validate_name(name)?;
                components.push(name.to_string());
            }
        }
    }
    Ok(AbsolutePath {
        root: PathRoot::Share { server: server.to_string(), share: share.to_string() },
        components,
    })
}

fn push_segments(dst: &mut Vec<String>, text: &str) -> FsResult<()> {
    for segment in text.split(is_separator) {
        match segment {
            "" | "." => {}
            ".." => {
                // Lexical parent, clamped at the volume root.
                dst.pop();
            }
            name => {
                validate_name(name)?;
                dst.push(name.to_string());
            }
        }
    }
    Ok(())
}

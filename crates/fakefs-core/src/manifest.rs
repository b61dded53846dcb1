// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Declarative JSON seeding manifests

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::Deserialize;

use crate::builder::{FakeFsBuilder, Seed};
use crate::types::{EntryTimes, FileAttributes};

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EntrySpecKind {
    Dir,
    File,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum AttributeName {
    ReadOnly,
    Hidden,
    System,
    Archive,
    Normal,
    Temporary,
    Offline,
}

impl AttributeName {
    fn bit(self) -> FileAttributes {
        match self {
            AttributeName::ReadOnly => FileAttributes::READ_ONLY,
            AttributeName::Hidden => FileAttributes::HIDDEN,
            AttributeName::System => FileAttributes::SYSTEM,
            AttributeName::Archive => FileAttributes::ARCHIVE,
            AttributeName::Normal => FileAttributes::NORMAL,
            AttributeName::Temporary => FileAttributes::TEMPORARY,
            AttributeName::Offline => FileAttributes::OFFLINE,
        }
    }
}

/// One seed row. File bodies come as `text` or `base64` (never both);
/// the three timestamps are set together or not at all.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ManifestEntry {
    kind: EntrySpecKind,
    path: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    base64: Option<String>,
    #[serde(default)]
    attributes: Option<Vec<AttributeName>>,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    written: Option<DateTime<Utc>>,
}

impl FakeFsBuilder {
    /// Loads seeds from a JSON array of entry specs. Path semantics are
    /// checked later by [`build`]; this step validates only the document
    /// shape.
    ///
    /// [`build`]: FakeFsBuilder::build
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<ManifestEntry> = serde_json::from_str(text)?;
        let mut builder = FakeFsBuilder::new();
        for entry in entries {
            apply_entry(&mut builder, entry)?;
        }
        Ok(builder)
    }
}

fn apply_entry(
    builder: &mut FakeFsBuilder,
    entry: ManifestEntry,
) -> Result<(), serde_json::Error> {
    let ManifestEntry { kind, path, text, base64, attributes, created, accessed, written } = entry;

    let content = match (text, base64) {
        (Some(_), Some(_)) => {
            return Err(serde_json::Error::custom(format!(
                "entry '{path}' sets both text and base64"
            )));
        }
        (Some(text), None) => Some(text.into_bytes()),
        (None, Some(encoded)) => Some(B64.decode(encoded.as_bytes()).map_err(|err| {
            serde_json::Error::custom(format!("entry '{path}' carries invalid base64: {err}"))
        })?),
        (None, None) => None,
    };

    match kind {
        EntrySpecKind::Dir => {
            if content.is_some() {
                return Err(serde_json::Error::custom(format!(
                    "directory entry '{path}' cannot carry content"
                )));
            }
            builder.push_seed(Seed::Directory(path.clone()));
        }
        EntrySpecKind::File => {
            builder
                .push_seed(Seed::File { path: path.clone(), content: content.unwrap_or_default() });
        }
    }

    if let Some(names) = attributes {
        let attributes =
            names.iter().fold(FileAttributes::empty(), |bits, name| bits | name.bit());
        builder.push_seed(Seed::Attributes { path: path.clone(), attributes });
    }

    match (created, accessed, written) {
        (None, None, None) => {}
        (Some(created), Some(accessed), Some(written)) => {
            builder.push_seed(Seed::Times { path, times: EntryTimes { created, accessed, written } });
        }
        _ => {
            return Err(serde_json::Error::custom(format!(
                "entry '{path}' must set created, accessed and written together"
            )));
        }
    }
    Ok(())
}

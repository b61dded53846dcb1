// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Wildcard search patterns for directory enumeration

use crate::error::{FsError, FsResult};
use crate::path::fold;

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

fn has_wildcards(segment: &str) -> bool {
    segment.contains('*') || segment.contains('?')
}

fn is_rooted(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => true,
        (Some(a), Some(b)) => is_separator(a) && is_separator(b),
        _ => false,
    }
}

/// A validated search pattern: literal directories to descend, then a
/// wildcard match on child names. Matching folds case.
#[derive(Clone, Debug)]
pub(crate) struct SearchPattern {
    prefix: Vec<String>,
    folded: Vec<char>,
}

impl SearchPattern {
    pub fn compile(pattern: &str) -> FsResult<SearchPattern> {
        if is_rooted(pattern) {
            return Err(FsError::SearchPatternIsRooted);
        }
        let mut segments: Vec<&str> = Vec::new();
        for segment in pattern.split(is_separator) {
            match segment {
                "" | "." => {}
                ".." => return Err(FsError::SearchPatternContainsParent),
                other => segments.push(other),
            }
        }
        let name_pattern = segments.pop().unwrap_or("");
        // Wildcards are only meaningful in the final segment; earlier ones
        // are path fragments and keep the path rules.
        if segments.iter().any(|segment| has_wildcards(segment)) {
            return Err(FsError::IllegalCharacters);
        }
        Ok(SearchPattern {
            prefix: segments.into_iter().map(str::to_string).collect(),
            folded: fold(name_pattern).chars().collect(),
        })
    }

    /// Literal directory names to walk down before matching children.
    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    pub fn matches(&self, name: &str) -> bool {
        let folded_name: Vec<char> = fold(name).chars().collect();
        wild_match(&self.folded, &folded_name)
    }
}

fn wild_match(pattern: &[char], text: &[char]) -> bool {
    let Some((&head, rest)) = pattern.split_first() else {
        return text.is_empty();
    };
    match head {
        '*' => (0..=text.len()).any(|skip| wild_match(rest, &text[skip..])),
        '?' => !text.is_empty() && wild_match(rest, &text[1..]),
        _ => text.first() == Some(&head) && wild_match(rest, &text[1..]),
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the fake filesystem engine

use std::io;

use crate::types::{FileAccess, OpenMode};

/// Coarse classification of engine failures, one bucket per observable
/// failure class of the modeled OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    UnsupportedFormat,
    NotFound,
    AccessDenied,
    InUse,
    AlreadyExists,
    NotEmpty,
    InvalidOperation,
    Internal,
}

/// Engine error type. Display strings reproduce the host OS messages
/// verbatim so assertions against message text carry over.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("Empty path name is not legal.")]
    EmptyPath,
    #[error("Empty file name is not legal.")]
    EmptyFileName,
    #[error("Path cannot be the empty string or all whitespace.")]
    EmptyOrWhitespacePath,
    #[error("The path is not of a legal form.")]
    IllegalPath,
    #[error("Illegal characters in path.")]
    IllegalCharacters,
    #[error("The UNC path should be of the form \\\\server\\share.")]
    UncPathInvalid,
    #[error("The directory name is invalid.")]
    DirectoryNameInvalid,
    #[error("Combining OpenMode: {mode:?} with FileAccess: {access:?} is invalid.")]
    InvalidOpenCombination { mode: OpenMode, access: FileAccess },
    #[error("Search pattern cannot contain '..' to move up directories and can be contained only internally in file/directory names, as in 'a..b'.")]
    SearchPatternContainsParent,
    #[error("Second path fragment must not be a drive or UNC name.")]
    SearchPatternIsRooted,
    #[error("Path must not be a drive.")]
    PathIsDrive,
    #[error("The given path's format is not supported.")]
    UnsupportedFormat,
    #[error("Reserved names are not supported.")]
    ReservedName,
    #[error("Could not find file '{0}'.")]
    FileNotFound(String),
    #[error("Could not find a part of the path '{0}'.")]
    DirectoryNotFound(String),
    #[error("The network path was not found")]
    NetworkPathNotFound,
    #[error("Access to the path '{0}' is denied.")]
    AccessDenied(String),
    #[error("The process cannot access the file '{0}' because it is being used by another process.")]
    FileInUse(String),
    #[error("Cannot create '{0}' because a file or directory with the same name already exists.")]
    AlreadyExists(String),
    #[error("The file '{0}' already exists.")]
    FileAlreadyExists(String),
    #[error("The directory is not empty.")]
    DirectoryNotEmpty,
    #[error("Source and destination path must have identical roots. Move will not work across volumes.")]
    RootsNotIdentical,
    #[error("Source and destination path must be different.")]
    SourceEqualsDestination,
    #[error("The specified path is invalid.")]
    PathInvalid,
    #[error("The UTC time represented when the offset is applied must be between year 0 and 10,000.")]
    FileTimeOutOfRange,
    #[error("Unable seek backward to overwrite data that previously existed in a file opened in Append mode.")]
    SeekBeforeAppend,
    #[error("Stream was too long.")]
    StreamTooLong,
    #[error("internal error: {0}")]
    Internal(String),
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::EmptyPath
            | FsError::EmptyFileName
            | FsError::EmptyOrWhitespacePath
            | FsError::IllegalPath
            | FsError::IllegalCharacters
            | FsError::UncPathInvalid
            | FsError::DirectoryNameInvalid
            | FsError::SearchPatternContainsParent
            | FsError::SearchPatternIsRooted
            | FsError::PathIsDrive => ErrorKind::InvalidArgument,
            FsError::UnsupportedFormat | FsError::ReservedName => ErrorKind::UnsupportedFormat,
            FsError::FileNotFound(_)
            | FsError::DirectoryNotFound(_)
            | FsError::NetworkPathNotFound => ErrorKind::NotFound,
            FsError::AccessDenied(_) => ErrorKind::AccessDenied,
            FsError::FileInUse(_) => ErrorKind::InUse,
            FsError::AlreadyExists(_) | FsError::FileAlreadyExists(_) => ErrorKind::AlreadyExists,
            FsError::DirectoryNotEmpty => ErrorKind::NotEmpty,
            FsError::InvalidOpenCombination { .. }
            | FsError::RootsNotIdentical
            | FsError::SourceEqualsDestination
            | FsError::PathInvalid
            | FsError::FileTimeOutOfRange
            | FsError::SeekBeforeAppend
            | FsError::StreamTooLong => ErrorKind::InvalidOperation,
            FsError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> io::Error {
        let kind = match err.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::AccessDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::InvalidArgument | ErrorKind::UnsupportedFormat => {
                io::ErrorKind::InvalidInput
            }
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_host_text() {
        assert_eq!(
            FsError::FileNotFound(r"C:\some\file.txt".into()).to_string(),
            r"Could not find file 'C:\some\file.txt'."
        );
        assert_eq!(
            FsError::UncPathInvalid.to_string(),
            r"The UNC path should be of the form \\server\share."
        );
        assert_eq!(
            FsError::NetworkPathNotFound.to_string(),
            "The network path was not found"
        );
    }

    #[test]
    fn kinds_cover_taxonomy() {
        assert_eq!(FsError::ReservedName.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(
            FsError::FileInUse(String::new()).kind(),
            ErrorKind::InUse
        );
        assert_eq!(FsError::DirectoryNotEmpty.kind(), ErrorKind::NotEmpty);
        assert_eq!(FsError::PathInvalid.kind(), ErrorKind::InvalidOperation);
        assert_eq!(FsError::StreamTooLong.kind(), ErrorKind::InvalidOperation);
        assert_eq!(
            FsError::InvalidOpenCombination { mode: OpenMode::Append, access: FileAccess::Read }
                .kind(),
            ErrorKind::InvalidOperation
        );
    }

    #[test]
    fn io_conversion_keeps_message() {
        let err: io::Error = FsError::AccessDenied(r"C:\locked.txt".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(
            err.to_string(),
            r"Access to the path 'C:\locked.txt' is denied."
        );
    }
}

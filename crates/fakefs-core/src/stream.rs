// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Stream facade over one open handle

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::error::FsResult;
use crate::vfs::{FsState, HandleId};

const SEEK_BEFORE_START: &str =
    "An attempt was made to move the position before the beginning of the stream.";

/// Random-access stream over an open file.
///
/// Content lives on the entry in the shared tree; the stream owns only its
/// cursor, so concurrent handles on the same file observe each other's
/// writes. Dropping the stream closes the handle, which also completes a
/// pending delete-on-close.
pub struct FakeFileStream {
    state: Arc<Mutex<FsState>>,
    handle: HandleId,
    closed: bool,
}

impl FakeFileStream {
    pub(crate) fn attach(state: Arc<Mutex<FsState>>, handle: HandleId) -> Self {
        Self { state, handle, closed: false }
    }

    /// Current content length of the backing file.
    pub fn len(&self) -> FsResult<u64> {
        self.state.lock().unwrap().stream_len(self.handle)
    }

    pub fn is_empty(&self) -> FsResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Grows with zero bytes or truncates in place. A cursor past the new
    /// end is pulled back to it.
    pub fn set_len(&mut self, len: u64) -> FsResult<()> {
        self.state.lock().unwrap().stream_set_len(self.handle, len)
    }

    pub fn position(&self) -> FsResult<u64> {
        self.state.lock().unwrap().stream_position(self.handle)
    }

    /// Path text the stream was opened with.
    pub fn name(&self) -> FsResult<String> {
        self.state.lock().unwrap().stream_path_text(self.handle)
    }

    /// Releases the handle early; dropping the stream does the same.
    pub fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.state.lock().unwrap().close_handle(self.handle)
    }
}

impl Read for FakeFileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        Ok(state.read_stream(self.handle, buf)?)
    }
}

impl Write for FakeFileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        Ok(state.write_stream(self.handle, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FakeFileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // One critical section covers reading the reference point and
        // moving the cursor.
        let mut state = self.state.lock().unwrap();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => state.stream_len(self.handle)?.checked_add_signed(delta),
            SeekFrom::Current(delta) => {
                state.stream_position(self.handle)?.checked_add_signed(delta)
            }
        };
        let Some(target) = target else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, SEEK_BEFORE_START));
        };
        Ok(state.stream_seek(self.handle, target)?)
    }
}

impl fmt::Debug for FakeFileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeFileStream")
            .field("handle", &self.handle)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for FakeFileStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(mut state) = self.state.lock() {
            let _ = state.close_handle(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsConfig;
    use crate::error::FsError;
    use crate::types::{FileAccess, OpenMode};
    use crate::vfs::FakeFs;

    fn fs_with_file(path: &str, content: &str) -> FakeFs {
        let fs = FakeFs::new(FsConfig::default()).expect("engine should build");
        let mut stream = fs.create_file(path).expect("create works");
        stream.write_all(content.as_bytes()).expect("write works");
        fs
    }

    #[test]
    fn read_walks_the_cursor_to_the_end() {
        let fs = fs_with_file(r"C:\doc.txt", "abcdef");
        let mut stream =
            fs.open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::Read).expect("open works");

        let mut buf = [0_u8; 4];
        assert_eq!(stream.read(&mut buf).expect("read works"), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(stream.read(&mut buf).expect("read works"), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(stream.read(&mut buf).expect("read works"), 0);
    }

    #[test]
    fn write_past_the_end_zero_fills_the_gap() {
        let fs = fs_with_file(r"C:\doc.txt", "ab");
        let mut stream = fs
            .open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::ReadWrite)
            .expect("open works");

        stream.seek(SeekFrom::Start(4)).expect("seek works");
        stream.write_all(b"zz").expect("write works");

        let mut all = Vec::new();
        stream.seek(SeekFrom::Start(0)).expect("seek works");
        stream.read_to_end(&mut all).expect("read works");
        assert_eq!(all, b"ab\0\0zz");
    }

    #[test]
    fn read_past_the_end_returns_zero_and_keeps_the_cursor() {
        let fs = fs_with_file(r"C:\doc.txt", "ab");
        let mut stream = fs
            .open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::ReadWrite)
            .expect("open works");

        stream.seek(SeekFrom::Start(100)).expect("seek works");
        let mut buf = [0_u8; 4];
        assert_eq!(stream.read(&mut buf).expect("read works"), 0);
        assert_eq!(stream.position().expect("position works"), 100);

        stream.write_all(b"XY").expect("write works");
        assert_eq!(stream.len().expect("len works"), 102);

        stream.seek(SeekFrom::Start(0)).expect("seek works");
        let mut all = Vec::new();
        stream.read_to_end(&mut all).expect("read works");
        assert_eq!(&all[..2], b"ab");
        assert!(all[2..100].iter().all(|byte| *byte == 0));
        assert_eq!(&all[100..], b"XY");
    }

    #[test]
    fn overwrite_in_the_middle_keeps_the_tail() {
        let fs = fs_with_file(r"C:\doc.txt", "abcdef");
        let mut stream = fs
            .open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::ReadWrite)
            .expect("open works");

        stream.seek(SeekFrom::Start(1)).expect("seek works");
        stream.write_all(b"XY").expect("write works");
        assert_eq!(stream.position().expect("position works"), 3);

        stream.seek(SeekFrom::Start(0)).expect("seek works");
        let mut all = String::new();
        stream.read_to_string(&mut all).expect("read works");
        assert_eq!(all, "aXYdef");
    }

    #[test]
    fn seek_variants_and_before_start_rejection() {
        let fs = fs_with_file(r"C:\doc.txt", "abcdef");
        let mut stream = fs
            .open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::ReadWrite)
            .expect("open works");

        assert_eq!(stream.seek(SeekFrom::End(-2)).expect("seek works"), 4);
        assert_eq!(stream.seek(SeekFrom::Current(-1)).expect("seek works"), 3);
        assert_eq!(stream.seek(SeekFrom::Start(100)).expect("seek works"), 100);

        let err = stream.seek(SeekFrom::End(-10)).expect_err("before start");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(err.to_string(), SEEK_BEFORE_START);
    }

    #[test]
    fn reading_a_write_only_stream_is_denied() {
        let fs = fs_with_file(r"C:\doc.txt", "abc");
        let mut stream =
            fs.open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::Write).expect("open works");

        let mut buf = [0_u8; 2];
        let err = stream.read(&mut buf).expect_err("read is denied");
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let mut reader =
            fs.open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::Read).expect("open works");
        let write_err = reader.write(b"x").expect_err("write is denied");
        assert_eq!(write_err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn set_len_truncates_and_clamps_the_cursor() {
        let fs = fs_with_file(r"C:\doc.txt", "abcdef");
        let mut stream = fs
            .open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::ReadWrite)
            .expect("open works");

        stream.seek(SeekFrom::End(0)).expect("seek works");
        stream.set_len(3).expect("set_len works");
        assert_eq!(stream.len().expect("len works"), 3);
        assert_eq!(stream.position().expect("position works"), 3);

        stream.set_len(5).expect("set_len works");
        stream.seek(SeekFrom::Start(0)).expect("seek works");
        let mut all = Vec::new();
        stream.read_to_end(&mut all).expect("read works");
        assert_eq!(all, b"abc\0\0");
    }

    #[test]
    fn write_beyond_the_stream_ceiling_errors_and_the_engine_survives() {
        let fs = fs_with_file(r"C:\doc.txt", "ab");
        let mut stream = fs
            .open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::ReadWrite)
            .expect("open works");

        stream.seek(SeekFrom::Start(u64::MAX)).expect("seek works");
        let err = stream.write(b"x").expect_err("write cannot fit");
        assert_eq!(err.to_string(), "Stream was too long.");
        assert_eq!(stream.set_len(u64::MAX).err(), Some(FsError::StreamTooLong));

        assert!(fs.file_exists(r"C:\doc.txt"));
        stream.seek(SeekFrom::Start(0)).expect("seek works");
        let mut all = String::new();
        stream.read_to_string(&mut all).expect("read works");
        assert_eq!(all, "ab");
    }

    #[test]
    fn name_reports_the_opening_path_text() {
        let fs = fs_with_file(r"C:\Docs.txt", "x");
        let stream = fs
            .open_file(r"c:\DOCS.TXT", OpenMode::Open, FileAccess::Read)
            .expect("open works");
        assert_eq!(stream.name().expect("name works"), r"c:\DOCS.TXT");
    }

    #[test]
    fn close_is_idempotent_and_releases_sharing() {
        let fs = fs_with_file(r"C:\doc.txt", "x");
        let mut stream = fs
            .open_file_with(
                r"C:\doc.txt",
                OpenMode::Open,
                FileAccess::Read,
                crate::types::OpenOptions { exclusive: true, ..Default::default() },
            )
            .expect("open works");

        assert_eq!(
            fs.open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::Read).err(),
            Some(FsError::FileInUse(r"C:\doc.txt".into()))
        );
        stream.close().expect("close works");
        stream.close().expect("second close is a no-op");
        assert!(fs.open_file(r"C:\doc.txt", OpenMode::Open, FileAccess::Read).is_ok());
    }
}

//! A single append-only log file, `<fid>.dat` (spec §4.2).
//!
//! Bytes written at offset `o` remain at offset `o` forever: the active
//! segment only ever grows by appending at its tracked tail offset, and
//! sealed segments are opened read-only and never written to again.
//!
//! Positional reads use `pread`/`pwrite` (`FileExt`) rather than
//! seek-then-read, so concurrent readers never fight over a shared cursor —
//! this is what lets `Database::get` take only a shared lock while another
//! thread appends under the exclusive one.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::SegmentError;

/// Filename extension for segment data files.
pub const SEGMENT_EXT: &str = "dat";

#[derive(Debug)]
pub struct Segment {
    fid: u64,
    path: PathBuf,
    file: File,
    /// Current tail offset: the next append lands here.
    tail: AtomicI64,
    writable: bool,
}

impl Segment {
    /// Creates a brand-new, empty segment and opens it read-write.
    pub fn create(dir: &Path, fid: u64) -> Result<Self, SegmentError> {
        let path = dir.join(format!("{fid}.{SEGMENT_EXT}"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self {
            fid,
            path,
            file,
            tail: AtomicI64::new(0),
            writable: true,
        })
    }

    /// Opens an existing segment read-write, for use as the active segment
    /// during recovery. The tail offset starts at the file's current length;
    /// the caller is expected to replay records and advance it accordingly
    /// (recovery does this by construction, since every read advances by
    /// exactly the bytes the writer produced).
    pub fn open_active(dir: &Path, fid: u64) -> Result<Self, SegmentError> {
        let path = dir.join(format!("{fid}.{SEGMENT_EXT}"));
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self {
            fid,
            path,
            file,
            tail: AtomicI64::new(0),
            writable: true,
        })
    }

    /// Opens an existing segment read-only, as a sealed segment.
    pub fn open_sealed(dir: &Path, fid: u64) -> Result<Self, SegmentError> {
        let path = dir.join(format!("{fid}.{SEGMENT_EXT}"));
        let file = OpenOptions::new().read(true).open(&path)?;
        let len = file.metadata()?.len() as i64;
        Ok(Self {
            fid,
            path,
            file,
            tail: AtomicI64::new(len),
            writable: false,
        })
    }

    pub fn fid(&self) -> u64 {
        self.fid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Current tail offset (bytes written so far).
    pub fn size(&self) -> i64 {
        self.tail.load(Ordering::SeqCst)
    }

    /// Sets the tail offset directly. Used by recovery, which tracks the
    /// write cursor by replaying the log rather than by appending.
    pub fn set_size(&self, size: i64) {
        self.tail.store(size, Ordering::SeqCst);
    }

    /// Appends `bytes` at the current tail and returns the offset the write
    /// started at.
    pub fn append(&self, bytes: &[u8]) -> Result<i64, SegmentError> {
        debug_assert!(self.writable, "append called on a sealed segment");
        let offset = self.tail.load(Ordering::SeqCst);
        let written = self.file.write_at(bytes, offset as u64)?;
        if written != bytes.len() {
            return Err(SegmentError::ShortWrite {
                expected: bytes.len(),
                wrote: written,
            });
        }
        self.tail.store(offset + written as i64, Ordering::SeqCst);
        Ok(offset)
    }

    /// Reads exactly `len` bytes starting at `offset`.
    pub fn read_at(&self, offset: i64, len: usize) -> Result<Vec<u8>, SegmentError> {
        let mut buf = vec![0u8; len];
        let n = self.file.read_at(&mut buf, offset as u64)?;
        if n != len {
            return Err(SegmentError::ShortRead {
                offset: offset as u64,
                expected: len,
                got: n,
            });
        }
        Ok(buf)
    }

    /// Best-effort read of up to `len` bytes starting at `offset`, returning
    /// however many bytes were actually available. Used by the scan path,
    /// which must distinguish "fewer bytes than a full record" from a hard
    /// I/O error (spec §9.3).
    pub fn read_up_to(&self, offset: i64, len: usize) -> Result<Vec<u8>, SegmentError> {
        let mut buf = vec![0u8; len];
        let n = self.file.read_at(&mut buf, offset as u64)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn flush(&self) -> Result<(), SegmentError> {
        self.file.sync_all()?;
        Ok(())
    }
}

//! The ordered collection of segments (spec §4.3): one active (writable)
//! segment plus zero or more sealed (read-only) segments, with rotation on
//! a size threshold.
//!
//! Rotation is checked *after* a write completes, so a single record larger
//! than `segment_size` still lands whole in one segment (spec §4.3,
//! "Rotation policy" — this matches the original source deliberately).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{SegmentError, SegmentSetError};
use crate::record::{self, Header, Record, HEADER_SIZE};
use crate::segment::{Segment, SEGMENT_EXT};

pub struct SegmentSet {
    dir: PathBuf,
    segment_size: i64,
    active: Arc<Segment>,
    sealed: Mutex<HashMap<u64, Arc<Segment>>>,
}

impl SegmentSet {
    /// Enumerates `.dat` files in `dir` and returns their fids, sorted
    /// ascending.
    pub fn list(dir: &Path) -> Result<Vec<u64>, SegmentSetError> {
        let mut fids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
                continue;
            }
            if let Some(fid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                fids.push(fid);
            }
        }
        fids.sort_unstable();
        Ok(fids)
    }

    /// Creates a segment set with a single, brand-new active segment
    /// (`fid = 0`), for opening a fresh database directory.
    pub fn create_fresh(dir: &Path, segment_size: i64) -> Result<Self, SegmentSetError> {
        let active = Segment::create(dir, 0)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            segment_size,
            active: Arc::new(active),
            sealed: Mutex::new(HashMap::new()),
        })
    }

    /// Assembles a segment set out of already-opened segments. Used by
    /// recovery, which opens every fid itself while replaying the log to
    /// determine the active segment's true tail offset.
    pub(crate) fn from_segments(
        dir: &Path,
        segment_size: i64,
        active: Segment,
        sealed: HashMap<u64, Segment>,
    ) -> Self {
        Self {
            dir: dir.to_path_buf(),
            segment_size,
            active: Arc::new(active),
            sealed: Mutex::new(sealed.into_iter().map(|(fid, seg)| (fid, Arc::new(seg))).collect()),
        }
    }

    pub fn active_fid(&self) -> u64 {
        self.active.fid()
    }

    pub fn active_size(&self) -> i64 {
        self.active.size()
    }

    /// Appends `record_bytes` to the active segment, rotating afterward if
    /// the new tail offset meets or exceeds `segment_size`.
    pub fn write(&mut self, record_bytes: &[u8]) -> Result<(u64, i64), SegmentSetError> {
        let fid = self.active.fid();
        let offset = self.active.append(record_bytes)?;
        if self.active.size() >= self.segment_size {
            self.rotate()?;
        }
        Ok((fid, offset))
    }

    fn rotate(&mut self) -> Result<(), SegmentSetError> {
        self.active.flush()?;
        let next_fid = self.active.fid() + 1;
        let new_active = Segment::create(&self.dir, next_fid)?;
        let old_active = std::mem::replace(&mut self.active, Arc::new(new_active));
        let old_fid = old_active.fid();
        self.sealed.lock().unwrap().insert(old_fid, old_active);
        tracing::debug!(sealed_fid = old_fid, new_active_fid = next_fid, "rotated segment");
        Ok(())
    }

    /// Reads exactly `len` bytes from `(fid, offset)`, dispatching to the
    /// active segment or the sealed segment with that fid, opening it
    /// on-demand if it is not already in the fd cache.
    pub fn read(&self, fid: u64, offset: i64, len: usize) -> Result<Vec<u8>, SegmentSetError> {
        if fid == self.active.fid() {
            Ok(self.active.read_at(offset, len)?)
        } else {
            Ok(self.sealed_segment(fid)?.read_at(offset, len)?)
        }
    }

    fn sealed_segment(&self, fid: u64) -> Result<Arc<Segment>, SegmentSetError> {
        let mut sealed = self.sealed.lock().unwrap();
        if let Some(segment) = sealed.get(&fid) {
            return Ok(Arc::clone(segment));
        }
        let segment = match Segment::open_sealed(&self.dir, fid) {
            Ok(segment) => Arc::new(segment),
            Err(SegmentError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SegmentSetError::MissingSegment(fid));
            }
            Err(e) => return Err(e.into()),
        };
        sealed.insert(fid, Arc::clone(&segment));
        Ok(segment)
    }

    /// Fids of every sealed segment, sorted ascending.
    pub fn sealed_fids(&self) -> Vec<u64> {
        let sealed = self.sealed.lock().unwrap();
        let mut fids: Vec<u64> = sealed.keys().copied().collect();
        fids.sort_unstable();
        fids
    }

    /// Opens a record-by-record scan of segment `fid` starting at offset 0.
    pub fn scan(&self, fid: u64) -> Result<SegmentScan, SegmentSetError> {
        let segment = if fid == self.active.fid() {
            Arc::clone(&self.active)
        } else {
            self.sealed_segment(fid)?
        };
        Ok(SegmentScan { segment, offset: 0 })
    }

    /// Closes and unlinks the sealed segment with fid `fid`. A no-op if no
    /// such sealed segment is cached.
    pub fn remove(&mut self, fid: u64) -> Result<(), SegmentSetError> {
        let removed = self.sealed.lock().unwrap().remove(&fid);
        if let Some(segment) = removed {
            let path = segment.path().to_path_buf();
            drop(segment);
            fs::remove_file(&path)?;
            tracing::debug!(fid, "unlinked merged-away segment");
        }
        Ok(())
    }

    /// Flushes and drops every open segment's file handle.
    pub fn close(&mut self) -> Result<(), SegmentSetError> {
        self.active.flush()?;
        for segment in self.sealed.lock().unwrap().values() {
            segment.flush()?;
        }
        Ok(())
    }
}

/// A single decoded record plus the offset it started at within its
/// segment, as produced by [`SegmentSet::scan`].
pub struct ScannedRecord {
    pub offset: i64,
    pub header: Header,
    pub record: Record,
}

/// Iterates successive records in one segment, starting at offset 0, until
/// EOF or a torn trailing record (spec §9.3: tolerated, not an error).
pub struct SegmentScan {
    segment: Arc<Segment>,
    offset: i64,
}

impl Iterator for SegmentScan {
    type Item = Result<ScannedRecord, SegmentSetError>;

    fn next(&mut self) -> Option<Self::Item> {
        let header_bytes = match self.segment.read_up_to(self.offset, HEADER_SIZE) {
            Ok(b) => b,
            Err(e) => return Some(Err(e.into())),
        };
        if header_bytes.len() < HEADER_SIZE {
            return None; // clean EOF
        }

        let header = match record::decode_header(&header_bytes) {
            Ok(h) => h,
            Err(e) => return Some(Err(SegmentSetError::Segment(e.into()))),
        };

        let total = header.total_size();
        let full = match self.segment.read_up_to(self.offset, total) {
            Ok(b) => b,
            Err(e) => return Some(Err(e.into())),
        };
        if full.len() < total {
            tracing::warn!(
                fid = self.segment.fid(),
                offset = self.offset,
                "torn record at end of segment, ending scan"
            );
            return None;
        }

        let start_offset = self.offset;
        match record::decode(&full) {
            Ok((header, record)) => {
                self.offset += total as i64;
                Some(Ok(ScannedRecord {
                    offset: start_offset,
                    header,
                    record,
                }))
            }
            Err(e) => Some(Err(SegmentSetError::Segment(e.into()))),
        }
    }
}

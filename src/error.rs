use std::io;

/// Errors surfaced by the record codec (see `record.rs`).
///
/// These never self-repair: a CRC mismatch or a short read is returned to
/// the caller as-is, the database does not retry or invalidate state.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("i/o error decoding record: {0}")]
    Io(#[from] io::Error),

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("crc mismatch: stored {stored:#x}, computed {computed:#x}")]
    CrcMismatch { stored: u32, computed: u32 },
}

/// Errors surfaced by a single segment file (see `segment.rs`).
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("i/o error on segment: {0}")]
    Io(#[from] io::Error),

    #[error("short read at offset {offset}: expected {expected} bytes, got {got}")]
    ShortRead {
        offset: u64,
        expected: usize,
        got: usize,
    },

    #[error("short write: expected {expected} bytes, wrote {wrote}")]
    ShortWrite { expected: usize, wrote: usize },

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Errors surfaced by the segment set (see `segment_set.rs`).
#[derive(Debug, thiserror::Error)]
pub enum SegmentSetError {
    #[error("i/o error in segment set: {0}")]
    Io(#[from] io::Error),

    #[error("no segment with fid {0} is open")]
    MissingSegment(u64),

    #[error(transparent)]
    Segment(#[from] SegmentError),
}

/// Top-level error type returned by every public `Database` operation.
///
/// `KeyNotFound` and `NothingToMerge` are expected, non-fatal sentinels;
/// every other variant indicates a transient I/O problem or corruption and
/// leaves the database in whatever state it reached so far — partial writes
/// are not rolled back (see spec §7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key not found")]
    KeyNotFound,

    #[error("nothing to merge")]
    NothingToMerge,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("short write: expected {expected} bytes, wrote {wrote}")]
    ShortWrite { expected: usize, wrote: usize },

    #[error("crc mismatch: stored {stored:#x}, computed {computed:#x}")]
    CrcMismatch { stored: u32, computed: u32 },

    #[error("no segment with fid {0} is open")]
    MissingSegment(u64),
}

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Io(e) => Error::Io(e),
            RecordError::ShortRead { expected, got } => Error::ShortRead { expected, got },
            RecordError::CrcMismatch { stored, computed } => {
                Error::CrcMismatch { stored, computed }
            }
        }
    }
}

impl From<SegmentError> for Error {
    fn from(err: SegmentError) -> Self {
        match err {
            SegmentError::Io(e) => Error::Io(e),
            SegmentError::ShortRead {
                offset: _,
                expected,
                got,
            } => Error::ShortRead { expected, got },
            SegmentError::ShortWrite { expected, wrote } => Error::ShortWrite { expected, wrote },
            SegmentError::Record(e) => e.into(),
        }
    }
}

impl From<SegmentSetError> for Error {
    fn from(err: SegmentSetError) -> Self {
        match err {
            SegmentSetError::Io(e) => Error::Io(e),
            SegmentSetError::MissingSegment(fid) => Error::MissingSegment(fid),
            SegmentSetError::Segment(e) => e.into(),
        }
    }
}

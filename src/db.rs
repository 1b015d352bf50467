//! The database facade (spec §4.5): serializes writes, lets reads run in
//! parallel, and coordinates `set`/`get`/`delete`/`merge` plus recovery on
//! open.
//!
//! A single readers-writer lock guards the entire database (spec §5).
//! `set`, `delete`, and `merge` take the exclusive (writer) side; `get`
//! takes the shared (reader) side. At most one mutation proceeds at a time,
//! and mutations are totally ordered; many `get`s can run concurrently with
//! each other, but never alongside a mutation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;
use crate::keydir::{DirEntry, KeyDir};
use crate::merge;
use crate::options::Options;
use crate::record::{self, Record, HEADER_SIZE};
use crate::recovery;
use crate::segment_set::SegmentSet;

struct State {
    segments: SegmentSet,
    keydir: KeyDir,
}

/// An open, embedded key-value database.
///
/// Construct one with [`Database::open`]. All operations take `&self`: the
/// internal [`RwLock`] is what provides the serialized-writes /
/// parallel-reads discipline, so a `Database` can be shared across threads
/// behind an `Arc` without any extra synchronization from the caller.
pub struct Database {
    dir: PathBuf,
    segment_size: i64,
    state: RwLock<State>,
}

impl Database {
    /// Opens the database at `options.dir`, creating it if absent.
    ///
    /// If the directory already contains `.dat` files, the key directory is
    /// rebuilt from them (spec §4.6); otherwise a fresh segment `fid = 0` is
    /// created.
    pub fn open(options: Options) -> Result<Self, Error> {
        let segment_size = options.normalized_segment_size();
        let dir = options.dir;

        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let fids = SegmentSet::list(&dir)?;
        let (segments, keydir) = if fids.is_empty() {
            tracing::debug!(dir = %dir.display(), "opening fresh database");
            (SegmentSet::create_fresh(&dir, segment_size)?, KeyDir::new())
        } else {
            tracing::debug!(dir = %dir.display(), segments = fids.len(), "recovering database");
            let (segments, keydir) = recovery::recover(&dir, segment_size, &fids)?;
            tracing::debug!(keys = keydir.len(), "recovery complete");
            (segments, keydir)
        };

        Ok(Self {
            dir,
            segment_size,
            state: RwLock::new(State { segments, keydir }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segment_size(&self) -> i64 {
        self.segment_size
    }

    /// Writes `value` for `key`, overwriting any prior value.
    ///
    /// Empty keys and empty values are legal; `len == 0` is not distinguished
    /// from absence at this layer.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let mut state = self.state.write().unwrap();

        let timestamp = unix_now();
        let record = Record::new(key.to_vec(), value.to_vec(), timestamp);
        let bytes = record.encode();
        let (fid, offset) = state.segments.write(&bytes)?;

        state.keydir.put(
            key.to_vec(),
            DirEntry {
                fid,
                offset,
                key_size: key.len() as u32,
                value_size: value.len() as u32,
                timestamp,
            },
        );
        Ok(())
    }

    /// Reads the current value for `key`.
    ///
    /// Returns [`Error::KeyNotFound`] if there is no live entry. A CRC
    /// failure on the stored record is surfaced directly, not retried.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, Error> {
        let state = self.state.read().unwrap();
        let entry = state.keydir.get(key).ok_or(Error::KeyNotFound)?;

        let total_size = HEADER_SIZE + entry.key_size as usize + entry.value_size as usize;
        let bytes = state.segments.read(entry.fid, entry.offset, total_size)?;
        let (_, record) = record::decode(&bytes)?;
        Ok(record.value)
    }

    /// Deletes `key`.
    ///
    /// Returns [`Error::KeyNotFound`] (without writing a tombstone) if the
    /// key has no live entry.
    pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let mut state = self.state.write().unwrap();
        if state.keydir.get(key).is_none() {
            return Err(Error::KeyNotFound);
        }

        let timestamp = unix_now();
        let bytes = Record::tombstone(key.to_vec(), timestamp).encode();
        state.segments.write(&bytes)?;
        state.keydir.delete(key);
        Ok(())
    }

    /// Reclaims space by rewriting every sealed segment's live records
    /// forward into the active segment and unlinking the sealed files.
    ///
    /// Returns [`Error::NothingToMerge`] if there are fewer than two
    /// segments (nothing is sealed yet).
    pub fn merge(&self) -> Result<(), Error> {
        let mut state = self.state.write().unwrap();
        let State { segments, keydir } = &mut *state;
        merge::merge(segments, keydir)
    }

    /// Flushes and closes every open segment file handle.
    pub fn close(&self) -> Result<(), Error> {
        let mut state = self.state.write().unwrap();
        state.segments.close()?;
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.write() {
            if let Err(err) = state.segments.close() {
                tracing::error!(error = %err, "failed to flush segments on drop");
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &Path, segment_size: i64) -> Database {
        Database::open(Options::new(dir).with_segment_size(segment_size)).unwrap()
    }

    #[test]
    fn test_set_then_get_then_overwrite() {
        let dir = tempdir().unwrap();
        let db = open(dir.path(), Options::default().segment_size);

        db.set(b"test_key", b"test_value").unwrap();
        assert_eq!(db.get(b"test_key").unwrap(), b"test_value");

        db.set(b"test_key", b"test_value_2").unwrap();
        assert_eq!(db.get(b"test_key").unwrap(), b"test_value_2");
    }

    #[test]
    fn test_get_missing_key() {
        let dir = tempdir().unwrap();
        let db = open(dir.path(), Options::default().segment_size);
        assert!(matches!(db.get(b"missing").unwrap_err(), Error::KeyNotFound));
    }

    #[test]
    fn test_set_get_delete_get() {
        let dir = tempdir().unwrap();
        let db = open(dir.path(), Options::default().segment_size);

        db.set(b"k", b"v").unwrap();
        assert_eq!(db.get(b"k").unwrap(), b"v");

        db.delete(b"k").unwrap();
        assert!(matches!(db.get(b"k").unwrap_err(), Error::KeyNotFound));
    }

    #[test]
    fn test_delete_missing_key_is_key_not_found_without_writing_tombstone() {
        let dir = tempdir().unwrap();
        let db = open(dir.path(), Options::default().segment_size);
        assert!(matches!(db.delete(b"missing").unwrap_err(), Error::KeyNotFound));
    }

    #[test]
    fn test_empty_key_and_value_round_trip() {
        let dir = tempdir().unwrap();
        let db = open(dir.path(), Options::default().segment_size);

        db.set(b"", b"").unwrap();
        assert_eq!(db.get(b"").unwrap(), b"");
    }

    #[test]
    fn test_merge_with_only_active_segment_returns_nothing_to_merge() {
        let dir = tempdir().unwrap();
        let db = open(dir.path(), Options::default().segment_size);
        db.set(b"k", b"v").unwrap();
        assert!(matches!(db.merge().unwrap_err(), Error::NothingToMerge));
    }

    #[test]
    fn test_reopen_after_close_preserves_data() {
        let dir = tempdir().unwrap();
        {
            let db = open(dir.path(), Options::default().segment_size);
            db.set(b"k", b"v").unwrap();
            db.close().unwrap();
        }

        let db = open(dir.path(), Options::default().segment_size);
        assert_eq!(db.get(b"k").unwrap(), b"v");
    }

    #[test]
    fn test_reopen_after_crash_without_close_preserves_data() {
        let dir = tempdir().unwrap();
        {
            let db = open(dir.path(), Options::default().segment_size);
            db.set(b"k", b"v1").unwrap();
            // Dropped without calling close(): simulates a process crash.
        }

        let db = open(dir.path(), Options::default().segment_size);
        assert_eq!(db.get(b"k").unwrap(), b"v1");
    }
}

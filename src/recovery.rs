//! Rebuilds the key directory from the segments already on disk (spec §4.6).
//!
//! Fids are listed and sorted ascending; the highest fid is the active
//! segment (opened read-write), everything else sealed (read-only). Each
//! segment is replayed from offset 0: live records install/overwrite a
//! directory entry, tombstones *remove* one (spec §9.2 — several revisions
//! of the source got this wrong and let a deleted key resurrect after
//! reopen; this is the fix). Replay stops cleanly at EOF or at a torn
//! trailing record (spec §9.3) without failing recovery outright, but a
//! CRC mismatch on an otherwise complete record is mid-file corruption, not
//! a torn write, and is surfaced as a hard error (spec §7) rather than
//! silently truncating the replay.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;
use crate::keydir::{DirEntry, KeyDir};
use crate::record::{self, HEADER_SIZE};
use crate::segment::Segment;
use crate::segment_set::SegmentSet;

/// Replays every segment in `fids` and returns the reconstructed segment set
/// (with the active segment's tail offset set to where replay stopped) and
/// key directory.
pub(crate) fn recover(
    dir: &Path,
    segment_size: i64,
    fids: &[u64],
) -> Result<(SegmentSet, KeyDir), Error> {
    let max_fid = *fids.iter().max().expect("recover called with no fids");

    let mut sealed_segments: HashMap<u64, Segment> = HashMap::new();
    let mut active_segment: Option<Segment> = None;
    let mut keydir = KeyDir::new();

    for &fid in fids {
        let segment = if fid == max_fid {
            Segment::open_active(dir, fid)?
        } else {
            Segment::open_sealed(dir, fid)?
        };

        let mut offset: i64 = 0;
        loop {
            let header_bytes = segment.read_up_to(offset, HEADER_SIZE)?;
            if header_bytes.len() < HEADER_SIZE {
                break; // clean EOF
            }

            let header = match record::decode_header(&header_bytes) {
                Ok(h) => h,
                Err(_) => {
                    tracing::warn!(fid, offset, "undecodable header during recovery, stopping replay");
                    break;
                }
            };

            let total = header.total_size();
            let full = segment.read_up_to(offset, total)?;
            if full.len() < total {
                tracing::warn!(
                    fid,
                    offset,
                    "torn record at end of segment during recovery, stopping replay"
                );
                break;
            }

            let (header, rec) = record::decode(&full).map_err(|err| {
                tracing::warn!(fid, offset, error = %err, "crc mismatch during recovery");
                err
            })?;

            if header.is_tombstone() {
                keydir.delete(&rec.key);
            } else {
                keydir.put(
                    rec.key.clone(),
                    DirEntry {
                        fid,
                        offset,
                        key_size: header.key_size,
                        value_size: header.value_size,
                        timestamp: header.timestamp,
                    },
                );
            }

            offset += total as i64;
        }

        if fid == max_fid {
            segment.set_size(offset);
            tracing::debug!(fid, tail = offset, "recovered active segment");
            active_segment = Some(segment);
        } else {
            tracing::debug!(fid, tail = offset, "recovered sealed segment");
            sealed_segments.insert(fid, segment);
        }
    }

    let active_segment = active_segment.expect("active segment (highest fid) must be in fids");
    let set = SegmentSet::from_segments(dir, segment_size, active_segment, sealed_segments);
    Ok((set, keydir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::tempdir;

    #[test]
    fn test_recover_rebuilds_directory_last_write_wins() {
        let dir = tempdir().unwrap();
        let mut set = SegmentSet::create_fresh(dir.path(), 4096).unwrap();
        set.write(&Record::new(b"k".to_vec(), b"v1".to_vec(), 1).encode())
            .unwrap();
        set.write(&Record::new(b"k".to_vec(), b"v2".to_vec(), 2).encode())
            .unwrap();
        set.close().unwrap();
        drop(set);

        let fids = SegmentSet::list(dir.path()).unwrap();
        let (set, keydir) = recover(dir.path(), 4096, &fids).unwrap();

        let entry = keydir.get(b"k").unwrap();
        let bytes = set.read(entry.fid, entry.offset, HEADER_SIZE + 1 + entry.value_size as usize).unwrap();
        let (_, record) = record::decode(&bytes).unwrap();
        assert_eq!(record.value, b"v2");
    }

    #[test]
    fn test_recover_honors_tombstones() {
        let dir = tempdir().unwrap();
        let mut set = SegmentSet::create_fresh(dir.path(), 4096).unwrap();
        set.write(&Record::new(b"k".to_vec(), b"v".to_vec(), 1).encode())
            .unwrap();
        set.write(&Record::tombstone(b"k".to_vec(), 2).encode())
            .unwrap();
        set.close().unwrap();
        drop(set);

        let fids = SegmentSet::list(dir.path()).unwrap();
        let (_set, keydir) = recover(dir.path(), 4096, &fids).unwrap();

        assert!(keydir.get(b"k").is_none());
    }

    #[test]
    fn test_recover_tolerates_torn_trailing_record() {
        let dir = tempdir().unwrap();
        let mut set = SegmentSet::create_fresh(dir.path(), 4096).unwrap();
        set.write(&Record::new(b"k1".to_vec(), b"v1".to_vec(), 1).encode())
            .unwrap();
        set.close().unwrap();
        drop(set);

        // Simulate a torn write: append a truncated second record's header.
        let path = dir.path().join("0.dat");
        let mut bytes = Record::new(b"k2".to_vec(), b"v2".to_vec(), 2).encode();
        bytes.truncate(bytes.len() - 3);
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&bytes).unwrap();
        }

        let fids = SegmentSet::list(dir.path()).unwrap();
        let (set, keydir) = recover(dir.path(), 4096, &fids).unwrap();

        assert!(keydir.get(b"k1").is_some());
        assert!(keydir.get(b"k2").is_none());
        // tail offset stops right after the complete first record.
        assert_eq!(set.active_size(), HEADER_SIZE as i64 + 2 + 2);
    }

    #[test]
    fn test_recover_fails_hard_on_mid_file_corruption() {
        let dir = tempdir().unwrap();
        let mut set = SegmentSet::create_fresh(dir.path(), 4096).unwrap();
        set.write(&Record::new(b"k1".to_vec(), b"v1".to_vec(), 1).encode())
            .unwrap();
        set.close().unwrap();
        drop(set);

        // Corrupt a byte inside the (complete) first record's value.
        let path = dir.path().join("0.dat");
        {
            use std::io::{Seek, SeekFrom, Write};
            let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as i64 as u64 + 2)).unwrap();
            file.write_all(&[0xff]).unwrap();
        }

        let fids = SegmentSet::list(dir.path()).unwrap();
        let err = recover(dir.path(), 4096, &fids).unwrap_err();
        assert!(matches!(err, Error::CrcMismatch { .. }));
    }
}

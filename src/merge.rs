//! Offline compaction (spec §4.6): rewrites every live record out of each
//! sealed segment into the active segment, then unlinks the sealed file.
//!
//! The active segment itself is never compacted (spec §9, open question
//! resolved the way the source leaves it: new writes may rotate it into a
//! sealed segment later, at which point a future merge will reach it).
//!
//! **Liveness check.** A record at `(fid, start_offset)` is live iff the
//! directory entry for its key is exactly `{fid, start_offset}`. The start
//! offset must be captured *before* advancing past the record — the source
//! has a known bug comparing against the post-advance offset instead (spec
//! §9.1), which this implementation avoids because [`crate::segment_set::SegmentScan`]
//! already yields the pre-advance offset alongside each record.

use crate::error::Error;
use crate::keydir::{DirEntry, KeyDir};
use crate::record::Record;
use crate::segment_set::SegmentSet;

pub(crate) fn merge(segments: &mut SegmentSet, keydir: &mut KeyDir) -> Result<(), Error> {
    let sealed_fids = segments.sealed_fids();
    if sealed_fids.is_empty() {
        return Err(Error::NothingToMerge);
    }

    for fid in sealed_fids {
        let scanned: Vec<_> = segments.scan(fid)?.collect::<Result<_, _>>()?;

        for entry in scanned {
            if entry.header.is_tombstone() {
                continue; // superseded or deleted; nothing to carry forward
            }

            let still_live = matches!(
                keydir.get(&entry.record.key),
                Some(current) if current.fid == fid && current.offset == entry.offset
            );
            if !still_live {
                continue; // stale: a newer write or a delete replaced it
            }

            let rewritten = Record::new(
                entry.record.key.clone(),
                entry.record.value.clone(),
                entry.record.timestamp,
            );
            let (new_fid, new_offset) = segments.write(&rewritten.encode())?;
            keydir.put(
                entry.record.key,
                DirEntry {
                    fid: new_fid,
                    offset: new_offset,
                    key_size: entry.header.key_size,
                    value_size: entry.header.value_size,
                    timestamp: entry.header.timestamp,
                },
            );
        }

        segments.remove(fid)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{self, HEADER_SIZE};
    use tempfile::tempdir;

    fn read_value(segments: &SegmentSet, entry: DirEntry) -> Vec<u8> {
        let bytes = segments
            .read(
                entry.fid,
                entry.offset,
                HEADER_SIZE + entry.key_size as usize + entry.value_size as usize,
            )
            .unwrap();
        record::decode(&bytes).unwrap().1.value
    }

    #[test]
    fn test_nothing_to_merge_with_only_active_segment() {
        let dir = tempdir().unwrap();
        let mut segments = SegmentSet::create_fresh(dir.path(), 4096).unwrap();
        let mut keydir = KeyDir::new();
        segments.write(&Record::new(b"k".to_vec(), b"v".to_vec(), 1).encode()).unwrap();
        keydir.put(b"k".to_vec(), DirEntry { fid: 0, offset: 0, key_size: 1, value_size: 1, timestamp: 1 });

        let err = merge(&mut segments, &mut keydir).unwrap_err();
        assert!(matches!(err, Error::NothingToMerge));
    }

    #[test]
    fn test_merge_keeps_latest_value_and_drops_superseded() {
        let dir = tempdir().unwrap();
        // small segment_size forces every write into its own sealed segment
        let mut segments = SegmentSet::create_fresh(dir.path(), 1).unwrap();
        let mut keydir = KeyDir::new();

        for (i, value) in ["v1", "v2", "v3"].iter().enumerate() {
            let bytes = Record::new(b"k".to_vec(), value.as_bytes().to_vec(), i as u64).encode();
            let (fid, offset) = segments.write(&bytes).unwrap();
            keydir.put(
                b"k".to_vec(),
                DirEntry { fid, offset, key_size: 1, value_size: value.len() as u32, timestamp: i as u64 },
            );
        }

        assert_eq!(segments.sealed_fids().len(), 3); // segment_size=1 seals every write
        merge(&mut segments, &mut keydir).unwrap();

        assert!(segments.sealed_fids().is_empty());
        let entry = keydir.get(b"k").unwrap();
        assert_eq!(read_value(&segments, entry), b"v3");
    }

    #[test]
    fn test_merge_drops_deleted_keys() {
        let dir = tempdir().unwrap();
        let mut segments = SegmentSet::create_fresh(dir.path(), 1).unwrap();
        let mut keydir = KeyDir::new();

        let set_bytes = Record::new(b"k".to_vec(), b"v".to_vec(), 1).encode();
        segments.write(&set_bytes).unwrap(); // rotates, seals fid 0

        let tombstone_bytes = Record::tombstone(b"k".to_vec(), 2).encode();
        segments.write(&tombstone_bytes).unwrap(); // rotates, seals fid 1
        keydir.delete(b"k");

        assert_eq!(segments.sealed_fids().len(), 2);
        merge(&mut segments, &mut keydir).unwrap();

        assert!(segments.sealed_fids().is_empty());
        assert!(keydir.get(b"k").is_none());
    }
}

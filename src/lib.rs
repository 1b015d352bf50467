//! An embedded, append-only key-value store, Bitcask-style.
//!
//! Keys and values are opaque byte strings. Every write appends a new
//! record to a segmented on-disk log; nothing is ever updated in place.
//! An in-memory key directory maps each live key to the exact
//! `(segment, offset)` of its most recent record, so point lookups are a
//! single positional read. Space is reclaimed offline, by [`Database::merge`].
//!
//! ```no_run
//! use bitcask::{Database, Options};
//!
//! # fn main() -> Result<(), bitcask::Error> {
//! let db = Database::open(Options::new("my-db"))?;
//! db.set(b"hello", b"world")?;
//! assert_eq!(db.get(b"hello")?, b"world");
//! db.delete(b"hello")?;
//! # Ok(())
//! # }
//! ```
//!
//! Out of scope for this crate: transactions spanning multiple keys,
//! secondary indexes, range scans, replication, hot (online) merge, key
//! directory memory budgeting, and TTL/expiry. Values larger than a single
//! segment are not supported. Command-line entry points, options parsing,
//! and any RPC/network surface are left to the embedding host.

mod db;
mod error;
mod keydir;
mod merge;
mod options;
mod record;
mod recovery;
mod segment;
mod segment_set;

pub use db::Database;
pub use error::Error;
pub use options::{Options, DEFAULT_SEGMENT_SIZE};

pub use keydir::DirEntry;
pub use record::{Record, FLAG_LIVE, FLAG_TOMBSTONE, HEADER_SIZE};

//! An embedded key-value storage engine in the Bitcask style. See:
//! https://riak.com/assets/bitcask-intro.pdf
//!
//! All writes append records to a sequence of segment files, and an
//! in-memory index maps each live key to the file offset of its latest
//! record, so both reads and writes cost one disk access. Tombstone
//! records implement deletion; write batches commit atomically under a
//! transaction id; and a merge pass compacts the log by rewriting only the
//! live records into a fresh generation of segments, together with a hint
//! file that speeds up the next startup.

#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_long_first_doc_paragraph)]

mod batch;
mod db;
mod error;
mod fio;
mod fsutil;
mod index;
mod iterator;
mod merge;
mod options;
mod record;
mod segment;
#[cfg(test)]
mod testutil;

pub use batch::WriteBatch;
pub use db::{Bitsack, Stat};
pub use error::{Error, Result};
pub use iterator::Iter;
pub use options::{IndexType, IteratorOptions, Options, WriteBatchOptions};

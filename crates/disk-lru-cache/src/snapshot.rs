//! Read handles for committed entries

use crate::error::{Result, StoreError};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// An immutable view of an entry's values at the time it was read.
///
/// The value files are opened when the snapshot is taken, so a commit that
/// replaces the entry afterwards does not change what this snapshot reads.
/// The handles are closed when the snapshot is dropped.
#[derive(Debug)]
pub struct Snapshot {
    key: String,
    sequence_number: u64,
    files: Vec<File>,
    lengths: Vec<u64>,
}

impl Snapshot {
    pub(crate) fn new(key: String, sequence_number: u64, files: Vec<File>, lengths: Vec<u64>) -> Self {
        Self {
            key,
            sequence_number,
            files,
            lengths,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Commit sequence number of the entry when this snapshot was taken
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Byte length of the value at `index`
    pub fn length(&self, index: usize) -> Option<u64> {
        self.lengths.get(index).copied()
    }

    /// Borrow the open file backing the value at `index`
    pub fn reader(&mut self, index: usize) -> Option<&mut File> {
        self.files.get_mut(index)
    }

    /// Read the full value at `index`
    pub fn read_value(&mut self, index: usize) -> Result<Vec<u8>> {
        let value_count = self.files.len();
        let capacity = self.length(index).unwrap_or(0) as usize;
        let file = self
            .files
            .get_mut(index)
            .ok_or(StoreError::InvalidIndex { index, value_count })?;

        file.seek(SeekFrom::Start(0))?;
        let mut value = Vec::with_capacity(capacity);
        file.read_to_end(&mut value)?;
        Ok(value)
    }
}

//! Single-writer edit transactions

use crate::cache::DiskLruCache;
use crate::error::{Result, StoreError};
use std::fs::File;
use std::io::Write;
use tracing::debug;

/// Exclusive write access to one entry.
///
/// Values are written to temporary files and only replace the committed
/// ones on [`Editor::commit`]. Dropping an editor without committing aborts
/// the edit.
pub struct Editor<'a> {
    cache: &'a DiskLruCache,
    key: String,
    edit_id: u64,
    written: Vec<bool>,
    has_errors: bool,
    done: bool,
}

impl<'a> Editor<'a> {
    pub(crate) fn new(cache: &'a DiskLruCache, key: String, edit_id: u64, value_count: usize) -> Self {
        Self {
            cache,
            key,
            edit_id,
            written: vec![false; value_count],
            has_errors: false,
            done: false,
        }
    }

    /// Replace the value at `index` with `value`
    pub fn set(&mut self, index: usize, value: &[u8]) -> Result<()> {
        let mut file = self.writer(index)?;
        if let Err(err) = file.write_all(value).and_then(|()| file.flush()) {
            self.has_errors = true;
            return Err(err.into());
        }
        Ok(())
    }

    /// Open the temporary file for the value at `index`, truncating any
    /// bytes written earlier in this edit.
    pub fn writer(&mut self, index: usize) -> Result<File> {
        if index >= self.written.len() {
            return Err(StoreError::InvalidIndex {
                index,
                value_count: self.written.len(),
            });
        }

        let path = self.cache.dirty_path(&self.key, index);
        match File::create(&path) {
            Ok(file) => {
                self.written[index] = true;
                Ok(file)
            }
            Err(err) => {
                self.has_errors = true;
                Err(err.into())
            }
        }
    }

    /// Publish the written values. If a write failed during this edit the
    /// edit is aborted instead and the previous value stays in place.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        if self.has_errors {
            self.cache
                .complete_edit(&self.key, self.edit_id, &self.written, false)?;
            return Err(StoreError::EditFailed(self.key.clone()));
        }
        self.cache
            .complete_edit(&self.key, self.edit_id, &self.written, true)
    }

    /// Discard the written values
    pub fn abort(mut self) -> Result<()> {
        self.done = true;
        self.cache
            .complete_edit(&self.key, self.edit_id, &self.written, false)
    }
}

impl Drop for Editor<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(err) = self
            .cache
            .complete_edit(&self.key, self.edit_id, &self.written, false)
        {
            debug!(key = %self.key, error = %err, "Failed to abort abandoned edit");
        }
    }
}

//! Journaled LRU disk cache

use crate::editor::Editor;
use crate::error::{Result, StoreError};
use crate::journal::{
    self, JournalHeader, JournalRecord, JOURNAL_FILE, JOURNAL_FILE_BACKUP, JOURNAL_FILE_TEMP,
};
use crate::snapshot::Snapshot;
use crate::types::{CacheStats, StoreConfig};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Compact the journal once it holds this many records that no longer
/// describe a live entry
const REDUNDANT_OP_COMPACT_THRESHOLD: usize = 2000;

const MAX_KEY_LEN: usize = 120;

/// Edit id recorded for DIRTY lines replayed from the journal. Such edits
/// belong to a previous process and are cleaned up on open.
const REPLAYED_EDIT: u64 = 0;

/// Check a key against the store's key grammar `[a-z0-9_-]{1,120}`
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug)]
struct Entry {
    lengths: Vec<u64>,
    /// True once the entry has been committed at least once
    readable: bool,
    current_edit: Option<u64>,
    sequence_number: u64,
    /// Position in the recency order; larger is more recent
    recency: u64,
}

impl Entry {
    fn total_len(&self) -> u64 {
        self.lengths.iter().sum()
    }
}

struct State {
    max_size: u64,
    size: u64,
    entries: HashMap<String, Entry>,
    recency: BTreeMap<u64, String>,
    next_recency: u64,
    next_sequence_number: u64,
    next_edit_id: u64,
    redundant_op_count: usize,
    /// `None` once the cache is closed
    journal: Option<BufWriter<File>>,
}

impl State {
    fn new(max_size: u64) -> Self {
        Self {
            max_size,
            size: 0,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_recency: 0,
            next_sequence_number: 0,
            next_edit_id: REPLAYED_EDIT + 1,
            redundant_op_count: 0,
            journal: None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.journal.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn append(&mut self, record: &JournalRecord) -> Result<()> {
        let journal = self.journal.as_mut().ok_or(StoreError::Closed)?;
        writeln!(journal, "{}", record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.flush()?;
        }
        Ok(())
    }

    fn entry_or_insert(&mut self, key: &str, value_count: usize) -> &mut Entry {
        let order = &mut self.recency;
        let next_recency = &mut self.next_recency;
        self.entries.entry(key.to_string()).or_insert_with(|| {
            let recency = *next_recency;
            *next_recency += 1;
            order.insert(recency, key.to_string());
            Entry {
                lengths: vec![0; value_count],
                readable: false,
                current_edit: None,
                sequence_number: 0,
                recency,
            }
        })
    }

    fn touch(&mut self, key: &str) {
        let recency = self.next_recency;
        if let Some(entry) = self.entries.get_mut(key) {
            self.next_recency += 1;
            self.recency.remove(&entry.recency);
            entry.recency = recency;
            self.recency.insert(recency, key.to_string());
        }
    }

    fn drop_entry(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.recency);
        Some(entry)
    }

    fn replay(&mut self, record: JournalRecord, value_count: usize) {
        match record {
            JournalRecord::Remove { key } => {
                self.drop_entry(&key);
            }
            JournalRecord::Clean { key, lengths } => {
                let entry = self.entry_or_insert(&key, value_count);
                entry.readable = true;
                entry.current_edit = None;
                entry.lengths = lengths;
                self.touch(&key);
            }
            JournalRecord::Dirty { key } => {
                self.entry_or_insert(&key, value_count).current_edit = Some(REPLAYED_EDIT);
                self.touch(&key);
            }
            JournalRecord::Read { key } => self.touch(&key),
        }
    }

    fn journal_rebuild_required(&self) -> bool {
        self.redundant_op_count >= REDUNDANT_OP_COMPACT_THRESHOLD
            && self.redundant_op_count >= self.entries.len()
    }

    /// Least recently used entry that is not being edited
    fn eviction_candidate(&self) -> Option<String> {
        self.recency
            .values()
            .find(|key| {
                self.entries
                    .get(key.as_str())
                    .is_some_and(|entry| entry.current_edit.is_none())
            })
            .cloned()
    }
}

/// A journaled, size-bounded key/value store on disk.
///
/// Each entry holds `value_count` byte values stored as `<key>.<index>`
/// files. All bookkeeping happens under one internal lock, so the cache can
/// be shared between threads behind an `Arc`.
pub struct DiskLruCache {
    directory: PathBuf,
    config: StoreConfig,
    state: Mutex<State>,
    opened_at: DateTime<Utc>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiskLruCache {
    /// Open the cache in `directory`, creating it if needed.
    ///
    /// An unreadable or mismatched journal is not fatal: the directory is
    /// wiped and the cache starts empty.
    pub fn open(directory: impl Into<PathBuf>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let directory = directory.into();

        let journal_path = directory.join(JOURNAL_FILE);
        let backup_path = directory.join(JOURNAL_FILE_BACKUP);
        if backup_path.exists() {
            // A crash during compaction can leave only the backup behind
            if journal_path.exists() {
                fs::remove_file(&backup_path)?;
            } else {
                fs::rename(&backup_path, &journal_path)?;
            }
        }

        if journal_path.exists() {
            match Self::load(&directory, &config) {
                Ok(state) => {
                    let cache = Self::with_state(directory, config, state);
                    {
                        let mut state = cache.lock();
                        cache.trim_to_size(&mut state)?;
                        state.flush()?;
                    }
                    info!(
                        directory = ?cache.directory,
                        entries = cache.len(),
                        size = cache.size(),
                        "Disk cache opened"
                    );
                    return Ok(cache);
                }
                Err(err) => {
                    warn!(
                        directory = ?directory,
                        error = %err,
                        "Disk cache journal is unreadable, resetting cache"
                    );
                    match fs::remove_dir_all(&directory) {
                        Ok(()) => {}
                        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        fs::create_dir_all(&directory)?;
        let mut state = State::new(config.max_size);
        Self::write_journal(&directory, &Self::header(&config), &mut state)?;
        info!(directory = ?directory, max_size = config.max_size, "Disk cache created");
        Ok(Self::with_state(directory, config, state))
    }

    fn with_state(directory: PathBuf, config: StoreConfig, state: State) -> Self {
        Self {
            directory,
            config,
            state: Mutex::new(state),
            opened_at: Utc::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn header(config: &StoreConfig) -> JournalHeader {
        JournalHeader {
            app_version: config.app_version,
            value_count: config.value_count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild in-memory state from an existing journal
    fn load(directory: &Path, config: &StoreConfig) -> Result<State> {
        let header = Self::header(config);
        let journal_path = directory.join(JOURNAL_FILE);
        let journal = journal::read_journal(File::open(&journal_path)?, &header)?;

        let mut state = State::new(config.max_size);
        let record_count = journal.records.len();
        for record in journal.records {
            state.replay(record, config.value_count);
        }

        // Edits that never completed leave files we can't trust
        let abandoned: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.current_edit.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        for key in abandoned {
            state.drop_entry(&key);
            for index in 0..config.value_count {
                remove_if_exists(&value_path(directory, &key, index))?;
                remove_if_exists(&dirty_path(directory, &key, index))?;
            }
            debug!(key = %key, "Discarded incomplete edit from previous session");
        }

        state.size = state.entries.values().map(Entry::total_len).sum();
        state.redundant_op_count = record_count.saturating_sub(state.entries.len());

        if journal.truncated {
            warn!(directory = ?directory, "Journal ends with a partial record, rewriting it");
            Self::write_journal(directory, &header, &mut state)?;
        } else {
            let file = OpenOptions::new().append(true).open(&journal_path)?;
            state.journal = Some(BufWriter::new(file));
        }

        Ok(state)
    }

    /// Write a compact journal describing the current entries and swap it in
    fn write_journal(directory: &Path, header: &JournalHeader, state: &mut State) -> Result<()> {
        if let Some(mut old) = state.journal.take() {
            if let Err(err) = old.flush() {
                debug!(error = %err, "Failed to flush journal before compaction");
            }
        }

        let temp_path = directory.join(JOURNAL_FILE_TEMP);
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            header.write_to(&mut writer)?;
            for key in state.recency.values() {
                let Some(entry) = state.entries.get(key) else {
                    continue;
                };
                let record = if entry.current_edit.is_some() {
                    JournalRecord::Dirty { key: key.clone() }
                } else {
                    JournalRecord::Clean {
                        key: key.clone(),
                        lengths: entry.lengths.clone(),
                    }
                };
                writeln!(writer, "{}", record)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        let journal_path = directory.join(JOURNAL_FILE);
        let backup_path = directory.join(JOURNAL_FILE_BACKUP);
        if journal_path.exists() {
            fs::rename(&journal_path, &backup_path)?;
        }
        fs::rename(&temp_path, &journal_path)?;
        remove_if_exists(&backup_path)?;

        let file = OpenOptions::new().append(true).open(&journal_path)?;
        state.journal = Some(BufWriter::new(file));
        state.redundant_op_count = 0;
        Ok(())
    }

    fn compact_if_needed(&self, state: &mut State) -> Result<()> {
        if state.journal_rebuild_required() {
            debug!(
                directory = ?self.directory,
                redundant = state.redundant_op_count,
                "Compacting journal"
            );
            Self::write_journal(&self.directory, &Self::header(&self.config), state)?;
        }
        Ok(())
    }

    /// Snapshot of the entry named `key`, or `None` if it doesn't exist or
    /// isn't readable yet
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        validate_key(key)?;
        let mut state = self.lock();
        state.ensure_open()?;

        let (sequence_number, lengths) = match state.entries.get(key) {
            Some(entry) if entry.readable => (entry.sequence_number, entry.lengths.clone()),
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        let mut files = Vec::with_capacity(self.config.value_count);
        for index in 0..self.config.value_count {
            match File::open(self.value_path(key, index)) {
                Ok(file) => files.push(file),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    warn!(key = %key, index, "Cached value file is missing, dropping entry");
                    self.remove_entry(&mut state, key)?;
                    state.flush()?;
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }
        }

        state.redundant_op_count += 1;
        state.append(&JournalRecord::Read {
            key: key.to_string(),
        })?;
        state.touch(key);
        self.compact_if_needed(&mut state)?;

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(Snapshot::new(
            key.to_string(),
            sequence_number,
            files,
            lengths,
        )))
    }

    /// Begin an edit of the entry named `key`, creating it on commit if it
    /// doesn't exist. Fails with [`StoreError::EditInProgress`] while
    /// another editor for the same key is outstanding.
    pub fn edit(&self, key: &str) -> Result<Editor<'_>> {
        validate_key(key)?;
        let mut state = self.lock();
        state.ensure_open()?;

        let edit_id = state.next_edit_id;
        let entry = state.entry_or_insert(key, self.config.value_count);
        if entry.current_edit.is_some() {
            return Err(StoreError::EditInProgress(key.to_string()));
        }
        entry.current_edit = Some(edit_id);
        state.next_edit_id += 1;

        let journaled = state
            .append(&JournalRecord::Dirty {
                key: key.to_string(),
            })
            .and_then(|()| state.flush());
        if let Err(err) = journaled {
            Self::release_edit(&mut state, key);
            return Err(err);
        }

        Ok(Editor::new(
            self,
            key.to_string(),
            edit_id,
            self.config.value_count,
        ))
    }

    /// Undo `edit` bookkeeping for an edit that never got going
    fn release_edit(state: &mut State, key: &str) {
        let readable = match state.entries.get_mut(key) {
            Some(entry) => {
                entry.current_edit = None;
                entry.readable
            }
            None => return,
        };
        if !readable {
            state.drop_entry(key);
        }
    }

    pub(crate) fn complete_edit(
        &self,
        key: &str,
        edit_id: u64,
        written: &[bool],
        success: bool,
    ) -> Result<()> {
        let mut state = self.lock();

        let Some(mut entry) = state.entries.remove(key) else {
            return Ok(());
        };
        if entry.current_edit != Some(edit_id) {
            // The edit was detached, e.g. by the cache being deleted
            state.entries.insert(key.to_string(), entry);
            return Ok(());
        }

        let mut success = success && state.journal.is_some();
        let mut failure = None;

        if success && !entry.readable {
            let missing = (0..self.config.value_count).find(|&index| {
                !written.get(index).copied().unwrap_or(false)
                    || !self.dirty_path(key, index).exists()
            });
            if let Some(index) = missing {
                success = false;
                failure = Some(StoreError::MissingValue {
                    key: key.to_string(),
                    index,
                });
            }
        }

        for index in 0..self.config.value_count {
            let dirty = self.dirty_path(key, index);
            if !success {
                self.discard(&dirty);
                continue;
            }
            if !dirty.exists() {
                continue;
            }

            let clean = self.value_path(key, index);
            match fs::rename(&dirty, &clean).and_then(|()| fs::metadata(&clean)) {
                Ok(metadata) => {
                    let new_len = metadata.len();
                    state.size = state.size.saturating_sub(entry.lengths[index]) + new_len;
                    entry.lengths[index] = new_len;
                }
                Err(err) => {
                    // Partially published entries must never be readable
                    warn!(key = %key, error = %err, "Failed to publish edited value, dropping entry");
                    state.size = state.size.saturating_sub(entry.total_len());
                    state.recency.remove(&entry.recency);
                    for index in 0..self.config.value_count {
                        self.discard(&self.dirty_path(key, index));
                        self.discard(&self.value_path(key, index));
                    }
                    state.redundant_op_count += 1;
                    state.append(&JournalRecord::Remove {
                        key: key.to_string(),
                    })?;
                    state.flush()?;
                    return Err(err.into());
                }
            }
        }

        state.redundant_op_count += 1;
        entry.current_edit = None;

        if entry.readable || success {
            entry.readable = true;
            if success {
                entry.sequence_number = state.next_sequence_number;
                state.next_sequence_number += 1;
            }
            let record = JournalRecord::Clean {
                key: key.to_string(),
                lengths: entry.lengths.clone(),
            };
            state.entries.insert(key.to_string(), entry);
            if success {
                state.touch(key);
            }
            state.append(&record)?;
        } else {
            state.recency.remove(&entry.recency);
            state.append(&JournalRecord::Remove {
                key: key.to_string(),
            })?;
        }
        state.flush()?;

        if success {
            self.trim_to_size(&mut state)?;
            state.flush()?;
        }
        self.compact_if_needed(&mut state)?;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Best-effort removal of a file no entry refers to any more
    fn discard(&self, path: &Path) {
        if let Err(err) = remove_if_exists(path) {
            warn!(path = ?path, error = %err, "Failed to delete cache file");
        }
    }

    /// Drop the entry named `key`. Entries currently being edited are left
    /// alone and reported as not removed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut state = self.lock();
        state.ensure_open()?;

        let removed = self.remove_entry(&mut state, key)?;
        state.flush()?;
        self.compact_if_needed(&mut state)?;
        Ok(removed)
    }

    fn remove_entry(&self, state: &mut State, key: &str) -> Result<bool> {
        match state.entries.get(key) {
            Some(entry) if entry.current_edit.is_none() => {}
            _ => return Ok(false),
        }

        for index in 0..self.config.value_count {
            remove_if_exists(&self.value_path(key, index))?;
        }

        if let Some(entry) = state.drop_entry(key) {
            state.size = state.size.saturating_sub(entry.total_len());
        }
        state.redundant_op_count += 1;
        state.append(&JournalRecord::Remove {
            key: key.to_string(),
        })?;
        Ok(true)
    }

    /// Evict least recently used entries until the byte budget and entry
    /// ceiling both hold
    fn trim_to_size(&self, state: &mut State) -> Result<()> {
        loop {
            let over_size = state.size > state.max_size;
            let over_count = self
                .config
                .max_entries
                .is_some_and(|max| state.entries.len() > max);
            if !over_size && !over_count {
                return Ok(());
            }

            let Some(key) = state.eviction_candidate() else {
                return Ok(());
            };
            debug!(key = %key, size = state.size, max_size = state.max_size, "Evicting least recently used entry");
            self.remove_entry(state, &key)?;
        }
    }

    /// Force buffered journal records to disk
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.flush()
    }

    /// Close the journal. Further operations fail with
    /// [`StoreError::Closed`]; outstanding editors are aborted when dropped.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if let Some(mut journal) = state.journal.take() {
            journal.flush()?;
            debug!(directory = ?self.directory, "Disk cache closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().journal.is_none()
    }

    /// Close the cache and delete everything in its directory
    pub fn delete(&self) -> Result<()> {
        if let Err(err) = self.close() {
            debug!(error = %err, "Failed to flush journal before delete");
        }

        {
            let mut state = self.lock();
            state.entries.clear();
            state.recency.clear();
            state.size = 0;
        }

        match fs::remove_dir_all(&self.directory) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        info!(directory = ?self.directory, "Disk cache deleted");
        Ok(())
    }

    /// Bytes currently used by committed values
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    pub fn max_size(&self) -> u64 {
        self.lock().max_size
    }

    /// Change the byte budget, evicting immediately if the cache is over it
    pub fn set_max_size(&self, max_size: u64) -> Result<()> {
        if max_size == 0 {
            return Err(StoreError::InvalidConfig("max_size must be > 0".to_string()));
        }
        let mut state = self.lock();
        state.ensure_open()?;
        state.max_size = max_size;
        self.trim_to_size(&mut state)?;
        state.flush()
    }

    /// Number of entries, including ones being created by an open edit
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Location of the committed value file for `key` at `index`
    pub fn value_path(&self, key: &str, index: usize) -> PathBuf {
        value_path(&self.directory, key, index)
    }

    pub(crate) fn dirty_path(&self, key: &str, index: usize) -> PathBuf {
        dirty_path(&self.directory, key, index)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            total_size: state.size,
            max_size: state.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            opened_at: Some(self.opened_at),
        }
    }
}

fn value_path(directory: &Path, key: &str, index: usize) -> PathBuf {
    directory.join(format!("{}.{}", key, index))
}

fn dirty_path(directory: &Path, key: &str, index: usize) -> PathBuf {
    directory.join(format!("{}.{}.tmp", key, index))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

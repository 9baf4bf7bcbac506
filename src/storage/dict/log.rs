//! Append-only dictionary file.
//!
//! Every mutation is one appended [`Record`]. A handle replays records into an
//! in-memory index and remembers how far it has read; each operation first
//! catches up with whatever other handles appended, so any number of handles
//! on one file stay coherent without file locks (last writer wins).
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte][GENERATION: 16 bytes]
//! [RECORD 1]
//! [RECORD 2]
//! ...
//! ```
//!
//! Opening a file cuts off any trailing bytes replay can't apply, such as a
//! record torn by a crash, so new appends start on a record boundary.
//!
//! Compaction writes live entries into a fresh generation and renames it over
//! the old file. Handles notice the new generation and reload from scratch.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::record::{self, Op, Record, HEADER_LEN};
use crate::error::{lock_err, StoreResult};

/// Result of a compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Entries carried into the new generation.
    pub live_keys: usize,
    /// File size before compaction.
    pub bytes_before: u64,
    /// File size after compaction.
    pub bytes_after: u64,
}

struct DictState {
    generation: Uuid,
    applied: u64,
    index: BTreeMap<String, Vec<u8>>,
}

/// A dictionary file shared by every store handle on one bucket.
///
/// Thread-safe via internal mutex.
pub struct DictFile {
    path: PathBuf,
    sync_on_write: bool,
    state: Mutex<DictState>,
}

impl DictFile {
    /// Open or create a dictionary file.
    pub fn open(path: &Path, sync_on_write: bool) -> StoreResult<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                record::write_header(&mut file, Uuid::new_v4())?;
                if sync_on_write {
                    file.sync_all()?;
                }
                tracing::info!(path = %path.display(), "created dictionary");
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let dict = Self {
            path: path.to_path_buf(),
            sync_on_write,
            state: Mutex::new(DictState {
                generation: Uuid::nil(),
                applied: HEADER_LEN,
                index: BTreeMap::new(),
            }),
        };
        dict.repair_tail()?;
        Ok(dict)
    }

    /// Path of the dictionary file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Packed value at `key`.
    pub fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let state = self.synced()?;
        Ok(state.index.get(key).cloned())
    }

    /// Whether `key` is live.
    pub fn contains(&self, key: &str) -> StoreResult<bool> {
        let state = self.synced()?;
        Ok(state.index.contains_key(key))
    }

    /// Append a put and apply it.
    pub fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut state = self.synced()?;
        self.append(&Record::put(key, value))?;
        self.catch_up(&mut state)
    }

    /// Remove a key. Returns `false` if it was absent.
    pub fn remove(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.synced()?;
        if !state.index.contains_key(key) {
            return Ok(false);
        }
        self.append(&Record::delete(key))?;
        self.catch_up(&mut state)?;
        Ok(true)
    }

    /// Snapshot of every key, sorted.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let state = self.synced()?;
        Ok(state.index.keys().cloned().collect())
    }

    /// Number of live keys.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.synced()?.index.len())
    }

    /// Rewrite the file with only live entries.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        let mut state = self.synced()?;
        let bytes_before = fs::metadata(&self.path)?.len();

        let generation = Uuid::new_v4();
        let tmp = self
            .path
            .with_extension(format!("compact-{}", generation.simple()));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            record::write_header(&mut writer, generation)?;
            for (key, value) in &state.index {
                writer.write_all(&Record::put(key, value.clone()).encode()?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        let bytes_after = fs::metadata(&self.path)?.len();
        state.generation = generation;
        state.applied = bytes_after;

        let stats = CompactionStats {
            live_keys: state.index.len(),
            bytes_before,
            bytes_after,
        };
        tracing::info!(
            path = %self.path.display(),
            live_keys = stats.live_keys,
            bytes_before,
            bytes_after,
            "compacted dictionary"
        );
        Ok(stats)
    }

    /// Cut off trailing bytes replay could not apply, so the next append
    /// starts on a record boundary.
    fn repair_tail(&self) -> StoreResult<()> {
        let state = self.synced()?;
        let file = OpenOptions::new().write(true).open(&self.path)?;
        let file_size = file.metadata()?.len();
        if file_size > state.applied {
            tracing::warn!(
                path = %self.path.display(),
                applied = state.applied,
                file_size,
                "truncating unreadable dictionary tail"
            );
            file.set_len(state.applied)?;
            if self.sync_on_write {
                file.sync_all()?;
            }
        }
        Ok(())
    }

    fn synced(&self) -> StoreResult<MutexGuard<'_, DictState>> {
        let mut state = self.state.lock().map_err(|_| lock_err("dictionary state"))?;
        self.catch_up(&mut state)?;
        Ok(state)
    }

    fn append(&self, record: &Record) -> StoreResult<()> {
        let encoded = record.encode()?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&encoded)?;
        if self.sync_on_write {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Apply records appended since the last read.
    fn catch_up(&self, state: &mut DictState) -> StoreResult<()> {
        let file = File::open(&self.path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let generation = record::read_header(&mut reader)?;
        if generation != state.generation || file_size < state.applied {
            if !state.generation.is_nil() {
                tracing::debug!(path = %self.path.display(), "dictionary generation changed, reloading");
            }
            state.generation = generation;
            state.applied = HEADER_LEN;
            state.index.clear();
        }
        if file_size == state.applied {
            return Ok(());
        }

        reader.seek(SeekFrom::Start(state.applied))?;
        while state.applied < file_size {
            match Record::decode(&mut reader) {
                Ok(rec) => {
                    state.applied += rec.encoded_len();
                    match rec.op {
                        Op::Put => {
                            state.index.insert(rec.key, rec.value);
                        }
                        Op::Delete => {
                            state.index.remove(&rec.key);
                        }
                    }
                }
                // a writer may still be mid-append
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        offset = state.applied,
                        error = %e,
                        "dictionary corruption detected, ignoring the rest of the file"
                    );
                    break;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for DictFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictFile")
            .field("path", &self.path)
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}


use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::debug;

use super::Index;
use crate::{IndexError, Result};

/// File holding the serialized index inside an index directory
pub const INDEX_FILE_NAME: &str = "index.json";

/// Lock file coordinating processes that share an index directory
pub const LOCK_FILE_NAME: &str = ".lock";

#[inline]
pub fn index_file(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE_NAME)
}

/// Whether `dir` holds a persisted index
#[inline]
pub fn exists(dir: &Path) -> bool {
    index_file(dir).is_file()
}

/// Identifies one version of a persisted index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStamp {
    pub modified: SystemTime,
    pub len: u64,
}

/// Stamp of the persisted index, if there is one
#[inline]
pub fn stamp(dir: &Path) -> Option<IndexStamp> {
    let metadata = fs::metadata(index_file(dir)).ok()?;
    Some(IndexStamp {
        modified: metadata.modified().ok()?,
        len: metadata.len(),
    })
}

/// Read the index stored in `dir`
#[inline]
pub fn load(dir: &Path) -> Result<Index> {
    let path = index_file(dir);
    let file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::IndexNotFound {
                path: dir.to_path_buf(),
            });
        }
        Err(e) => return Err(IndexError::storage(&path, format!("Failed to open: {}", e))),
    };

    let index: Index = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| IndexError::storage(&path, format!("Failed to parse: {}", e)))?;
    index
        .validate()
        .map_err(|message| IndexError::storage(&path, message))?;

    debug!("Loaded index with {} entries from {}", index.len(), path.display());
    Ok(index)
}

/// Atomically replace the index stored in `dir`.
///
/// The index is written to a temporary file in the same directory and renamed
/// over the old file, so readers only ever see the previous or the new index.
#[inline]
pub fn save(index: &Index, dir: &Path) -> Result<()> {
    save_gated(index, dir, &CommitGate::default())
}

/// Like [`save`], but the final rename only happens while `gate` is open
pub(crate) fn save_gated(index: &Index, dir: &Path, gate: &CommitGate) -> Result<()> {
    let path = index_file(dir);
    fs::create_dir_all(dir)
        .map_err(|e| IndexError::storage(dir, format!("Failed to create directory: {}", e)))?;

    let temp = NamedTempFile::new_in(dir)
        .map_err(|e| IndexError::storage(dir, format!("Failed to create temp file: {}", e)))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer(&mut writer, index)?;
        writer
            .flush()
            .map_err(|e| IndexError::storage(temp.path(), format!("Failed to write: {}", e)))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| IndexError::storage(temp.path(), format!("Failed to sync: {}", e)))?;

    // Dropping an unpersisted NamedTempFile deletes it
    gate.commit(&path, || {
        temp.persist(&path)
            .map(drop)
            .map_err(|e| IndexError::storage(&path, format!("Failed to replace index: {}", e.error)))
    })?;

    debug!("Saved index with {} entries to {}", index.len(), path.display());
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum GateState {
    #[default]
    Open,
    Committed,
    Abandoned,
}

/// Decides, exactly once, whether a save lands.
///
/// A save running on a blocking thread cannot be cancelled. When its caller
/// gives up, it abandons the gate; the save then discards its temp file
/// instead of renaming it. If the rename already happened, `abandon` says so.
#[derive(Debug, Default)]
pub(crate) struct CommitGate {
    state: Mutex<GateState>,
}

impl CommitGate {
    fn commit<F>(&self, path: &Path, persist: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == GateState::Abandoned {
            return Err(IndexError::storage(path, "Save abandoned before commit"));
        }
        persist()?;
        *state = GateState::Committed;
        Ok(())
    }

    /// Close the gate. Returns `false` if the save already committed.
    pub(crate) fn abandon(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == GateState::Committed {
            return false;
        }
        *state = GateState::Abandoned;
        true
    }
}

/// An OS-level lock on an index directory's lock file, released on drop.
///
/// Writers hold the exclusive side from load through persist and readers hold
/// the shared side, so separate processes never interleave their updates.
#[derive(Debug)]
pub(crate) struct DirLock {
    file: File,
}

impl DirLock {
    /// Block until this process holds the directory exclusively, creating the
    /// directory if needed
    pub(crate) fn exclusive(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| IndexError::storage(dir, format!("Failed to create directory: {}", e)))?;
        let file = open_lock_file(dir)?;
        FileExt::lock_exclusive(&file).map_err(|e| {
            IndexError::storage(dir.join(LOCK_FILE_NAME), format!("Failed to lock: {}", e))
        })?;
        debug!("Locked {} for writing", dir.display());
        Ok(Self { file })
    }

    /// Block until no other process writes to `dir`. A directory without an
    /// index is reported as [`IndexError::IndexNotFound`].
    pub(crate) fn shared(dir: &Path) -> Result<Self> {
        if !exists(dir) {
            return Err(IndexError::IndexNotFound {
                path: dir.to_path_buf(),
            });
        }
        // Read-only handles lock too, so an index in a read-only directory stays queryable
        let file = match File::open(dir.join(LOCK_FILE_NAME)) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => open_lock_file(dir)?,
            Err(e) => {
                return Err(IndexError::storage(
                    dir.join(LOCK_FILE_NAME),
                    format!("Failed to open lock file: {}", e),
                ));
            }
        };
        FileExt::lock_shared(&file).map_err(|e| {
            IndexError::storage(dir.join(LOCK_FILE_NAME), format!("Failed to lock: {}", e))
        })?;
        Ok(Self { file })
    }
}

impl Drop for DirLock {
    #[inline]
    fn drop(&mut self) {
        // Closing the handle releases the lock as well
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock index directory: {}", e);
        }
    }
}

fn open_lock_file(dir: &Path) -> Result<File> {
    let path = dir.join(LOCK_FILE_NAME);
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| IndexError::storage(&path, format!("Failed to open lock file: {}", e)))
}

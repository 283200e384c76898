//! Single-file snapshot store with atomic replacement.
//!
//! Saves go to `<path>.tmp` in the same directory, are flushed with
//! `sync_all`, then renamed over `<path>`. Readers see either the previous
//! complete file or the new complete file, never a partial write.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use dircache_core::constants::SNAPSHOT_TEMP_EXTENSION;
use dircache_core::error::{DirCacheError, Result};
use dircache_core::types::Snapshot;

use crate::codec;

/// Result of reading the snapshot file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A snapshot was read and decoded.
    Loaded(Snapshot),
    /// No snapshot file exists yet (first run).
    NotFound,
}

/// What a successful save wrote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveReport {
    /// Entries in the snapshot
    pub entries: usize,
    /// Bytes written
    pub bytes: usize,
}

/// File-backed snapshot store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    temp_path: PathBuf,
    /// Serializes saves so two writers never share the temp file
    save_lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store for the snapshot at `path`. Nothing is touched on disk.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut temp = OsString::from(path.as_os_str());
        temp.push(".");
        temp.push(SNAPSHOT_TEMP_EXTENSION);

        Self {
            path,
            temp_path: PathBuf::from(temp),
            save_lock: Mutex::new(()),
        }
    }

    /// Returns the snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the temporary file path used during saves.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Returns true if a snapshot file exists.
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Reads the raw snapshot bytes. `Ok(None)` when the file is missing.
    #[instrument(skip(self), fields(path = ?self.path))]
    pub async fn load_bytes(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(DirCacheError::Load {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Loads and decodes the snapshot.
    ///
    /// A missing file is [`LoadOutcome::NotFound`], not an error.
    #[instrument(skip(self), fields(path = ?self.path))]
    pub async fn load(&self) -> Result<LoadOutcome> {
        let Some(bytes) = self.load_bytes().await? else {
            debug!("No snapshot file yet");
            return Ok(LoadOutcome::NotFound);
        };

        let snapshot = codec::decode(&bytes)?;
        info!(entries = snapshot.len(), bytes = bytes.len(), "Loaded cache snapshot");
        Ok(LoadOutcome::Loaded(snapshot))
    }

    /// Encodes and atomically writes a snapshot.
    #[instrument(skip(self, snapshot), fields(path = ?self.path, entries = snapshot.len()))]
    pub async fn save(&self, snapshot: &Snapshot) -> Result<SaveReport> {
        let _guard = self.save_lock.lock().await;
        self.encode_and_write(snapshot).await
    }

    /// Takes the save lock, then builds the snapshot with `take` and writes it.
    ///
    /// Concurrent callers write in the order they took their snapshots, so
    /// an older snapshot never replaces a newer one on disk.
    #[instrument(skip_all, fields(path = ?self.path))]
    pub async fn save_with<F>(&self, take: F) -> Result<SaveReport>
    where
        F: FnOnce() -> Snapshot,
    {
        let _guard = self.save_lock.lock().await;
        let snapshot = take();
        self.encode_and_write(&snapshot).await
    }

    /// Atomically replaces the snapshot file with `bytes`.
    pub async fn save_bytes(&self, bytes: &[u8]) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        self.write_locked(bytes).await
    }

    async fn encode_and_write(&self, snapshot: &Snapshot) -> Result<SaveReport> {
        let bytes = codec::encode(snapshot)?;
        self.write_locked(&bytes).await?;
        Ok(SaveReport {
            entries: snapshot.len(),
            bytes: bytes.len(),
        })
    }

    /// Caller must hold `save_lock`.
    async fn write_locked(&self, bytes: &[u8]) -> Result<()> {
        if let Err(source) = self.write_atomically(bytes).await {
            if let Err(e) = fs::remove_file(&self.temp_path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?self.temp_path, error = %e, "Failed to remove temporary snapshot");
                }
            }
            return Err(DirCacheError::Save {
                path: self.path.clone(),
                source,
            });
        }

        debug!(bytes = bytes.len(), "Snapshot written");
        Ok(())
    }

    async fn write_atomically(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(&self.temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&self.temp_path, &self.path).await?;
        self.sync_parent_dir().await
    }

    /// Makes the rename itself durable.
    #[cfg(unix)]
    async fn sync_parent_dir(&self) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::File::open(parent).await?.sync_all().await
    }

    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) -> io::Result<()> {
        Ok(())
    }

    /// Deletes the snapshot file. Returns true if one existed.
    pub async fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

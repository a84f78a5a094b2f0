// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The public store handle: open, set, get, remove, close.

use crate::{
    compactor::Compactor,
    config::Config,
    engine::Engine,
    id::LOCK_FILE_NAME,
    keydir::Keydir,
};
use fs4::FileExt;
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

/// An open, durable key-value store backed by an append-only log.
///
/// A [`Store`] exclusively owns its data directory for as long as it is open; a second attempt
/// to open the same directory fails with [`crate::Error::DirectoryLocked`].
pub struct Store {
    path: PathBuf,
    lock_file: File,
    engine: Arc<RwLock<Engine>>,
    keydir: Arc<Keydir>,
    compactor: Compactor,
}

impl Store {
    /// Opens the store at `path`, creating it if the directory is empty.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DirectoryLocked`] if another handle already holds the directory,
    /// or any error from initializing the segment layer.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens the store at `path` with an explicit [`Config`].
    ///
    /// # Errors
    ///
    /// See [`Store::open`].
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> crate::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path.join(LOCK_FILE_NAME))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| crate::Error::DirectoryLocked)?;

        let (engine, keydir) = Engine::open(path, config.rotation_threshold_bytes)?;
        let engine = Arc::new(RwLock::new(engine));
        let keydir = Arc::new(keydir);

        let compactor = Compactor::spawn(
            Arc::clone(&engine),
            Arc::clone(&keydir),
            config.compaction_interval,
            config.compaction_policy,
        );

        log::info!("store open at {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
            engine,
            keydir,
            compactor,
        })
    }

    /// Writes `value` for `key`, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the write to the active segment fails.
    pub fn set(&self, key: &[u8], value: &[u8]) -> crate::Result<()> {
        let mut engine = self.engine.write().expect("store lock poisoned");
        engine.append(key, value, &self.keydir)
    }

    /// Looks up `key`, returning its value if present.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the owning segment cannot be read.
    pub fn get(&self, key: &[u8]) -> crate::Result<Option<Vec<u8>>> {
        // Held for lookup and read together: a concurrent compactor pass must not be able to
        // delete the segment this entry points into between the two steps.
        let engine = self.engine.read().expect("store lock poisoned");

        let Some(entry) = self.keydir.get(key) else {
            return Ok(None);
        };

        engine.read(entry).map(Some)
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RemoveMissing`] if `key` is not present, or `Err` if the tombstone
    /// write fails.
    pub fn remove(&self, key: &[u8]) -> crate::Result<()> {
        let mut engine = self.engine.write().expect("store lock poisoned");

        if self.keydir.get(key).is_none() {
            return Err(crate::Error::RemoveMissing);
        }

        engine.remove(key, &self.keydir)
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keydir.len()
    }

    /// `true` if the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keydir.is_empty()
    }

    /// The directory this store was opened against.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops the compactor, flushes the active segment, and releases the directory lock.
    ///
    /// # Errors
    ///
    /// Returns `Err` if flushing the active segment fails.
    pub fn close(mut self) -> crate::Result<()> {
        self.compactor.shutdown();

        self.engine.write().expect("store lock poisoned").close()?;
        FileExt::unlock(&self.lock_file)?;

        log::info!("store at {} closed", self.path.display());

        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.compactor.shutdown();

        if let Ok(mut engine) = self.engine.write() {
            if let Err(e) = engine.close() {
                log::error!("failed to flush active segment on drop: {e}");
            }
        }

        if let Err(e) = FileExt::unlock(&self.lock_file) {
            log::warn!("failed to release directory lock on drop: {e}");
        }
    }
}

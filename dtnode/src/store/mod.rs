// Copyright (C) 2023 Felix Huettner
//
// This file is part of DTRD.
//
// DTRD is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// DTRD is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bundle::{Bundle, BundleId};
use log::{error, warn};

/// Durable `bundle_id -> serialized bundle` map: one file per bundle
/// under `storage_dir`, filename = bundle id. Every write goes through a
/// temp-file-then-rename with an explicit `sync_all`, so a `put` that has
/// returned survives a crash.
///
/// All operations are blocking filesystem calls; callers on an async
/// executor run them via `tokio::task::spawn_blocking` (see
/// `crate::forwarding`). `Clone` is a cheap `Arc` bump so the store can be
/// shared between the listener, the forwarding engine and the sweeper
/// without a central lock — the filesystem itself provides the
/// synchronization `put`/`get`/`delete` need (see below).
#[derive(Debug, Clone)]
pub struct FileStore {
    storage_dir: Arc<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error for bundle {id}: {source}")]
    Io {
        id: BundleId,
        #[source]
        source: io::Error,
    },
    #[error("io error reading storage directory {0:?}: {1}")]
    DirIo(PathBuf, #[source] io::Error),
    #[error("corrupt bundle file {0}: {1}")]
    Corrupt(PathBuf, bundle::DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    AlreadyPresent,
}

impl FileStore {
    /// Scans `storage_dir` (creating it if absent) and returns every
    /// bundle found, so the caller (the forwarding engine) can re-enqueue
    /// each one exactly as if it had just arrived — this is how a
    /// restarted node recovers pending work.
    pub fn open(storage_dir: impl Into<PathBuf>) -> io::Result<(FileStore, Vec<Bundle>)> {
        let storage_dir = storage_dir.into();
        fs::create_dir_all(&storage_dir)?;

        let mut rehydrated = Vec::new();
        for entry in fs::read_dir(&storage_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            match Bundle::decode(&bytes) {
                Ok(bundle) => rehydrated.push(bundle),
                Err(e) => warn!("skipping unreadable bundle file {:?}: {e}", entry.path()),
            }
        }

        Ok((
            FileStore {
                storage_dir: Arc::new(storage_dir),
            },
            rehydrated,
        ))
    }

    fn path_for(&self, id: &BundleId) -> PathBuf {
        self.storage_dir.join(id.to_string())
    }

    /// Idempotent insert: a bundle already on disk under this id is left
    /// untouched and `AlreadyPresent` is returned. Uses `create_new` so
    /// the presence check and the write race nobody — the filesystem
    /// rejects a second creator atomically.
    pub fn put(&self, bundle: &Bundle) -> Result<PutOutcome, StoreError> {
        let path = self.path_for(&bundle.id);
        let tmp_path = self.storage_dir.join(format!("{}.tmp", bundle.id));

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(mut tmp) => {
                let result = write_and_fsync(&mut tmp, &bundle.encode())
                    .and_then(|()| fs::rename(&tmp_path, &path))
                    .and_then(|()| fsync_dir(&self.storage_dir));
                let _ = fs::remove_file(&tmp_path);
                result.map_err(|source| StoreError::Io {
                    id: bundle.id,
                    source,
                })?;
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // Another put for the same id is racing us; either way the
                // content is identical (ids are content-addressed), so
                // treat the destination's existence as authoritative.
            }
            Err(source) => return Err(StoreError::Io { id: bundle.id, source }),
        }

        if path.exists() {
            return Ok(PutOutcome::AlreadyPresent);
        }

        Ok(PutOutcome::Stored)
    }

    /// Overwrites the image for `bundle.id` in place. Used only by the
    /// forwarding engine to persist a forward-image (incremented
    /// `hop_count`, extended `path`) — this is the sole case in which a
    /// stored bundle's bytes change.
    pub fn replace(&self, bundle: &Bundle) -> Result<(), StoreError> {
        let path = self.path_for(&bundle.id);
        let tmp_path = self.storage_dir.join(format!("{}.tmp", bundle.id));
        let mut tmp = File::create(&tmp_path).map_err(|source| StoreError::Io {
            id: bundle.id,
            source,
        })?;
        write_and_fsync(&mut tmp, &bundle.encode())
            .and_then(|()| fs::rename(&tmp_path, &path))
            .and_then(|()| fsync_dir(&self.storage_dir))
            .map_err(|source| StoreError::Io {
                id: bundle.id,
                source,
            })
    }

    pub fn get(&self, id: &BundleId) -> Result<Option<Bundle>, StoreError> {
        let path = self.path_for(id);
        match fs::read(&path) {
            Ok(bytes) => Bundle::decode(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { id: *id, source }),
        }
    }

    pub fn contains(&self, id: &BundleId) -> bool {
        self.path_for(id).exists()
    }

    /// Best-effort: a missing key is not an error.
    pub fn delete(&self, id: &BundleId) {
        if let Err(e) = fs::remove_file(self.path_for(id)) {
            if e.kind() != io::ErrorKind::NotFound {
                error!("failed to delete bundle {id}: {e}");
            }
        }
    }

    /// A stable snapshot of the ids present at call time; bundles
    /// inserted concurrently may or may not be included.
    pub fn iter(&self) -> Result<Vec<Bundle>, StoreError> {
        let mut bundles = Vec::new();
        let entries = fs::read_dir(self.storage_dir.as_path())
            .map_err(|source| StoreError::DirIo(self.storage_dir.as_path().to_path_buf(), source))?;
        for entry in entries {
            let entry = entry
                .map_err(|source| StoreError::DirIo(self.storage_dir.as_path().to_path_buf(), source))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                continue;
            }
            match fs::read(&path) {
                Ok(bytes) => match Bundle::decode(&bytes) {
                    Ok(bundle) => bundles.push(bundle),
                    Err(_) => continue, // disappeared or still being written; skip this pass
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(_) => continue,
            }
        }
        Ok(bundles)
    }

    pub fn count(&self) -> usize {
        self.iter().map(|b| b.len()).unwrap_or(0)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Async wrappers around the blocking filesystem calls above, for use
    /// from the forwarding engine's tokio tasks — each hops onto a
    /// blocking-pool thread via `spawn_blocking` rather than stalling the
    /// task's own worker thread on disk I/O.
    pub async fn put_async(&self, bundle: Bundle) -> Result<PutOutcome, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.put(&bundle))
            .await
            .expect("store task panicked")
    }

    pub async fn replace_async(&self, bundle: Bundle) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.replace(&bundle))
            .await
            .expect("store task panicked")
    }

    pub async fn get_async(&self, id: BundleId) -> Result<Option<Bundle>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.get(&id))
            .await
            .expect("store task panicked")
    }

    pub async fn delete_async(&self, id: BundleId) {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.delete(&id))
            .await
            .expect("store task panicked");
    }
}

fn write_and_fsync(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.sync_all()
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle::Eid;

    fn sample() -> Bundle {
        Bundle::new(Eid::from("dtn://a"), Eid::from("dtn://b"), b"hi".to_vec(), 1.0, 60)
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (store, rehydrated) = FileStore::open(dir.path()).unwrap();
        assert!(rehydrated.is_empty());

        let bundle = sample();
        assert_eq!(store.put(&bundle).unwrap(), PutOutcome::Stored);
        assert_eq!(store.get(&bundle.id).unwrap(), Some(bundle));
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = FileStore::open(dir.path()).unwrap();
        let bundle = sample();
        assert_eq!(store.put(&bundle).unwrap(), PutOutcome::Stored);
        assert_eq!(store.put(&bundle).unwrap(), PutOutcome::AlreadyPresent);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn delete_of_missing_key_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = FileStore::open(dir.path()).unwrap();
        store.delete(&sample().id);
    }

    #[test]
    fn reopening_rehydrates_previously_stored_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = sample();
        {
            let (store, _) = FileStore::open(dir.path()).unwrap();
            store.put(&bundle).unwrap();
        }
        let (_, rehydrated) = FileStore::open(dir.path()).unwrap();
        assert_eq!(rehydrated, vec![bundle]);
    }

    #[test]
    fn replace_overwrites_the_stored_image() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = FileStore::open(dir.path()).unwrap();
        let bundle = sample();
        store.put(&bundle).unwrap();

        let forwarded = bundle.forwarded_via(&Eid::from("dtn://r"));
        store.replace(&forwarded).unwrap();

        assert_eq!(store.get(&bundle.id).unwrap(), Some(forwarded));
    }
}

//! Loading and saving the contact book document.
//!
//! A missing document means "no prior data". A document that cannot be read
//! or parsed leaves the store empty and is reported. A failed save is
//! reported and leaves the in-memory store untouched.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::codec::{self, Document};
use crate::error::{BookError, BookResult};
use crate::remote::RemoteStore;
use crate::store::Store;

pub trait DataStore: Send + Sync {
    /// `Ok(None)` when no document has been written yet.
    fn load(&self) -> BookResult<Option<Document>>;

    /// Replaces the stored document with `doc`.
    fn save(&self, doc: &Document) -> BookResult<()>;

    fn describe(&self) -> String;
}

/// JSON document on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataStore for LocalFile {
    fn load(&self) -> BookResult<Option<Document>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(codec::from_json(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes next to the target and renames over it, so a failed write
    /// never leaves a truncated document behind.
    fn save(&self, doc: &Document) -> BookResult<()> {
        let bytes = codec::to_json(doc)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// JSON document held by a [`RemoteStore`]. Every save overwrites whatever
/// revision is current (last writer wins).
#[derive(Debug, Clone)]
pub struct RemoteDataFile<R> {
    remote: R,
    path: String,
}

impl<R: RemoteStore> RemoteDataFile<R> {
    pub fn new(remote: R, path: impl Into<String>) -> Self {
        Self {
            remote,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<R: RemoteStore> DataStore for RemoteDataFile<R> {
    fn load(&self) -> BookResult<Option<Document>> {
        match self.remote.get(&self.path)? {
            Some(file) => Ok(Some(codec::from_json(&file.content)?)),
            None => Ok(None),
        }
    }

    fn save(&self, doc: &Document) -> BookResult<()> {
        let bytes = codec::to_json(doc)?;
        let current = self.remote.get(&self.path)?.map(|file| file.version);
        self.remote.put(
            &self.path,
            &bytes,
            &format!("Update {}", self.path),
            current.as_deref(),
        )?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("remote {}", self.path)
    }
}

#[derive(Debug)]
pub enum LoadStatus {
    Loaded,
    /// Nothing stored yet.
    Fresh,
    Failed(BookError),
}

/// Loads and repairs the store. Never fails: on error the store is empty and
/// the error is returned in the status.
pub fn load_store(backend: &dyn DataStore) -> (Store, LoadStatus) {
    match backend.load() {
        Ok(Some(doc)) => {
            let mut store = codec::deserialize(doc);
            store.repair();
            info!(
                "loaded {} contacts, {} events, {} groups from {}",
                store.contacts().len(),
                store.events().len(),
                store.groups().len(),
                backend.describe()
            );
            (store, LoadStatus::Loaded)
        }
        Ok(None) => {
            info!("no prior data at {}", backend.describe());
            (Store::new(), LoadStatus::Fresh)
        }
        Err(err) => {
            error!("failed to load {}: {}", backend.describe(), err);
            (Store::new(), LoadStatus::Failed(err))
        }
    }
}

/// Serializes a full snapshot of `store` and writes it.
pub fn save_store(backend: &dyn DataStore, store: &Store) -> BookResult<()> {
    let snapshot = codec::serialize(store);
    match backend.save(&snapshot) {
        Ok(()) => {
            info!("saved to {}", backend.describe());
            Ok(())
        }
        Err(err) => {
            error!("failed to save to {}: {}", backend.describe(), err);
            Err(err)
        }
    }
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use contactbook::remote::{RemoteError, RemoteFile, RemoteStore};

/// In-memory stand-in for the hosted contents API. Versions are checked the
/// way the real API checks them: a put must name the current version.
#[derive(Debug, Default, Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<String, RemoteFile>,
    revision: u64,
    failing: bool,
    puts: Vec<String>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, content: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.revision += 1;
        let version = format!("v{}", inner.revision);
        inner.files.insert(
            path.to_string(),
            RemoteFile {
                content: content.to_vec(),
                version,
            },
        );
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.files.get(path).map(|f| f.content.clone())
    }

    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    pub fn puts(&self) -> Vec<String> {
        self.inner.lock().unwrap().puts.clone()
    }
}

impl RemoteStore for MemoryRemote {
    fn get(&self, path: &str) -> Result<Option<RemoteFile>, RemoteError> {
        let inner = self.inner.lock().unwrap();
        if inner.failing {
            return Err(RemoteError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(inner.files.get(path).cloned())
    }

    fn put(
        &self,
        path: &str,
        content: &[u8],
        _message: &str,
        previous_version: Option<&str>,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing {
            return Err(RemoteError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let current = inner.files.get(path).map(|f| f.version.clone());
        if current.as_deref() != previous_version {
            return Err(RemoteError::Status {
                status: 409,
                body: format!("{path} does not match {previous_version:?}"),
            });
        }
        inner.revision += 1;
        let version = format!("v{}", inner.revision);
        inner.files.insert(
            path.to_string(),
            RemoteFile {
                content: content.to_vec(),
                version,
            },
        );
        inner.puts.push(path.to_string());
        Ok(())
    }
}

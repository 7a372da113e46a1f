//! Durable token persistence. The session store writes the bearer and
//! refresh tokens here under fixed keys so a restarted console can rehydrate;
//! everything else about the values is opaque to this crate. Hosts pick the
//! implementation: in-memory for tests, a file for native shells, or their
//! own store behind the trait.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

/// Storage key for the session bearer token.
pub const BEARER_TOKEN_KEY: &str = "pordisto_bearer_token";
/// Storage key for the opaque refresh token.
pub const REFRESH_TOKEN_KEY: &str = "pordisto_refresh_token";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Malformed store: {0}")]
    Malformed(String),
}

/// Keyed durable storage for token material.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Volatile store for tests and hosts that must never persist tokens.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// JSON-file store for native hosts. Tokens are written in the clear;
/// restricting access to the file is the host's responsibility.
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the backing file.
    guard: tokio::sync::Mutex<()>,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_entries(&self) -> Result<HashMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|err| StorageError::Malformed(format!("{}: {err}", self.path.display()))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(StorageError::Io(format!(
                "{}: {err}",
                self.path.display()
            ))),
        }
    }

    async fn write_entries(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            create_dir_all(parent).await?;
        }

        let raw = serde_json::to_string_pretty(entries)
            .map_err(|err| StorageError::Malformed(err.to_string()))?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|err| StorageError::Io(format!("{}: {err}", self.path.display())))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard.lock().await;
        Ok(self.read_entries().await?.remove(key))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().await;
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }
}

async fn create_dir_all(parent: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|err| StorageError::Io(format!("{}: {err}", parent.display())))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

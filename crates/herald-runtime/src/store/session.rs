//! Durable session credential store
//!
//! Credentials live in one JSON file inside the instance's private
//! `session/` directory. Updates are serialized behind an async mutex and
//! written temp-then-rename, so the file on disk always holds the last
//! committed update even if the process dies mid-rotation. `purge` removes
//! the whole directory tree; the supervisor guarantees it only runs once
//! the transport is fully torn down.

use herald_core::errors::StoreError;
use herald_core::types::SessionCredentials;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const CREDENTIALS_FILE: &str = "credentials.json";

// ----------------------------------------------------------------------------
// Session Store
// ----------------------------------------------------------------------------

/// Owns the persisted credential material for one instance.
pub struct SessionStore {
    dir: PathBuf,
    // Serializes updates and purges; no interleaved partial writes.
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Create a store rooted at the instance's `session/` directory.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn credentials_path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }

    /// Load persisted credentials, creating fresh empty ones if none exist.
    pub async fn load(&self) -> Result<SessionCredentials, StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.credentials_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let credentials = serde_json::from_slice(&bytes)?;
                debug!(path = %path.display(), "loaded session credentials");
                Ok(credentials)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted credentials, starting fresh");
                Ok(SessionCredentials::fresh())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist rotated credentials.
    ///
    /// Runs to completion before returning; concurrent calls for the same
    /// instance queue on the write lock rather than interleave.
    pub async fn on_update(&self, credentials: &SessionCredentials) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(credentials)?;

        let path = self.credentials_path();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "persisted credential update");
        Ok(())
    }

    /// Remove all persisted material and recreate an empty directory.
    /// Used on forced logout.
    pub async fn purge(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        info!(dir = %self.dir.display(), "purged session credentials");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

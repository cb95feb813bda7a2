//! Serialized, in-place persistence of the manifest file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::error::{PlaygroundError, Result};
use crate::manifest::Manifest;

/// Owns the manifest file.
///
/// Every load and save goes through one lock. Writes rewrite the existing file
/// in place (truncate, write, fsync) instead of replacing it, because the file
/// is bind-mounted into the compose project and a rename would leave the mount
/// pointing at the old inode.
pub struct ManifestStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ManifestStore {
    /// Creates a store for the manifest at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the manifest path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses the current manifest from disk.
    pub async fn load(&self) -> Result<Manifest> {
        let _guard = self.lock.lock().await;
        self.load_unlocked().await
    }

    /// Overwrites the manifest file in place.
    pub async fn save(&self, manifest: &Manifest) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.save_unlocked(manifest).await
    }

    /// Runs a read-modify-write transaction under the store lock.
    ///
    /// The manifest is saved only if `mutate` returns `Ok`.
    pub async fn update<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Manifest) -> Result<T>,
    {
        let _guard = self.lock.lock().await;
        let mut manifest = self.load_unlocked().await?;
        let out = mutate(&mut manifest)?;
        self.save_unlocked(&manifest).await?;
        Ok(out)
    }

    /// Runs a read-only query against a fresh snapshot of the manifest.
    pub async fn read<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Manifest) -> T,
    {
        let manifest = self.load().await?;
        Ok(query(&manifest))
    }

    async fn load_unlocked(&self) -> Result<Manifest> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlaygroundError::ManifestNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let manifest = Manifest::from_yaml_str(&text)?;
        debug!(
            path = %self.path.display(),
            services = manifest.service_names().len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    async fn save_unlocked(&self, manifest: &Manifest) -> Result<()> {
        let yaml = manifest.to_yaml_string()?;

        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlaygroundError::ManifestNotFound(self.path.clone()));
            }
            Err(e) => return Err(self.persistence_error(e)),
        };

        let written: std::io::Result<()> = async {
            file.set_len(0).await?;
            file.seek(SeekFrom::Start(0)).await?;
            file.write_all(yaml.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        match written {
            Ok(()) => {
                debug!(path = %self.path.display(), bytes = yaml.len(), "Saved manifest");
                Ok(())
            }
            Err(e) => Err(self.persistence_error(e)),
        }
    }

    fn persistence_error(&self, source: std::io::Error) -> PlaygroundError {
        error!(path = %self.path.display(), error = %source, "Failed to persist manifest");
        PlaygroundError::persistence(&self.path, source)
    }
}

impl std::fmt::Debug for ManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStore")
            .field("path", &self.path)
            .finish()
    }
}

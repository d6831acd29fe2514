//! JSON file-backed local store.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use cart_sync_core::{CartSnapshot, UserId};
use serde::Serialize;
use tracing::debug;

use super::{LocalStore, StoreError, StoredCart};

/// Stores the cart as a JSON document `{owner, snapshot}` on disk.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so an interrupted write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LocalStore for FileStore {
    fn load(&self) -> Result<StoredCart, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No local cart file yet");
                return Ok(StoredCart::default());
            }
            Err(e) => return Err(e.into()),
        };

        let stored: StoredCart = serde_json::from_slice(&bytes)?;
        debug!(
            path = %self.path.display(),
            owner = ?stored.owner,
            lines = stored.snapshot.len(),
            version = stored.snapshot.version(),
            "Loaded local cart"
        );
        Ok(stored)
    }

    fn save(&self, owner: Option<UserId>, snapshot: &CartSnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(&StoredCartRef { owner, snapshot })?;
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// Borrowed form of [`StoredCart`] so saving does not clone the snapshot.
#[derive(Serialize)]
struct StoredCartRef<'a> {
    owner: Option<UserId>,
    snapshot: &'a CartSnapshot,
}

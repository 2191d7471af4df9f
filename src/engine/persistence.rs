use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::{Result, Error};
use log::debug;
use tempfile::NamedTempFile;

#[allow(unused_imports)]
use crate::engine::MemKvStore;

/// Handles disk I/O for the [`MemKvStore`].
///
/// The whole map is stored as one JSON object in a single file. Saves use an
/// atomic "write-then-rename" strategy so a crash mid-write leaves the previous
/// snapshot intact.
pub struct Persistence {
    file_path: PathBuf,
}

impl Persistence {
    /// Initializes a new `Persistence` handler for `file_path`.
    ///
    /// If the parent directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        if let Some(dir) = file_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|source| Error::FileFault {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(Self { file_path })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Writes the full map to disk atomically.
    ///
    /// The bytes go to a temporary file in the same directory which is then
    /// renamed over the destination.
    pub fn save(&self, data: &BTreeMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;
        let dir = match self.file_path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let fault = |source: std::io::Error| Error::FileFault {
            path: self.file_path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&dir).map_err(fault)?;
        tmp.write_all(&bytes).map_err(fault)?;
        tmp.as_file().sync_all().map_err(fault)?;
        tmp.persist(&self.file_path).map_err(|e| fault(e.error))?;

        debug!("Persisted {} keys to {:?}", data.len(), self.file_path);
        Ok(())
    }

    /// Loads the map from disk. A missing file is an empty store.
    ///
    /// A file that exists but cannot be parsed is a [`Error::ReadFault`]; the
    /// caller must not start writing over it.
    pub fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.file_path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read(&self.file_path).map_err(|source| Error::FileFault {
            path: self.file_path.clone(),
            source,
        })?;

        serde_json::from_slice(&content).map_err(|e| Error::ReadFault {
            key: self.file_path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

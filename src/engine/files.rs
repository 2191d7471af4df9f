use std::collections::{BTreeMap, BTreeSet};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::fs;
use crate::{Error, FileStore, Result};

fn fault(path: &str, source: std::io::Error) -> Error {
    Error::FileFault {
        path: PathBuf::from(path),
        source,
    }
}

/// [`FileStore`] over the local file system, rooted at a data directory.
pub struct LocalFileStore {
    document_dir: String,
}

impl LocalFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let mut document_dir = root.as_ref().display().to_string();
        if !document_dir.ends_with('/') {
            document_dir.push('/');
        }
        Self { document_dir }
    }
}

/// Writes into a temp file next to `target` and renames it into place. The
/// temp file is removed when any step fails.
fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl FileStore for LocalFileStore {
    fn document_dir(&self) -> &str {
        &self.document_dir
    }

    async fn make_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path).await.map_err(|e| fault(path, e))
    }

    async fn write_string(&self, path: &str, contents: &str) -> Result<()> {
        let target = PathBuf::from(path);
        let contents = contents.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&target, &contents))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?
            .map_err(|e| fault(path, e))
    }

    async fn read_string(&self, path: &str) -> Result<String> {
        fs::read_to_string(path).await.map_err(|e| fault(path, e))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(path).await.map_err(|e| fault(path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| fault(path, e))? {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        fs::remove_file(path).await.map_err(|e| fault(path, e))
    }

    async fn size(&self, path: &str) -> Result<Option<u64>> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(fault(path, e)),
        }
    }
}

/// In-memory [`FileStore`] with the same directory rules as a real disk:
/// writing into a directory that was never created fails.
pub struct MemFileStore {
    document_dir: String,
    files: RwLock<BTreeMap<String, String>>,
    dirs: RwLock<BTreeSet<String>>,
    read_only: AtomicBool,
}

impl Default for MemFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFileStore {
    pub const DOCUMENT_DIR: &'static str = "mem://documents/";

    pub fn new() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert(trim_dir(Self::DOCUMENT_DIR).to_string());
        Self {
            document_dir: Self::DOCUMENT_DIR.to_string(),
            files: RwLock::new(BTreeMap::new()),
            dirs: RwLock::new(dirs),
            read_only: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail, as a full or read-only disk would.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Every stored path, in order.
    pub fn paths(&self) -> Vec<String> {
        self.files.read().unwrap().keys().cloned().collect()
    }

    fn check_writable(&self, path: &str) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(fault(path, std::io::Error::new(ErrorKind::PermissionDenied, "read-only file system")));
        }
        Ok(())
    }
}

fn trim_dir(path: &str) -> &str {
    path.trim_end_matches('/')
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn not_found(path: &str) -> Error {
    fault(path, std::io::Error::new(ErrorKind::NotFound, "no such file or directory"))
}

#[async_trait]
impl FileStore for MemFileStore {
    fn document_dir(&self) -> &str {
        &self.document_dir
    }

    async fn make_dir(&self, path: &str) -> Result<()> {
        self.check_writable(path)?;
        let mut dirs = self.dirs.write().unwrap();
        let mut current = trim_dir(path);
        while !current.is_empty() && current.len() >= trim_dir(&self.document_dir).len() {
            dirs.insert(current.to_string());
            current = parent_of(current);
        }
        Ok(())
    }

    async fn write_string(&self, path: &str, contents: &str) -> Result<()> {
        self.check_writable(path)?;
        if !self.dirs.read().unwrap().contains(parent_of(path)) {
            return Err(not_found(path));
        }
        self.files.write().unwrap().insert(path.to_string(), contents.to_string());
        Ok(())
    }

    async fn read_string(&self, path: &str) -> Result<String> {
        self.files.read().unwrap().get(path).cloned().ok_or_else(|| not_found(path))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let dir = trim_dir(path);
        if !self.dirs.read().unwrap().contains(dir) {
            return Err(not_found(path));
        }
        let files = self.files.read().unwrap();
        Ok(files
            .keys()
            .filter(|p| parent_of(p) == dir)
            .filter_map(|p| p.rsplit_once('/').map(|(_, name)| name.to_string()))
            .collect())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_writable(path)?;
        self.files.write().unwrap().remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    async fn size(&self, path: &str) -> Result<Option<u64>> {
        Ok(self.files.read().unwrap().get(path).map(|c| c.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_write_read_list_delete() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let exports = format!("{}exports/", store.document_dir());
        let file = format!("{}1.json", exports);

        store.make_dir(&exports).await.unwrap();
        store.make_dir(&exports).await.unwrap();
        store.write_string(&file, "[]").await.unwrap();

        assert_eq!(store.read_string(&file).await.unwrap(), "[]");
        assert_eq!(store.read_dir(&exports).await.unwrap(), vec!["1.json".to_string()]);
        assert_eq!(store.size(&file).await.unwrap(), Some(2));

        store.delete(&file).await.unwrap();
        assert_eq!(store.size(&file).await.unwrap(), None);
        assert!(store.read_dir(&exports).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let file = format!("{}backup_1.json", store.document_dir());

        store.write_string(&file, "first").await.unwrap();
        store.write_string(&file, "second").await.unwrap();

        assert_eq!(store.read_string(&file).await.unwrap(), "second");
        assert_eq!(store.read_dir(store.document_dir()).await.unwrap(), vec!["backup_1.json"]);

        let orphan = format!("{}missing/backup_2.json", store.document_dir());
        assert!(matches!(store.write_string(&orphan, "x").await, Err(Error::FileFault { .. })));
        assert_eq!(store.read_dir(store.document_dir()).await.unwrap(), vec!["backup_1.json"]);
    }

    #[tokio::test]
    async fn test_local_missing_dir_is_file_fault() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let missing = format!("{}backups/", store.document_dir());
        assert!(matches!(store.read_dir(&missing).await, Err(Error::FileFault { .. })));
    }

    #[tokio::test]
    async fn test_mem_store_requires_parent_dir() {
        let store = MemFileStore::new();
        let file = format!("{}exports/1.csv", store.document_dir());
        assert!(store.write_string(&file, "id").await.is_err());

        store.make_dir(&format!("{}exports/", store.document_dir())).await.unwrap();
        store.write_string(&file, "id").await.unwrap();
        assert_eq!(store.read_dir(&format!("{}exports", store.document_dir())).await.unwrap(), vec!["1.csv"]);
    }

    #[tokio::test]
    async fn test_mem_store_read_only() {
        let store = MemFileStore::new();
        store.set_read_only(true);
        let file = format!("{}x.json", store.document_dir());
        assert!(matches!(store.write_string(&file, "{}").await, Err(Error::FileFault { .. })));
    }
}

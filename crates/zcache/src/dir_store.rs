//! Directory store - one file per chunk object
//!
//! Lays objects out the way a Zarr directory store does: the object key is
//! used as a relative path below the store root.
//!
//! # File Layout
//! ```text
//! <root>/
//! └── group/
//!     └── temperature/
//!         ├── 0.0          # dimension separator '.'
//!         └── 1/0          # dimension separator '/'
//! ```
//!
//! Whole-object writes go to a temporary file that is renamed into place,
//! so readers never observe a half-written chunk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use zcache_core::{ChunkStore, StoreError};

/// Suffix of in-flight temporary files
const TMP_SUFFIX: &str = ".tmp";

/// In-flight temp files are named `.{name}.tmp`
fn is_temp_name(name: &str) -> bool {
    name.len() > TMP_SUFFIX.len() + 1 && name.starts_with('.') && name.ends_with(TMP_SUFFIX)
}

/// Filesystem-backed object store
pub struct DirectoryStore {
    root: PathBuf,
    writable: bool,
}

impl DirectoryStore {
    /// Open a writable store, creating the root directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root.to_string_lossy(), e))?;
        debug!("Directory store root: {:?}", root);
        Ok(Self {
            root,
            writable: true,
        })
    }

    /// Open an existing store that rejects writes
    pub fn open_read_only(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::NotFound(root.to_string_lossy().into_owned()));
        }
        Ok(Self {
            root,
            writable: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object key to a path below the root.
    ///
    /// Keys are relative `/`-separated paths; empty, `.` and `..`
    /// components and NUL bytes are rejected so no key escapes the root.
    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains('\0') {
            return Err(StoreError::io(key, "invalid object key"));
        }

        let mut path = self.root.clone();
        for part in key.split('/') {
            match part {
                "" | "." | ".." => {
                    return Err(StoreError::io(
                        key,
                        format!("invalid component {:?} in object key", part),
                    ));
                }
                name if is_temp_name(name) => {
                    return Err(StoreError::io(key, "object key uses reserved suffix"));
                }
                name => path.push(name),
            }
        }
        Ok(path)
    }

    /// Write the whole object through a temp file + rename
    fn replace_object(&self, key: &str, target: &Path, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = target.with_file_name(format!(".{}{}", file_name, TMP_SUFFIX));

        let result = (|| -> io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            if offset > 0 {
                file.set_len(offset)?;
                file.seek(SeekFrom::Start(offset))?;
            }
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&temp_path, target)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io(key, e));
        }
        Ok(())
    }

    /// Write into an existing object in place
    fn patch_object(&self, key: &str, target: &Path, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(target)
            .map_err(|e| StoreError::io(key, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::io(key, e))?;
        file.write_all(data).map_err(|e| StoreError::io(key, e))?;
        file.sync_all().map_err(|e| StoreError::io(key, e))
    }

    /// All object keys below the root, sorted
    pub fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        Self::collect_keys(&self.root, &self.root, &mut keys)
            .map_err(|e| StoreError::io(&self.root.to_string_lossy(), e))?;
        keys.sort();
        Ok(keys)
    }

    fn collect_keys(root: &Path, dir: &Path, keys: &mut Vec<String>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect_keys(root, &path, keys)?;
                continue;
            }

            let is_temp = path
                .file_name()
                .map(|n| is_temp_name(&n.to_string_lossy()))
                .unwrap_or(false);
            if is_temp {
                continue;
            }

            if let Ok(relative) = path.strip_prefix(root) {
                let key: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                keys.push(key.join("/"));
            }
        }
        Ok(())
    }
}

impl ChunkStore for DirectoryStore {
    fn read(&self, key: &str, offset: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        let path = self.object_path(key)?;

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(StoreError::io(key, e)),
        };

        let len = file.metadata().map_err(|e| StoreError::io(key, e))?.len();
        let available = len.saturating_sub(offset);
        if offset > len || available < buf.len() as u64 {
            return Err(StoreError::ShortTransfer {
                key: key.to_string(),
                expected: buf.len(),
                actual: usize::try_from(available).unwrap_or(usize::MAX),
            });
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::io(key, e))?;
        file.read_exact(buf).map_err(|e| StoreError::io(key, e))?;

        trace!("dir_store: read {} bytes from {:?}", buf.len(), path);
        Ok(())
    }

    fn write(&self, key: &str, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly(key.to_string()));
        }

        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(key, e))?;
        }

        // A put at offset 0 replaces the whole object
        if offset > 0 && target.is_file() {
            self.patch_object(key, &target, offset, data)?;
        } else {
            self.replace_object(key, &target, offset, data)?;
        }

        trace!("dir_store: wrote {} bytes to {:?}", data.len(), target);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly(key.to_string()));
        }

        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                warn!("Failed to remove object file {:?}: {}", path, e);
                Err(StoreError::io(key, e))
            }
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.object_path(key)?.is_file())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

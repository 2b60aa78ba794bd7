//! One JSON file per record, grouped into directories by namespace.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::persistence::RecordStore;
use crate::types::{encode_segment, Namespace, Result, StoreError};

const RECORD_EXTENSION: &str = "json";

/// Filesystem-backed record store.
///
/// Layout: `<root>/<namespace segments…>/<id>.json`, with ids and segments
/// passed through [`encode_segment`]. Writes land in a sibling `.tmp` file
/// first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        debug!("Opened file store at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, namespace: &Namespace) -> PathBuf {
        self.root.join(namespace.to_path())
    }

    fn record_path(&self, namespace: &Namespace, id: &str) -> Result<PathBuf> {
        let file_id = encode_segment(id);
        if file_id.is_empty() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self
            .dir(namespace)
            .join(format!("{}.{}", file_id, RECORD_EXTENSION)))
    }

    fn read_record(&self, namespace: &Namespace, path: &Path) -> Result<Value> {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            namespace: namespace.to_string(),
            id,
            reason: e.to_string(),
        })
    }
}

impl RecordStore for FileStore {
    fn put(&self, namespace: &Namespace, id: &str, record: &Value) -> Result<()> {
        let path = self.record_path(namespace, id)?;
        let dir = self.dir(namespace);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    fn get(&self, namespace: &Namespace, id: &str) -> Result<Option<Value>> {
        let path = self.record_path(namespace, id)?;
        if !path.exists() {
            return Ok(None);
        }
        match self.read_record(namespace, &path) {
            Ok(value) => Ok(Some(value)),
            Err(e @ StoreError::Corrupt { .. }) => {
                warn!("Treating corrupt record as absent: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn delete(&self, namespace: &Namespace, id: &str) -> Result<bool> {
        let path = self.record_path(namespace, id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn scan(&self, namespace: &Namespace) -> Result<Vec<Result<Value>>> {
        let dir = self.dir(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
            })
            .collect();
        paths.sort();

        Ok(paths
            .iter()
            .map(|path| self.read_record(namespace, path))
            .collect())
    }

    fn children(&self, namespace: &Namespace) -> Result<Vec<String>> {
        let dir = self.dir(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}

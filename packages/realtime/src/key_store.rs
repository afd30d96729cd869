//! Local store of peers' accepted public keys
//!
//! Keys are written once a handshake succeeds and are never deleted here.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use crate::error::{RealtimeError, RealtimeResult};

/// Peer handle to public key mapping
pub trait KeyStore: Send + Sync {
    /// Look up a peer's public key
    fn get(&self, handle: &str) -> Option<String>;

    /// Record a peer's public key
    fn set(&self, handle: &str, public_key: &str) -> RealtimeResult<()>;
}

/// Session-scoped store
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, handle: &str) -> Option<String> {
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(handle)
            .cloned()
    }

    fn set(&self, handle: &str, public_key: &str) -> RealtimeResult<()> {
        self.keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle.to_string(), public_key.to_string());
        Ok(())
    }
}

/// Store persisted as a flat JSON object on disk
///
/// Every write replaces the whole file through a temporary sibling and a
/// rename, so readers never observe a partially written file.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
    keys: RwLock<BTreeMap<String, String>>,
}

impl FileKeyStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> RealtimeResult<Self> {
        let path = path.into();
        let keys = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| {
                RealtimeError::KeyStore(format!("failed to read {}: {e}", path.display()))
            })?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    RealtimeError::KeyStore(format!("failed to parse {}: {e}", path.display()))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = keys.len(), "Opened key store");
        Ok(Self {
            path,
            keys: RwLock::new(keys),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, keys: &BTreeMap<String, String>) -> RealtimeResult<()> {
        let json = serde_json::to_vec_pretty(keys)?;
        write_atomically(&self.path, &json)
    }
}

/// Replace `path` with `contents` through a synced temporary sibling
///
/// Missing parent directories are created.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> RealtimeResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            RealtimeError::KeyStore(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| {
            RealtimeError::KeyStore(format!("failed to create {}: {e}", tmp_path.display()))
        })?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                RealtimeError::KeyStore(format!("failed to write {}: {e}", tmp_path.display()))
            })?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        RealtimeError::KeyStore(format!("failed to replace {}: {e}", path.display()))
    })
}

impl KeyStore for FileKeyStore {
    fn get(&self, handle: &str) -> Option<String> {
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(handle)
            .cloned()
    }

    fn set(&self, handle: &str, public_key: &str) -> RealtimeResult<()> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        let mut updated = keys.clone();
        updated.insert(handle.to_string(), public_key.to_string());

        // Memory only changes once the file does
        self.persist(&updated)?;
        *keys = updated;
        Ok(())
    }
}

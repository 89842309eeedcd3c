use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use warden_core::{Error, Paths, Result};

/// Well-known keys in the persistent store.
pub mod keys {
    pub const SESSIONS: &str = "sessions";
    pub const SCREENSHOTS: &str = "screenshots";
    pub const HOSTNAME_PAIR_RULES: &str = "hostnamePairRules";
    pub const URL_PAIR_RULES: &str = "urlPairRules";
    pub const BLOCKED_ACTIONS: &str = "blockedActions";
    pub const GOVERNANCE_POLICY: &str = "governancePolicy";
}

/// The async, quota-bounded key-value store the host provides. The engine
/// only relies on `get`/`set`; durability and quota enforcement live behind
/// this seam.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the requested keys. Absent keys are simply missing from the map.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, serde_json::Value>>;

    /// Write all entries. Either the whole batch lands or the call errors.
    async fn set(&self, entries: HashMap<String, serde_json::Value>) -> Result<()>;
}

/// In-memory store for tests and ephemeral runs.
pub struct MemoryStore {
    data: Mutex<HashMap<String, serde_json::Value>>,
    /// Serialized-size ceiling, mimicking the host's storage quota.
    byte_limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            byte_limit: None,
        }
    }

    pub fn with_byte_limit(limit: usize) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            byte_limit: Some(limit),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, serde_json::Value>> {
        let data = self.data.lock().await;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, serde_json::Value>) -> Result<()> {
        let mut data = self.data.lock().await;
        if let Some(limit) = self.byte_limit {
            let mut next = data.clone();
            next.extend(entries.clone());
            let size = serde_json::to_string(&next)?.len();
            if size > limit {
                return Err(Error::QuotaExceeded(format!(
                    "{size} bytes exceeds limit of {limit}"
                )));
            }
        }
        data.extend(entries);
        Ok(())
    }
}

/// Store backed by a single JSON document on disk. Writes rewrite the whole
/// document; callers serialize writes through the audit queue.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(paths: &Paths) -> Self {
        Self {
            path: paths.state_file(),
            lock: Mutex::new(()),
        }
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_document(&self) -> Result<HashMap<String, serde_json::Value>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_document(&self, doc: &HashMap<String, serde_json::Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string(doc)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, serde_json::Value>> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document()?;
        Ok(keys
            .iter()
            .filter_map(|k| doc.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, serde_json::Value>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document()?;
        doc.extend(entries);
        self.write_document(&doc)
    }
}

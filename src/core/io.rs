use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[cfg(target_arch = "wasm32")]
pub trait StoreBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> StoreBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait StoreBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> StoreBounds for T {}

/// A flat string key-value store, the shape of browser `localStorage`.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait KeyValueStore: StoreBounds {
    async fn read(&self, key: &str) -> Result<Option<String>>;
    async fn write(&self, key: &str, value: &str) -> Result<()>;
}

// --- In-memory Implementation ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// --- Native Implementation ---

/// One `<key>.json` file per key under a root directory.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileStore {
    root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<std::path::PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            anyhow::bail!("Invalid store key: {:?}", key);
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl KeyValueStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        use anyhow::Context;

        let path = self.path_for(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(content))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        use anyhow::Context;

        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, value)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("Wrote {} ({} bytes)", path.display(), value.len());
        Ok(())
    }
}

// --- Web Implementation ---

#[cfg(target_arch = "wasm32")]
pub struct LocalStore {
    storage: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl LocalStore {
    pub fn new() -> Result<Self> {
        use anyhow::anyhow;

        let window = web_sys::window().ok_or_else(|| anyhow!("No window available"))?;
        let storage = window
            .local_storage()
            .map_err(|e| anyhow!("localStorage error: {:?}", e))?
            .ok_or_else(|| anyhow!("localStorage is not available"))?;
        Ok(Self { storage })
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl KeyValueStore for LocalStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        self.storage
            .get_item(key)
            .map_err(|e| anyhow::anyhow!("Get error: {:?}", e))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.storage
            .set_item(key, value)
            .map_err(|e| anyhow::anyhow!("Set error: {:?}", e))
    }
}

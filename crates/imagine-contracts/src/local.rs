use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

/// String-keyed JSON area persisted to a single file.
///
/// Every operation re-reads the file, so two handles on the same path see
/// each other's writes; only the touched key is merged back on write.
#[derive(Debug, Clone)]
pub struct LocalStore {
    inner: Arc<LocalStoreInner>,
}

#[derive(Debug)]
struct LocalStoreInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(LocalStoreInner {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let _guard = self.lock()?;
        Ok(read_json_object(&self.inner.path).remove(key))
    }

    pub fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let _guard = self.lock()?;
        let mut on_disk = read_json_object(&self.inner.path);
        if on_disk.get(key) == Some(&value) {
            return Ok(());
        }
        on_disk.insert(key.to_string(), value);
        write_json_object(&self.inner.path, &on_disk)
    }

    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.take(key).map(|_| ())
    }

    /// Reads and deletes `key` under one lock.
    pub fn take(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let _guard = self.lock()?;
        let mut on_disk = read_json_object(&self.inner.path);
        let Some(value) = on_disk.remove(key) else {
            return Ok(None);
        };
        write_json_object(&self.inner.path, &on_disk)?;
        Ok(Some(value))
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, ()>> {
        self.inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("local store lock poisoned"))
    }
}

fn read_json_object(path: &Path) -> Map<String, Value> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|parsed| parsed.as_object().cloned())
        .unwrap_or_default()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    write_replacing(path, &serde_json::to_string_pretty(payload)?)
}

/// Stages `contents` next to `path` and renames it into place, so readers see
/// either the old file or the new one.
pub(crate) fn write_replacing(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(format!(".{}.tmp", std::process::id()));
    let staging = PathBuf::from(staging);
    std::fs::write(&staging, contents)?;
    if let Err(err) = std::fs::rename(&staging, path) {
        let _ = std::fs::remove_file(&staging);
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::LocalStore;

    #[test]
    fn set_then_get() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalStore::new(temp.path().join("local.json"));
        store.set("key", json!({"value": 1}))?;
        assert_eq!(store.get("key")?, Some(json!({"value": 1})));
        assert_eq!(store.get("other")?, None);
        Ok(())
    }

    #[test]
    fn take_removes_the_entry() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalStore::new(temp.path().join("local.json"));
        store.set("key", json!("payload"))?;
        assert_eq!(store.take("key")?, Some(json!("payload")));
        assert_eq!(store.take("key")?, None);
        assert_eq!(store.get("key")?, None);
        Ok(())
    }

    #[test]
    fn writes_merge_between_handles() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("local.json");
        let store_a = LocalStore::new(&path);
        let store_b = LocalStore::new(&path);

        store_a.set("a", json!(1))?;
        store_b.set("b", json!(2))?;
        store_a.remove("a")?;

        let reloaded = LocalStore::new(path);
        assert_eq!(reloaded.get("a")?, None);
        assert_eq!(reloaded.get("b")?, Some(json!(2)));
        Ok(())
    }

    #[test]
    fn writes_replace_the_file_without_leaving_staging_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("local.json");
        let store = LocalStore::new(&path);
        store.set("creator_state_v2", json!({"prompt": "fox"}))?;
        store.set("pending_prompt_transfer", json!({"positive": "a"}))?;
        store.take("pending_prompt_transfer")?;

        let names: Vec<_> = std::fs::read_dir(temp.path())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["local.json"]);
        let on_disk: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(on_disk, json!({"creator_state_v2": {"prompt": "fox"}}));
        Ok(())
    }

    #[test]
    fn corrupt_file_reads_as_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("local.json");
        std::fs::write(&path, "{not json")?;
        let store = LocalStore::new(&path);
        assert_eq!(store.get("key")?, None);
        store.set("key", json!(true))?;
        assert_eq!(store.get("key")?, Some(json!(true)));
        Ok(())
    }
}

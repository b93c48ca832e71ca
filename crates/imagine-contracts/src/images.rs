use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::local::write_replacing;

pub const IMAGE_STORE_SCHEMA_VERSION: u64 = 1;

/// A generated image as kept in history. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    /// `data:image/png;base64,...` payload.
    pub url: String,
    pub prompt: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub width: u32,
    pub height: u32,
}

impl GeneratedImage {
    pub fn new(url: impl Into<String>, prompt: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: generate_unique_id(),
            url: url.into(),
            prompt: prompt.into(),
            timestamp: Utc::now().timestamp_millis(),
            width,
            height,
        }
    }
}

pub fn generate_unique_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "img_{}_{}",
        Utc::now().timestamp_millis(),
        &random[..13.min(random.len())]
    )
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    schema_version: u64,
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

/// Durable, append-ordered collection of [`GeneratedImage`] keyed by id.
///
/// Opened once per process and shared by cloning the handle. Every mutation
/// is written to disk before the in-memory view changes, so a failed write
/// leaves both untouched.
#[derive(Debug, Clone)]
pub struct ImageStore {
    inner: Arc<ImageStoreInner>,
}

#[derive(Debug)]
struct ImageStoreInner {
    path: PathBuf,
    records: Mutex<IndexMap<String, GeneratedImage>>,
}

impl ImageStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            load_records(&path)?
        } else {
            let empty = IndexMap::new();
            write_records(&path, &empty)
                .with_context(|| format!("failed to create image store {}", path.display()))?;
            empty
        };
        Ok(Self {
            inner: Arc::new(ImageStoreInner {
                path,
                records: Mutex::new(records),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Adds a record. Returns false when the id already exists or the write
    /// fails; the caller decides whether to surface it.
    pub fn add(&self, image: GeneratedImage) -> bool {
        self.try_add(image).unwrap_or(false)
    }

    pub fn try_add(&self, image: GeneratedImage) -> anyhow::Result<bool> {
        let mut records = self.lock()?;
        if records.contains_key(&image.id) {
            return Ok(false);
        }
        let mut next = records.clone();
        next.insert(image.id.clone(), image);
        write_records(&self.inner.path, &next)?;
        *records = next;
        Ok(true)
    }

    /// All records, newest first.
    pub fn list(&self) -> anyhow::Result<Vec<GeneratedImage>> {
        let records = self.lock()?;
        Ok(records.values().rev().cloned().collect())
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<GeneratedImage>> {
        let records = self.lock()?;
        Ok(records.get(id).cloned())
    }

    /// Removes a record. Deleting an absent id succeeds without writing.
    pub fn delete(&self, id: &str) -> bool {
        self.try_delete(id).unwrap_or(false)
    }

    pub fn try_delete(&self, id: &str) -> anyhow::Result<bool> {
        let mut records = self.lock()?;
        if !records.contains_key(id) {
            return Ok(true);
        }
        let mut next = records.clone();
        next.shift_remove(id);
        write_records(&self.inner.path, &next)?;
        *records = next;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, IndexMap<String, GeneratedImage>>> {
        self.inner
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("image store lock poisoned"))
    }
}

fn load_records(path: &Path) -> anyhow::Result<IndexMap<String, GeneratedImage>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading image store {}", path.display()))?;
    let parsed: StoreFile = serde_json::from_str(&raw)
        .with_context(|| format!("image store {} is not valid JSON", path.display()))?;
    if parsed.schema_version > IMAGE_STORE_SCHEMA_VERSION {
        bail!(
            "image store {} has schema version {} (supported: {})",
            path.display(),
            parsed.schema_version,
            IMAGE_STORE_SCHEMA_VERSION
        );
    }
    let mut records = IndexMap::new();
    for image in parsed.images {
        records.entry(image.id.clone()).or_insert(image);
    }
    Ok(records)
}

fn write_records(path: &Path, records: &IndexMap<String, GeneratedImage>) -> anyhow::Result<()> {
    let payload = StoreFile {
        schema_version: IMAGE_STORE_SCHEMA_VERSION,
        images: records.values().cloned().collect(),
    };
    write_replacing(path, &serde_json::to_string_pretty(&payload)?)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn image(id: &str) -> GeneratedImage {
        GeneratedImage {
            id: id.to_string(),
            url: format!("data:image/png;base64,{id}"),
            prompt: format!("prompt {id}"),
            timestamp: 1_700_000_000_000,
            width: 1024,
            height: 1024,
        }
    }

    fn ids(images: &[GeneratedImage]) -> Vec<&str> {
        images.iter().map(|image| image.id.as_str()).collect()
    }

    #[test]
    fn open_creates_versioned_empty_collection() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("data/images.json");
        let store = ImageStore::open(&path)?;
        assert!(store.is_empty());

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed["schema_version"], Value::from(1));
        assert_eq!(parsed["images"], Value::Array(Vec::new()));

        ImageStore::open(&path)?;
        Ok(())
    }

    #[test]
    fn list_is_newest_first_after_adds_and_deletes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::open(temp.path().join("images.json"))?;

        for id in ["a", "b", "c", "d"] {
            assert!(store.add(image(id)));
        }
        assert!(store.delete("b"));
        assert!(store.add(image("e")));
        assert!(store.delete("a"));

        assert_eq!(ids(&store.list()?), vec!["e", "d", "c"]);
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::open(temp.path().join("images.json"))?;
        assert!(store.add(image("a")));

        let mut clash = image("a");
        clash.prompt = "different".to_string();
        assert!(!store.add(clash));

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("a")?.map(|found| found.prompt),
            Some("prompt a".to_string())
        );
        Ok(())
    }

    #[test]
    fn deleting_absent_id_is_a_no_op_success() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::open(temp.path().join("images.json"))?;
        assert!(store.add(image("a")));
        assert!(store.delete("missing"));
        assert!(store.delete("a"));
        assert!(store.delete("a"));
        assert!(store.list()?.is_empty());
        Ok(())
    }

    #[test]
    fn records_survive_reopen_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("images.json");
        {
            let store = ImageStore::open(&path)?;
            store.add(image("first"));
            store.add(image("second"));
        }
        let reopened = ImageStore::open(&path)?;
        assert_eq!(ids(&reopened.list()?), vec!["second", "first"]);
        Ok(())
    }

    #[test]
    fn failed_write_reports_false_and_keeps_view() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("data");
        let store = ImageStore::open(dir.join("images.json"))?;
        assert!(store.add(image("kept")));

        std::fs::remove_dir_all(&dir)?;
        std::fs::write(&dir, b"not a directory")?;

        assert!(!store.add(image("lost")));
        assert!(!store.delete("kept"));
        assert_eq!(ids(&store.list()?), vec!["kept"]);
        Ok(())
    }

    #[test]
    fn newer_schema_is_refused() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("images.json");
        std::fs::write(&path, r#"{"schema_version": 2, "images": []}"#)?;
        let err = ImageStore::open(&path).err().map(|err| err.to_string());
        assert!(err.unwrap_or_default().contains("schema version 2"));
        Ok(())
    }

    #[test]
    fn unique_ids_carry_prefix_and_differ() {
        let first = generate_unique_id();
        let second = generate_unique_id();
        assert!(first.starts_with("img_"));
        assert_ne!(first, second);
    }
}

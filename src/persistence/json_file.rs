//! JSON file store
//!
//! One pretty-printed JSON object per collection (`users.json`,
//! `deals.json`) keyed by record id. Records are held in memory and only
//! dirty collections are rewritten on flush, through a temp file and rename.
//!
//! A collection file that fails to parse is moved to
//! `backups/<stem>_<YYYYMMDD_HHMMSS>_corrupted.json` and the collection
//! starts empty. `open_read_only` instead reports the file as an error and
//! never touches the directory.

use super::store::{Collection, Store, StoreError, StoreResult};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    collections: BTreeMap<Collection, BTreeMap<String, Value>>,
    dirty: BTreeSet<Collection>,
    read_only: bool,
}

impl JsonFileStore {
    /// Open (or create) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Self::load(dir, false)
    }

    /// Open `dir` for inspection.
    ///
    /// A missing directory reads as empty and is not created. Corrupted
    /// files are left in place and fail the open. `flush` refuses to write.
    pub fn open_read_only(dir: impl AsRef<Path>) -> StoreResult<Self> {
        Self::load(dir.as_ref().to_path_buf(), true)
    }

    fn load(dir: PathBuf, read_only: bool) -> StoreResult<Self> {
        let mut collections = BTreeMap::new();
        for collection in Collection::ALL {
            let records = load_collection(&dir, collection, !read_only)?;
            info!(%collection, records = records.len(), read_only, "collection loaded");
            collections.insert(collection, records);
        }

        Ok(Self {
            dir,
            collections,
            dirty: BTreeSet::new(),
            read_only,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn collection_path(&self, collection: Collection) -> PathBuf {
        collection_path(&self.dir, collection)
    }

    fn write_collection(&self, collection: Collection) -> StoreResult<()> {
        let records: Map<String, Value> = self
            .collections
            .get(&collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let path = self.collection_path(collection);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(records))?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn collection_path(dir: &Path, collection: Collection) -> PathBuf {
    dir.join(format!("{}.json", collection.file_stem()))
}

fn load_collection(
    dir: &Path,
    collection: Collection,
    repair: bool,
) -> StoreResult<BTreeMap<String, Value>> {
    let path = collection_path(dir, collection);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let contents = fs::read(&path)?;
    match serde_json::from_slice::<Map<String, Value>>(&contents) {
        Ok(records) => Ok(records.into_iter().collect()),
        Err(source) if !repair => Err(StoreError::Corrupted { path, source }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "collection file is corrupted");
            let backup = backup_corrupted(dir, collection, &path)?;
            warn!(backup = %backup.display(), "corrupted file moved aside, starting empty");
            Ok(BTreeMap::new())
        }
    }
}

fn backup_corrupted(dir: &Path, collection: Collection, path: &Path) -> StoreResult<PathBuf> {
    let backups = dir.join("backups");
    fs::create_dir_all(&backups)?;
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let backup = backups.join(format!("{}_{}_corrupted.json", collection.file_stem(), stamp));
    fs::rename(path, &backup)?;
    Ok(backup)
}

impl Store for JsonFileStore {
    fn get(&self, collection: Collection, key: &str) -> StoreResult<Value> {
        self.collections
            .get(&collection)
            .and_then(|c| c.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection,
                key: key.to_string(),
            })
    }

    fn put(&mut self, collection: Collection, key: &str, value: Value) -> StoreResult<()> {
        let records = self.collections.entry(collection).or_default();
        if records.get(key) != Some(&value) {
            records.insert(key.to_string(), value);
            self.dirty.insert(collection);
        }
        Ok(())
    }

    fn delete(&mut self, collection: Collection, key: &str) -> StoreResult<()> {
        if let Some(records) = self.collections.get_mut(&collection) {
            if records.remove(key).is_some() {
                self.dirty.insert(collection);
            }
        }
        Ok(())
    }

    fn entries(&self, collection: Collection) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .collections
            .get(&collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn flush(&mut self) -> StoreResult<()> {
        if self.read_only && !self.dirty.is_empty() {
            return Err(StoreError::ReadOnly);
        }
        let dirty: Vec<Collection> = self.dirty.iter().copied().collect();
        for collection in dirty {
            self.write_collection(collection)?;
            self.dirty.remove(&collection);
            info!(%collection, "collection saved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_flush_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = JsonFileStore::open(temp_dir.path()).unwrap();
            store
                .put(Collection::Users, "1", json!({"id": "1"}))
                .unwrap();
            store.flush().unwrap();
        }

        let store = JsonFileStore::open(temp_dir.path()).unwrap();
        assert_eq!(
            store.get(Collection::Users, "1").unwrap(),
            json!({"id": "1"})
        );
        assert!(store.entries(Collection::Deals).unwrap().is_empty());
    }

    #[test]
    fn test_flush_writes_only_dirty_collections() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::open(temp_dir.path()).unwrap();
        store.put(Collection::Deals, "d", json!(1)).unwrap();
        store.flush().unwrap();

        assert!(store.collection_path(Collection::Deals).exists());
        assert!(!store.collection_path(Collection::Users).exists());
    }

    #[test]
    fn test_corrupted_file_is_backed_up() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("deals.json"), "{ not json").unwrap();
        fs::write(temp_dir.path().join("users.json"), r#"{"1": {"id": "1"}}"#).unwrap();

        let store = JsonFileStore::open(temp_dir.path()).unwrap();
        assert!(store.entries(Collection::Deals).unwrap().is_empty());
        assert_eq!(store.entries(Collection::Users).unwrap().len(), 1);

        let backups: Vec<String> = fs::read_dir(temp_dir.path().join("backups"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with("deals_"));
        assert!(backups[0].ends_with("_corrupted.json"));
        assert!(!temp_dir.path().join("deals.json").exists());
    }

    #[test]
    fn test_read_only_open_leaves_directory_alone() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent");

        let store = JsonFileStore::open_read_only(&missing).unwrap();
        assert!(store.entries(Collection::Users).unwrap().is_empty());
        assert!(!missing.exists());
    }

    #[test]
    fn test_read_only_open_reports_corruption_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let deals = temp_dir.path().join("deals.json");
        fs::write(&deals, "{ not json").unwrap();

        let err = JsonFileStore::open_read_only(temp_dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
        assert_eq!(fs::read_to_string(&deals).unwrap(), "{ not json");
        assert!(!temp_dir.path().join("backups").exists());
    }

    #[test]
    fn test_read_only_flush_refuses_writes() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::open_read_only(temp_dir.path()).unwrap();
        store.flush().unwrap();

        store.put(Collection::Users, "1", json!(1)).unwrap();
        assert!(matches!(store.flush(), Err(StoreError::ReadOnly)));
        assert!(!store.collection_path(Collection::Users).exists());
    }

    #[test]
    fn test_delete_marks_dirty() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::open(temp_dir.path()).unwrap();
        store.put(Collection::Users, "1", json!(1)).unwrap();
        store.flush().unwrap();
        store.delete(Collection::Users, "1").unwrap();
        store.flush().unwrap();

        let reopened = JsonFileStore::open(temp_dir.path()).unwrap();
        assert!(reopened.entries(Collection::Users).unwrap().is_empty());
    }
}

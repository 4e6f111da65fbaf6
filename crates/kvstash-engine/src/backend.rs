//! Object-store data and the memory/durable backend split.

use crate::codec;
use crate::schema::StoreSpec;
use crate::{magic, STORE_FORMAT_VERSION};
use kvstash_core::{Error, Query, Result, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Separator for composite index keys. Record keys are plain text, so a
/// control character keeps composites unambiguous.
const INDEX_KEY_SEP: char = '\u{1f}';

/// Where a database keeps its records.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Ephemeral, process-lifetime storage
    Memory,
    /// One directory per database under the engine's data dir
    Durable {
        /// Database directory
        dir: PathBuf,
        /// fsync written files before renaming them into place
        sync_on_write: bool,
    },
}

impl Backend {
    /// True for the durable variant.
    pub fn is_durable(&self) -> bool {
        matches!(self, Backend::Durable { .. })
    }
}

/// One named collection of records plus its secondary indexes.
///
/// Index data is derived state: it is rebuilt from the records on load and
/// maintained incrementally on every write.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    spec: StoreSpec,
    records: BTreeMap<String, Value>,
    /// index name -> index key -> primary keys holding that index key
    indexes: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl ObjectStore {
    /// Creates an empty store for `spec`.
    pub fn new(spec: StoreSpec) -> Self {
        let indexes = spec
            .indexes
            .iter()
            .map(|i| (i.name.clone(), BTreeMap::new()))
            .collect();
        ObjectStore {
            spec,
            records: BTreeMap::new(),
            indexes,
        }
    }

    /// Creates a store for `spec` seeded with `records`, rebuilding indexes.
    pub fn from_records(
        spec: StoreSpec,
        records: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Self> {
        let mut store = ObjectStore::new(spec);
        for (key, record) in records {
            store.index_record(&key, &record)?;
            store.records.insert(key, record);
        }
        Ok(store)
    }

    /// The store's declared shape.
    pub fn spec(&self) -> &StoreSpec {
        &self.spec
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Extracts the primary key for `record` via the declared key path.
    fn primary_key(&self, record: &Value) -> Result<String> {
        match &self.spec.key_path {
            Some(path) => match record.get(path) {
                Some(Value::Text(key)) => Ok(key.clone()),
                Some(_) => Err(Error::Request(format!(
                    "Key path \"{}\" must hold a text key",
                    path
                ))),
                None => Err(Error::Request(format!(
                    "Record is missing key path \"{}\"",
                    path
                ))),
            },
            None => Err(Error::Request(format!(
                "Store \"{}\" has no key path; records cannot be keyed",
                self.spec.name
            ))),
        }
    }

    /// Builds the index key for `record` under `key_paths`, or `None` when
    /// any component is absent (such records are simply not indexed).
    fn index_key(record: &Value, key_paths: &[String]) -> Option<String> {
        let mut parts = Vec::with_capacity(key_paths.len());
        for path in key_paths {
            parts.push(record.get(path)?.as_text()?.to_string());
        }
        Some(parts.join(&INDEX_KEY_SEP.to_string()))
    }

    /// Adds `record` to every applicable index, enforcing uniqueness.
    fn index_record(&mut self, primary: &str, record: &Value) -> Result<()> {
        for index in &self.spec.indexes {
            let Some(idx_key) = Self::index_key(record, &index.key_paths) else {
                continue;
            };
            let bucket = self
                .indexes
                .entry(index.name.clone())
                .or_default()
                .entry(idx_key.clone())
                .or_default();
            if index.unique && bucket.iter().any(|k| k != primary) {
                return Err(Error::Request(format!(
                    "Unique index \"{}\" already holds key \"{}\"",
                    index.name, idx_key
                )));
            }
            if !bucket.iter().any(|k| k == primary) {
                bucket.push(primary.to_string());
            }
        }
        Ok(())
    }

    /// Removes `record`'s entries from every index.
    fn unindex_record(&mut self, primary: &str, record: &Value) {
        for index in &self.spec.indexes {
            let Some(idx_key) = Self::index_key(record, &index.key_paths) else {
                continue;
            };
            if let Some(by_key) = self.indexes.get_mut(&index.name) {
                if let Some(bucket) = by_key.get_mut(&idx_key) {
                    bucket.retain(|k| k != primary);
                    if bucket.is_empty() {
                        by_key.remove(&idx_key);
                    }
                }
            }
        }
    }

    /// Upserts `record` by its key path; returns the primary key.
    pub fn put(&mut self, record: Value) -> Result<String> {
        let key = self.primary_key(&record)?;

        let old = self.records.remove(&key);
        if let Some(old) = &old {
            self.unindex_record(&key, old);
        }
        if let Err(e) = self.index_record(&key, &record) {
            // Leave the store as if the put never happened. Re-indexing the
            // displaced record cannot fail; its entries were just removed.
            if let Some(old) = old {
                let _ = self.index_record(&key, &old);
                self.records.insert(key, old);
            }
            return Err(e);
        }
        self.records.insert(key.clone(), record);
        Ok(key)
    }

    /// Fetches a record by primary key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.records.get(key).cloned()
    }

    /// Removes a record by primary key; absent keys are a no-op.
    pub fn delete(&mut self, key: &str) {
        if let Some(old) = self.records.remove(key) {
            self.unindex_record(key, &old);
        }
    }

    /// Fetches all records in key order, optionally filtered.
    pub fn get_all(&self, query: Option<&Query>) -> Vec<Value> {
        match query {
            None => self.records.values().cloned().collect(),
            Some(Query::Key(key)) => self.records.get(key).cloned().into_iter().collect(),
            Some(Query::Keys(keys)) => keys
                .iter()
                .filter_map(|k| self.records.get(k).cloned())
                .collect(),
        }
    }

    /// Removes every record and all index entries.
    pub fn clear(&mut self) {
        self.records.clear();
        for by_key in self.indexes.values_mut() {
            by_key.clear();
        }
    }

    /// Primary keys currently holding `idx_key` in index `name`.
    pub fn index_lookup(&self, name: &str, idx_key: &str) -> &[String] {
        self.indexes
            .get(name)
            .and_then(|by_key| by_key.get(idx_key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Snapshot of all records for persistence.
    pub fn records(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.records.iter()
    }

    /// Consumes the store, yielding its records. Used when a schema change
    /// requires rebuilding the store under a new spec.
    pub fn into_records(self) -> impl Iterator<Item = (String, Value)> {
        self.records.into_iter()
    }

    /// Path of this store's durable file under `dir`.
    pub fn file_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.kvs", name))
    }

    /// Persists all records to the store's durable file.
    pub fn save(&self, dir: &Path, sync: bool) -> Result<()> {
        let snapshot: Vec<(String, Value)> = self
            .records
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let frame = codec::encode_framed(magic::STORE, STORE_FORMAT_VERSION, &snapshot)?;
        codec::write_atomic(&Self::file_path(dir, &self.spec.name), &frame, sync)
    }

    /// Loads a store from its durable file; a missing file is an empty store.
    pub fn load(spec: StoreSpec, dir: &Path) -> Result<Self> {
        let path = Self::file_path(dir, &spec.name);
        if !path.exists() {
            return Ok(ObjectStore::new(spec));
        }

        let bytes = std::fs::read(&path)?;
        let snapshot: Vec<(String, Value)> =
            codec::decode_framed(magic::STORE, STORE_FORMAT_VERSION, &bytes)?;
        ObjectStore::from_records(spec, snapshot)
    }
}

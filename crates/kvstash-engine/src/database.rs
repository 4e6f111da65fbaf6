//! The database handle: connection lifecycle, schema upgrades, CRUD.

use crate::backend::{Backend, ObjectStore};
use crate::manifest;
use crate::schema::{DatabaseSchema, SchemaEditor};
use kvstash_core::{Error, Query, Result, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Engine configuration for durable databases.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding one subdirectory per database
    pub data_dir: PathBuf,
    /// fsync written files before renaming them into place
    pub sync_on_write: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("kvstash-data"),
            sync_on_write: true,
        }
    }
}

/// Upgrade callback: receives the stored schema version and an editor valid
/// only for the duration of the exclusive upgrade phase.
pub type UpgradeFn<'a> = dyn Fn(u32, &mut SchemaEditor<'_>) -> Result<()> + Send + Sync + 'a;

/// A live connection: the loaded schema plus every object store's data.
#[derive(Debug)]
struct Connection {
    schema: DatabaseSchema,
    stores: BTreeMap<String, ObjectStore>,
    backend: Backend,
}

#[derive(Debug)]
struct DatabaseInner {
    name: String,
    version: u32,
    backend: Backend,
    /// `None` until `connect()` succeeds; holding the lock across the open
    /// is what makes concurrent connects share one physical open.
    state: Mutex<Option<Connection>>,
    /// Physical opens performed, observable for diagnostics and tests.
    open_count: AtomicU64,
    /// Whether the last issued low-level request has settled.
    last_done: AtomicBool,
}

/// A handle to one logical database.
///
/// Cloning shares the same connection; exactly one physical connection ever
/// exists per handle family. No CRUD operation runs before `connect()` has
/// succeeded - callers that skip it get a loud `Connection` error.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Creates an ephemeral in-memory database.
    pub fn in_memory(name: &str, version: u32) -> Result<Self> {
        Self::with_backend(name, version, Backend::Memory)
    }

    /// Creates a durable database stored under `config.data_dir/<name>`.
    pub fn durable(name: &str, version: u32, config: &EngineConfig) -> Result<Self> {
        let backend = Backend::Durable {
            dir: config.data_dir.join(name),
            sync_on_write: config.sync_on_write,
        };
        Self::with_backend(name, version, backend)
    }

    fn with_backend(name: &str, version: u32, backend: Backend) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::Parameter("\"name\" must not be empty".to_string()));
        }
        if version == 0 {
            return Err(Error::Parameter(
                "\"version\" must be a positive integer".to_string(),
            ));
        }

        Ok(Database {
            inner: Arc::new(DatabaseInner {
                name: name.to_string(),
                version,
                backend,
                state: Mutex::new(None),
                open_count: AtomicU64::new(0),
                last_done: AtomicBool::new(true),
            }),
        })
    }

    /// The logical database name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The schema version this handle requests.
    pub fn version(&self) -> u32 {
        self.inner.version
    }

    /// Opens the connection, or reuses the already-open one.
    ///
    /// When the requested version exceeds the stored version (or on first
    /// open), `on_upgrade` runs exactly once inside the exclusive upgrade
    /// phase before `connect` returns. A stored version above the requested
    /// one is a connection error.
    pub fn connect(&self, on_upgrade: Option<&UpgradeFn<'_>>) -> Result<bool> {
        let mut state = self.lock_state()?;
        if state.is_some() {
            return Ok(true);
        }

        debug!(
            name = %self.inner.name,
            version = self.inner.version,
            "opening database"
        );
        self.inner.open_count.fetch_add(1, Ordering::Relaxed);

        let mut conn = self.open_connection()?;
        let stored_version = conn.schema.version;

        if self.inner.version < stored_version {
            return Err(Error::Connection(format!(
                "Requested version {} is below the stored version {}",
                self.inner.version, stored_version
            )));
        }

        if self.inner.version > stored_version {
            info!(
                name = %self.inner.name,
                from = stored_version,
                to = self.inner.version,
                "upgrading database schema"
            );

            let dropped = {
                let mut editor = SchemaEditor::new(&mut conn.schema);
                if let Some(upgrade) = on_upgrade {
                    upgrade(stored_version, &mut editor)
                        .map_err(|e| Error::Connection(format!("Upgrade failed: {}", e)))?;
                }
                editor.dropped().to_vec()
            };
            conn.schema.version = self.inner.version;

            Self::reconcile_stores(&mut conn, &dropped)?;

            if let Backend::Durable { dir, sync_on_write } = &conn.backend {
                manifest::save(dir, &conn.schema, *sync_on_write)?;
            }
        }

        *state = Some(conn);
        Ok(true)
    }

    /// Brings the loaded stores in line with the post-upgrade schema.
    fn reconcile_stores(conn: &mut Connection, dropped: &[String]) -> Result<()> {
        for name in dropped {
            conn.stores.remove(name);
            if let Backend::Durable { dir, .. } = &conn.backend {
                let path = ObjectStore::file_path(dir, name);
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        for spec in conn.schema.stores.clone() {
            match conn.stores.remove(&spec.name) {
                Some(existing) if existing.spec() == &spec => {
                    conn.stores.insert(spec.name.clone(), existing);
                }
                Some(existing) => {
                    // Spec changed (new index, say): rebuild so derived
                    // index state matches the declaration.
                    let rebuilt = ObjectStore::from_records(spec.clone(), existing.into_records())
                        .map_err(|e| {
                            Error::Connection(format!(
                                "Upgrade failed re-indexing store \"{}\": {}",
                                spec.name, e
                            ))
                        })?;
                    conn.stores.insert(spec.name.clone(), rebuilt);
                }
                None => {
                    conn.stores
                        .insert(spec.name.clone(), ObjectStore::new(spec.clone()));
                }
            }
        }

        Ok(())
    }

    fn open_connection(&self) -> Result<Connection> {
        match &self.inner.backend {
            Backend::Memory => Ok(Connection {
                schema: DatabaseSchema::empty(),
                stores: BTreeMap::new(),
                backend: Backend::Memory,
            }),
            Backend::Durable { dir, sync_on_write } => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    Error::Connection(format!("Failed to create database directory: {}", e))
                })?;

                let schema = manifest::load(dir)?.unwrap_or_else(DatabaseSchema::empty);
                let mut stores = BTreeMap::new();
                for spec in &schema.stores {
                    stores.insert(spec.name.clone(), ObjectStore::load(spec.clone(), dir)?);
                }

                Ok(Connection {
                    schema,
                    stores,
                    backend: Backend::Durable {
                        dir: dir.clone(),
                        sync_on_write: *sync_on_write,
                    },
                })
            }
        }
    }

    /// Releases the connection. A later `connect()` performs a fresh open.
    pub fn close(&self) -> Result<bool> {
        let mut state = self.lock_state()?;
        *state = None;
        debug!(name = %self.inner.name, "closed database");
        Ok(true)
    }

    /// Destroys all stored state for this database.
    ///
    /// Facades close before deleting; a surviving connection here is simply
    /// dropped along with the data.
    pub fn delete_database(&self) -> Result<bool> {
        let mut state = self.lock_state()?;
        *state = None;

        if let Backend::Durable { dir, .. } = &self.inner.backend {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(name = %self.inner.name, "deleted database");
        Ok(true)
    }

    /// Fetches a record by primary key from `store`.
    pub fn get(&self, store: &str, key: &str) -> Result<Option<Value>> {
        self.read_op(store, |s| s.get(key))
    }

    /// Upserts a record into `store` by its key path; returns the key.
    pub fn set(&self, store: &str, record: Value) -> Result<String> {
        self.write_op(store, move |s| s.put(record))
    }

    /// Removes a record from `store`; absent keys are a quiet success.
    pub fn delete(&self, store: &str, key: &str) -> Result<()> {
        self.write_op(store, |s| {
            s.delete(key);
            Ok(())
        })
    }

    /// Fetches records from `store` in key order, optionally filtered.
    pub fn get_all(&self, store: &str, query: Option<&Query>) -> Result<Vec<Value>> {
        self.read_op(store, |s| s.get_all(query))
    }

    /// Removes every record from `store`.
    pub fn clear(&self, store: &str) -> Result<()> {
        self.write_op(store, |s| {
            s.clear();
            Ok(())
        })
    }

    /// Whether the last issued low-level request has settled. Diagnostic
    /// only; never used for control flow.
    pub fn is_done(&self) -> bool {
        self.inner.last_done.load(Ordering::Relaxed)
    }

    /// Physical opens performed so far.
    pub fn open_count(&self) -> u64 {
        self.inner.open_count.load(Ordering::Relaxed)
    }

    /// Read-only transaction scoped to one store.
    fn read_op<T>(&self, store: &str, op: impl FnOnce(&ObjectStore) -> T) -> Result<T> {
        self.inner.last_done.store(false, Ordering::Relaxed);
        let result = (|| {
            let state = self.lock_state()?;
            let conn = state.as_ref().ok_or_else(|| self.not_connected())?;
            let object_store = conn
                .stores
                .get(store)
                .ok_or_else(|| Error::StoreNotFound(store.to_string()))?;
            Ok(op(object_store))
        })();
        self.inner.last_done.store(true, Ordering::Relaxed);
        result
    }

    /// Read-write transaction scoped to one store. For durable databases
    /// the mutation is staged on a copy and only committed once the store
    /// file has been replaced on disk, so a failed write changes nothing.
    fn write_op<T>(&self, store: &str, op: impl FnOnce(&mut ObjectStore) -> Result<T>) -> Result<T> {
        self.inner.last_done.store(false, Ordering::Relaxed);
        let result = (|| {
            let mut state = self.lock_state()?;
            let conn = state.as_mut().ok_or_else(|| self.not_connected())?;
            let backend = conn.backend.clone();
            let object_store = conn
                .stores
                .get_mut(store)
                .ok_or_else(|| Error::StoreNotFound(store.to_string()))?;

            match backend {
                Backend::Memory => op(object_store),
                Backend::Durable { dir, sync_on_write } => {
                    let mut staged = object_store.clone();
                    let out = op(&mut staged)?;
                    staged.save(&dir, sync_on_write)?;
                    *object_store = staged;
                    Ok(out)
                }
            }
        })();
        self.inner.last_done.store(true, Ordering::Relaxed);
        result
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, Option<Connection>>> {
        self.inner
            .state
            .lock()
            .map_err(|_| Error::Connection("Connection state lock poisoned".to_string()))
    }

    fn not_connected(&self) -> Error {
        Error::Connection(format!(
            "Database \"{}\" is not connected",
            self.inner.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexSpec, StoreOptions};
    use std::sync::atomic::AtomicU32;

    fn entries_upgrade(_from: u32, editor: &mut SchemaEditor<'_>) -> Result<()> {
        editor.create_object_store(
            "entries",
            StoreOptions {
                key_path: Some("key".to_string()),
            },
        )
    }

    fn record(key: &str, value: &str) -> Value {
        Value::map([
            ("key".to_string(), Value::from(key)),
            ("value".to_string(), Value::from(value)),
        ])
    }

    #[test]
    fn test_constructor_validation() {
        assert!(matches!(
            Database::in_memory("", 1).unwrap_err(),
            Error::Parameter(_)
        ));
        assert!(matches!(
            Database::in_memory("cache", 0).unwrap_err(),
            Error::Parameter(_)
        ));
    }

    #[test]
    fn test_crud_before_connect_fails() {
        let db = Database::in_memory("cache", 1).unwrap();
        assert!(matches!(
            db.get("entries", "k").unwrap_err(),
            Error::Connection(_)
        ));
    }

    #[test]
    fn test_connect_is_memoized() {
        let db = Database::in_memory("cache", 1).unwrap();
        assert!(db.connect(Some(&entries_upgrade)).unwrap());
        assert!(db.connect(Some(&entries_upgrade)).unwrap());
        assert_eq!(db.open_count(), 1);
    }

    #[test]
    fn test_concurrent_connect_opens_once() {
        let db = Database::in_memory("cache", 1).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.connect(Some(&entries_upgrade)).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(db.open_count(), 1);
    }

    #[test]
    fn test_upgrade_runs_once_per_version_increase() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            sync_on_write: true,
        };
        let calls = AtomicU32::new(0);

        let db = Database::durable("persistence", 1, &config).unwrap();
        let upgrade = |from: u32, editor: &mut SchemaEditor<'_>| {
            calls.fetch_add(1, Ordering::Relaxed);
            assert_eq!(from, 0);
            entries_upgrade(from, editor)
        };
        db.connect(Some(&upgrade)).unwrap();
        db.connect(Some(&upgrade)).unwrap();
        db.close().unwrap();

        // Reopen at the same version: stored schema already matches.
        let db = Database::durable("persistence", 1, &config).unwrap();
        db.connect(Some(&upgrade)).unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            sync_on_write: true,
        };

        {
            let db = Database::durable("persistence", 1, &config).unwrap();
            db.connect(Some(&entries_upgrade)).unwrap();
            db.set("entries", record("theme", "dark")).unwrap();
            db.close().unwrap();
        }

        {
            let db = Database::durable("persistence", 1, &config).unwrap();
            db.connect(Some(&entries_upgrade)).unwrap();
            assert_eq!(db.get("entries", "theme").unwrap(), Some(record("theme", "dark")));
            assert_eq!(db.open_count(), 1);
        }
    }

    #[test]
    fn test_version_below_stored_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            sync_on_write: true,
        };

        {
            let db = Database::durable("persistence", 2, &config).unwrap();
            db.connect(Some(&entries_upgrade)).unwrap();
            db.close().unwrap();
        }

        let db = Database::durable("persistence", 1, &config).unwrap();
        assert!(matches!(
            db.connect(None).unwrap_err(),
            Error::Connection(_)
        ));
    }

    #[test]
    fn test_upgrade_adds_index_and_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            sync_on_write: true,
        };

        {
            let db = Database::durable("persistence", 1, &config).unwrap();
            db.connect(Some(&entries_upgrade)).unwrap();
            db.set("entries", record("theme", "dark")).unwrap();
            db.close().unwrap();
        }

        // Version 2 declares the unique key index; existing records get
        // re-indexed under the new spec.
        let db = Database::durable("persistence", 2, &config).unwrap();
        let upgrade = |from: u32, editor: &mut SchemaEditor<'_>| {
            if from < 1 {
                entries_upgrade(from, editor)?;
            }
            editor.create_index(
                "entries",
                IndexSpec {
                    name: "key".to_string(),
                    key_paths: vec!["key".to_string()],
                    unique: true,
                },
            )
        };
        db.connect(Some(&upgrade)).unwrap();
        assert_eq!(db.get("entries", "theme").unwrap(), Some(record("theme", "dark")));
    }

    #[test]
    fn test_unknown_store_fails() {
        let db = Database::in_memory("cache", 1).unwrap();
        db.connect(Some(&entries_upgrade)).unwrap();
        assert!(matches!(
            db.get("missing", "k").unwrap_err(),
            Error::StoreNotFound(_)
        ));
    }

    #[test]
    fn test_close_then_reconnect_reopens() {
        let db = Database::in_memory("cache", 1).unwrap();
        db.connect(Some(&entries_upgrade)).unwrap();
        db.set("entries", record("k", "v")).unwrap();

        db.close().unwrap();
        assert!(matches!(
            db.get("entries", "k").unwrap_err(),
            Error::Connection(_)
        ));

        db.connect(Some(&entries_upgrade)).unwrap();
        assert_eq!(db.open_count(), 2);
        // Memory backend is ephemeral: nothing survives the close.
        assert_eq!(db.get("entries", "k").unwrap(), None);
    }

    #[test]
    fn test_delete_database_destroys_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            sync_on_write: true,
        };

        let db = Database::durable("persistence", 1, &config).unwrap();
        db.connect(Some(&entries_upgrade)).unwrap();
        db.set("entries", record("theme", "dark")).unwrap();
        db.close().unwrap();
        assert!(db.delete_database().unwrap());
        assert!(!dir.path().join("persistence").exists());

        // A fresh connect finds nothing.
        let db = Database::durable("persistence", 1, &config).unwrap();
        db.connect(Some(&entries_upgrade)).unwrap();
        assert_eq!(db.get("entries", "theme").unwrap(), None);
    }

    #[test]
    fn test_is_done_settles() {
        let db = Database::in_memory("cache", 1).unwrap();
        assert!(db.is_done());
        db.connect(Some(&entries_upgrade)).unwrap();
        db.set("entries", record("k", "v")).unwrap();
        assert!(db.is_done());
    }
}

//! The two concrete store facades.
//!
//! Both are thin pass-throughs to a privately owned [`Database`], pre-bound
//! to one store name, and both re-check the connection before every verb so
//! callers never have to sequence `connect` themselves.

use crate::database::{Database, EngineConfig};
use crate::schema::{IndexSpec, SchemaEditor, StoreOptions};
use kvstash_core::{Error, Query, Result, StoreFacade, Value};

/// Record field used as the primary key in both facades (and mirrored by
/// the persistence store's unique index)
pub const ENTRY_KEY_PATH: &str = "key";

/// Cache database name
pub const CACHE_DB_NAME: &str = "cache";
/// Cache object-store name
pub const CACHE_STORE_NAME: &str = "entries";
/// Cache schema version
pub const CACHE_DB_VERSION: u32 = 1;

/// Persistence database name
pub const PERSISTENCE_DB_NAME: &str = "persistence";
/// Persistence object-store name
pub const PERSISTENCE_STORE_NAME: &str = "entries";
/// Persistence schema version
pub const PERSISTENCE_DB_VERSION: u32 = 1;

fn entry_record(key: &str, value: Value) -> Value {
    Value::map([
        (ENTRY_KEY_PATH.to_string(), Value::from(key)),
        ("value".to_string(), value),
    ])
}

fn require_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Parameter("\"key\" must not be empty".to_string()));
    }
    Ok(())
}

/// Ephemeral cache store: in-memory backend, version 1, no secondary index.
///
/// Misses are not errors; callers treat `None` as "not cached".
pub struct CacheStore {
    db: Database,
}

impl CacheStore {
    /// Creates the cache store facade.
    pub fn new() -> Result<Self> {
        Ok(CacheStore {
            db: Database::in_memory(CACHE_DB_NAME, CACHE_DB_VERSION)?,
        })
    }

    fn upgrade(_from: u32, editor: &mut SchemaEditor<'_>) -> Result<()> {
        // Version 1
        editor.create_object_store(
            CACHE_STORE_NAME,
            StoreOptions {
                key_path: Some(ENTRY_KEY_PATH.to_string()),
            },
        )
    }

    /// The underlying database handle (diagnostics and tests).
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl StoreFacade for CacheStore {
    fn connect(&mut self) -> Result<bool> {
        self.db.connect(Some(&Self::upgrade))
    }

    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.connect()?;
        self.db.get(CACHE_STORE_NAME, key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<String> {
        require_key(key)?;
        self.connect()?;
        self.db.set(CACHE_STORE_NAME, entry_record(key, value))
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        require_key(key)?;
        self.connect()?;
        self.db.delete(CACHE_STORE_NAME, key)
    }

    fn get_all(&mut self, query: Option<Query>) -> Result<Vec<Value>> {
        self.connect()?;
        self.db.get_all(CACHE_STORE_NAME, query.as_ref())
    }

    fn clear(&mut self) -> Result<()> {
        self.connect()?;
        self.db.clear(CACHE_STORE_NAME)
    }

    fn close(&mut self) -> Result<bool> {
        self.db.close()
    }

    fn delete_database(&mut self) -> Result<bool> {
        self.db.close()?;
        self.db.delete_database()
    }
}

/// Durable persistence store: on-disk backend, version 1, and a unique
/// secondary index mirroring the key path as a guard against key-path
/// corruption.
pub struct PersistenceStore {
    db: Database,
}

impl PersistenceStore {
    /// Creates the persistence store facade over `config.data_dir`.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(PersistenceStore {
            db: Database::durable(PERSISTENCE_DB_NAME, PERSISTENCE_DB_VERSION, config)?,
        })
    }

    fn upgrade(_from: u32, editor: &mut SchemaEditor<'_>) -> Result<()> {
        // Version 1
        editor.create_object_store(
            PERSISTENCE_STORE_NAME,
            StoreOptions {
                key_path: Some(ENTRY_KEY_PATH.to_string()),
            },
        )?;
        editor.create_index(
            PERSISTENCE_STORE_NAME,
            IndexSpec {
                name: ENTRY_KEY_PATH.to_string(),
                key_paths: vec![ENTRY_KEY_PATH.to_string()],
                unique: true,
            },
        )
    }

    /// The underlying database handle (diagnostics and tests).
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl StoreFacade for PersistenceStore {
    fn connect(&mut self) -> Result<bool> {
        self.db.connect(Some(&Self::upgrade))
    }

    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.connect()?;
        self.db.get(PERSISTENCE_STORE_NAME, key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<String> {
        require_key(key)?;
        self.connect()?;
        self.db
            .set(PERSISTENCE_STORE_NAME, entry_record(key, value))
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        require_key(key)?;
        self.connect()?;
        self.db.delete(PERSISTENCE_STORE_NAME, key)
    }

    fn get_all(&mut self, query: Option<Query>) -> Result<Vec<Value>> {
        self.connect()?;
        self.db.get_all(PERSISTENCE_STORE_NAME, query.as_ref())
    }

    fn clear(&mut self) -> Result<()> {
        self.connect()?;
        self.db.clear(PERSISTENCE_STORE_NAME)
    }

    fn close(&mut self) -> Result<bool> {
        self.db.close()
    }

    fn delete_database(&mut self) -> Result<bool> {
        self.db.close()?;
        self.db.delete_database()
    }
}

//! # kvstash
//!
//! An embedded key-value storage subsystem with versioned schemas, a durable
//! on-disk backend, and off-thread store services.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kvstash::{CacheService, Value};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Spawn an in-memory cache service on its own worker thread
//!     let cache = CacheService::spawn()?;
//!
//!     // Store and fetch data; connection management is implicit
//!     cache.set("theme", Value::from("dark"))?;
//!     if let Some(theme) = cache.get("theme")? {
//!         println!("theme: {:?}", theme);
//!     }
//!
//!     // Remove data
//!     cache.delete("theme")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Durable storage
//!
//! ```rust,no_run
//! use kvstash::{EngineConfig, PersistenceService, Value};
//!
//! let config = EngineConfig {
//!     data_dir: "./kvstash-data".into(),
//!     sync_on_write: true,
//! };
//! let store = PersistenceService::spawn(config)?;
//!
//! // Data survives process restarts
//! store.set("session", Value::from("abc123"))?;
//! # Ok::<(), kvstash::Error>(())
//! ```
//!
//! ## Direct engine access
//!
//! The service layer is the recommended surface, but the engine is exported
//! for callers that want synchronous, same-thread access with their own
//! schema and upgrade logic:
//!
//! ```rust,no_run
//! use kvstash::{Database, StoreOptions, Value};
//!
//! let db = Database::in_memory("settings", 1)?;
//! db.connect(Some(&|_from, editor| {
//!     editor.create_object_store("prefs", StoreOptions { key_path: Some("key".into()) })
//! }))?;
//! # Ok::<(), kvstash::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod logging;

// Re-export core types
pub use kvstash_core::{
    Error, ErrorKind, ErrorPayload, Operation, Query, RequestEnvelope, RequestId,
    ResponseEnvelope, Result, StoreFacade, Value,
};

// Engine components
pub use kvstash_engine::{
    CacheStore, Database, DatabaseSchema, EngineConfig, IndexSpec, PersistenceStore, SchemaEditor,
    StoreOptions, StoreSpec, UpgradeFn,
};

// Remote layer
pub use kvstash_remote::{
    spawn_service, spawn_service_with_error_handler, PendingReply, RemoteStoreClient, StoreWorker,
    WorkerEvent,
};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The in-memory cache service.
///
/// Spawns a [`CacheStore`] on a worker thread and returns a client handle.
/// Records are ephemeral; everything is gone when the client is dropped.
pub struct CacheService;

impl CacheService {
    /// Spawns the cache service and returns its client.
    pub fn spawn() -> Result<RemoteStoreClient> {
        tracing::debug!("spawning cache service");
        Ok(spawn_service(CacheStore::new()?))
    }
}

/// The durable persistence service.
///
/// Spawns a [`PersistenceStore`] over `config.data_dir` on a worker thread
/// and returns a client handle. Records survive restarts.
pub struct PersistenceService;

impl PersistenceService {
    /// Spawns the persistence service and returns its client.
    pub fn spawn(config: EngineConfig) -> Result<RemoteStoreClient> {
        tracing::debug!(data_dir = %config.data_dir.display(), "spawning persistence service");
        Ok(spawn_service(PersistenceStore::new(&config)?))
    }
}

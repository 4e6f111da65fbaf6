//! # kvstash Storage Engine
//!
//! Schema-versioned object-store engine for kvstash, with an in-memory
//! backend for cache semantics and a durable on-disk backend for
//! persistence semantics.
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of kvstash.**
//!
//! Users should depend on the main `kvstash` crate instead, which provides
//! the stable public API. This crate's API may change without notice
//! between minor versions.
//!
//! ---
//!
//! The engine manages exactly one database per [`Database`] handle:
//!
//! - **Connection lifecycle**: `connect()` is memoized; concurrent callers
//!   share a single physical open.
//! - **Schema upgrades**: a version bump runs the upgrade callback exactly
//!   once inside an exclusive upgrade phase, through a [`SchemaEditor`].
//! - **CRUD**: every operation is its own single-store transaction; durable
//!   writes land via write-temp-then-rename.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod codec;
pub mod database;
pub mod facades;
pub mod manifest;
pub mod schema;

pub use database::{Database, EngineConfig, UpgradeFn};
pub use facades::{
    CacheStore, PersistenceStore, CACHE_DB_NAME, CACHE_DB_VERSION, CACHE_STORE_NAME,
    ENTRY_KEY_PATH, PERSISTENCE_DB_NAME, PERSISTENCE_DB_VERSION, PERSISTENCE_STORE_NAME,
};
pub use schema::{DatabaseSchema, IndexSpec, SchemaEditor, StoreOptions, StoreSpec};

/// Manifest file format version
pub const MANIFEST_FORMAT_VERSION: u16 = 1;

/// Object-store file format version
pub const STORE_FORMAT_VERSION: u16 = 1;

/// Magic numbers for file validation
pub mod magic {
    /// Manifest magic: "KSMF" (KvStash ManiFest)
    pub const MANIFEST: u32 = 0x4B534D46;

    /// Store file magic: "KSST" (KvStash STore)
    pub const STORE: u32 = 0x4B535354;
}

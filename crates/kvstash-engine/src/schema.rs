//! Object-store schemas and the upgrade-phase editor.

use kvstash_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique within its store
    pub name: String,
    /// Record fields the index key is built from
    pub key_paths: Vec<String>,
    /// Whether two records may share an index key
    pub unique: bool,
}

/// Options supplied when creating an object store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Record field used as the implicit primary key
    pub key_path: Option<String>,
}

/// The declared shape of one object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSpec {
    /// Store name, unique within the database
    pub name: String,
    /// Record field used as the implicit primary key
    pub key_path: Option<String>,
    /// Secondary indexes
    pub indexes: Vec<IndexSpec>,
}

/// The full declared schema of a database, persisted in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Current schema version (0 before the first upgrade)
    pub version: u32,
    /// All object stores, in creation order
    pub stores: Vec<StoreSpec>,
}

impl DatabaseSchema {
    /// An empty, never-upgraded schema.
    pub fn empty() -> Self {
        DatabaseSchema {
            version: 0,
            stores: Vec::new(),
        }
    }

    /// Looks up a store spec by name.
    pub fn store(&self, name: &str) -> Option<&StoreSpec> {
        self.stores.iter().find(|s| s.name == name)
    }
}

/// Mutable view of a schema handed to the upgrade callback.
///
/// Schema changes are only legal during the exclusive upgrade phase, and the
/// editor is the only path to them; outside an upgrade no store can be
/// created or dropped. Creating a store that already exists, or dropping one
/// that does not, fails loudly.
pub struct SchemaEditor<'a> {
    schema: &'a mut DatabaseSchema,
    dropped: Vec<String>,
}

impl<'a> SchemaEditor<'a> {
    pub(crate) fn new(schema: &'a mut DatabaseSchema) -> Self {
        SchemaEditor {
            schema,
            dropped: Vec::new(),
        }
    }

    /// Declares a new object store.
    pub fn create_object_store(&mut self, name: &str, options: StoreOptions) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Parameter("\"name\" must not be empty".to_string()));
        }
        if self.schema.store(name).is_some() {
            return Err(Error::StoreExists(name.to_string()));
        }

        self.schema.stores.push(StoreSpec {
            name: name.to_string(),
            key_path: options.key_path,
            indexes: Vec::new(),
        });
        Ok(())
    }

    /// Drops an existing object store and its records.
    pub fn delete_object_store(&mut self, name: &str) -> Result<()> {
        if self.schema.store(name).is_none() {
            return Err(Error::StoreNotFound(name.to_string()));
        }

        self.schema.stores.retain(|s| s.name != name);
        // A later create_object_store under the same name starts empty;
        // reconciliation discards the dropped store's data first.
        self.dropped.push(name.to_string());
        Ok(())
    }

    /// Declares a secondary index on an existing store.
    pub fn create_index(&mut self, store: &str, index: IndexSpec) -> Result<()> {
        let spec = self
            .schema
            .stores
            .iter_mut()
            .find(|s| s.name == store)
            .ok_or_else(|| Error::StoreNotFound(store.to_string()))?;

        if spec.indexes.iter().any(|i| i.name == index.name) {
            return Err(Error::Request(format!(
                "Index named \"{}\" already exists on store \"{}\"",
                index.name, store
            )));
        }

        spec.indexes.push(index);
        Ok(())
    }

    /// Stores dropped during this upgrade.
    pub(crate) fn dropped(&self) -> &[String] {
        &self.dropped
    }
}

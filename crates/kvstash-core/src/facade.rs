//! The seam between the storage engine and the remote layer.

use crate::envelope::Query;
use crate::error::Result;
use crate::value::Value;

/// The eight-verb contract shared by every concrete store.
///
/// A worker owns exactly one facade instance and is the only thread that
/// ever touches it, so the methods take `&mut self` and the trait only
/// requires `Send`.
pub trait StoreFacade: Send {
    /// Opens the store connection, or reuses the existing one.
    fn connect(&mut self) -> Result<bool>;

    /// Fetches the record stored under `key`, if any.
    fn get(&mut self, key: &str) -> Result<Option<Value>>;

    /// Inserts or updates the record for `key`; returns the primary key.
    fn set(&mut self, key: &str, value: Value) -> Result<String>;

    /// Removes the record for `key`. Removing an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Fetches all records, optionally filtered by `query`.
    fn get_all(&mut self, query: Option<Query>) -> Result<Vec<Value>>;

    /// Removes every record from the store.
    fn clear(&mut self) -> Result<()>;

    /// Releases the connection; a later [`connect`](Self::connect) reopens.
    fn close(&mut self) -> Result<bool>;

    /// Destroys all state for the backing database.
    fn delete_database(&mut self) -> Result<bool>;
}

//! Manifest - the durable record of a database's schema.
//!
//! The manifest file carries the schema version and every store spec, so a
//! reopened database knows which store files to load and whether the caller
//! is asking for an upgrade. It shares the framed encoding of the store
//! files (magic, format version, bincode payload, crc32).

use crate::codec;
use crate::schema::DatabaseSchema;
use crate::{magic, MANIFEST_FORMAT_VERSION};
use kvstash_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Manifest file name
const MANIFEST_FILE: &str = "MANIFEST";

/// Path of the manifest under a database directory.
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Loads the schema from `dir`, or `None` when no manifest exists yet.
///
/// A manifest that exists but fails validation is a connection-level
/// failure: the database cannot be opened safely against unknown state.
pub fn load(dir: &Path) -> Result<Option<DatabaseSchema>> {
    let path = manifest_path(dir);
    if !path.exists() {
        return Ok(None);
    }

    let bytes = std::fs::read(&path)?;
    let schema = codec::decode_framed(magic::MANIFEST, MANIFEST_FORMAT_VERSION, &bytes)
        .map_err(|e| Error::Connection(format!("Manifest unreadable: {}", e)))?;
    Ok(Some(schema))
}

/// Persists `schema` atomically to `dir`.
pub fn save(dir: &Path, schema: &DatabaseSchema, sync: bool) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let frame = codec::encode_framed(magic::MANIFEST, MANIFEST_FORMAT_VERSION, schema)?;
    codec::write_atomic(&manifest_path(dir), &frame, sync)
}

//! File framing for durable state.
//!
//! Frame format (binary):
//! [magic: u32 LE] [format version: u16 LE] [length: u32 LE] [payload bytes] [crc32: u32 LE]
//!
//! The CRC covers the payload bytes. A frame that fails magic, version,
//! length, or CRC validation is rejected rather than partially decoded.

use crc32fast::Hasher;
use kvstash_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Frame header size: magic + format version + payload length.
const HEADER_LEN: usize = 4 + 2 + 4;

/// Encodes `payload` into a framed byte buffer.
pub fn encode_framed<T: Serialize>(magic: u32, version: u16, payload: &T) -> Result<Vec<u8>> {
    let payload_bytes = bincode::serialize(payload)
        .map_err(|e| Error::Serialization(format!("Failed to serialize payload: {}", e)))?;

    let mut hasher = Hasher::new();
    hasher.update(&payload_bytes);
    let crc = hasher.finalize();

    let mut frame = Vec::with_capacity(HEADER_LEN + payload_bytes.len() + 4);
    frame.extend_from_slice(&magic.to_le_bytes());
    frame.extend_from_slice(&version.to_le_bytes());
    frame.extend_from_slice(&(payload_bytes.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload_bytes);
    frame.extend_from_slice(&crc.to_le_bytes());

    Ok(frame)
}

/// Decodes a framed byte buffer, validating magic, version, and CRC.
pub fn decode_framed<T: DeserializeOwned>(magic: u32, version: u16, data: &[u8]) -> Result<T> {
    if data.len() < HEADER_LEN + 4 {
        return Err(Error::Serialization("Incomplete file frame".to_string()));
    }

    let actual_magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if actual_magic != magic {
        return Err(Error::Serialization(format!(
            "Bad magic: expected {:#010x}, got {:#010x}",
            magic, actual_magic
        )));
    }

    let actual_version = u16::from_le_bytes([data[4], data[5]]);
    if actual_version != version {
        return Err(Error::Serialization(format!(
            "Unsupported format version: expected {}, got {}",
            version, actual_version
        )));
    }

    let length = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
    let total = HEADER_LEN + length + 4;
    if data.len() < total {
        return Err(Error::Serialization(format!(
            "Truncated frame: expected {} bytes, got {}",
            total,
            data.len()
        )));
    }

    let payload_bytes = &data[HEADER_LEN..HEADER_LEN + length];

    let crc_offset = HEADER_LEN + length;
    let expected_crc = u32::from_le_bytes([
        data[crc_offset],
        data[crc_offset + 1],
        data[crc_offset + 2],
        data[crc_offset + 3],
    ]);

    let mut hasher = Hasher::new();
    hasher.update(payload_bytes);
    let actual_crc = hasher.finalize();

    if actual_crc != expected_crc {
        return Err(Error::Serialization(format!(
            "CRC mismatch: expected {}, got {}",
            expected_crc, actual_crc
        )));
    }

    bincode::deserialize(payload_bytes)
        .map_err(|e| Error::Serialization(format!("Failed to deserialize payload: {}", e)))
}

/// Writes `bytes` to `path` atomically: write to a temp sibling, optionally
/// fsync, then rename over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8], sync: bool) -> Result<()> {
    let tmp = path.with_extension("tmp");

    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        if sync {
            file.sync_all()?;
        }
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        count: u32,
    }

    fn sample() -> Payload {
        Payload {
            name: "entries".to_string(),
            count: 7,
        }
    }

    #[test]
    fn test_frame_round_trip() {
        let encoded = encode_framed(0xABCD0001, 1, &sample()).unwrap();
        let decoded: Payload = decode_framed(0xABCD0001, 1, &encoded).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let encoded = encode_framed(0xABCD0001, 1, &sample()).unwrap();
        let result: Result<Payload> = decode_framed(0xABCD0002, 1, &encoded);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let encoded = encode_framed(0xABCD0001, 1, &sample()).unwrap();
        let result: Result<Payload> = decode_framed(0xABCD0001, 2, &encoded);
        assert!(result.is_err());
    }

    #[test]
    fn test_corruption_detected() {
        let mut encoded = encode_framed(0xABCD0001, 1, &sample()).unwrap();
        let mid = encoded.len() / 2;
        encoded[mid] ^= 0xFF;

        let result: Result<Payload> = decode_framed(0xABCD0001, 1, &encoded);
        assert!(result.is_err());
    }

    #[test]
    fn test_truncation_detected() {
        let encoded = encode_framed(0xABCD0001, 1, &sample()).unwrap();
        let result: Result<Payload> = decode_framed(0xABCD0001, 1, &encoded[..encoded.len() - 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvs");

        write_atomic(&path, b"first", true).unwrap();
        write_atomic(&path, b"second", true).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!path.with_extension("tmp").exists());
    }
}

//! Payload encoding for cache entries
//!
//! Values are stored either as JSON text or as raw bytes. Payloads at or
//! above the configured threshold are gzip-compressed; the format and
//! compression are recorded next to the blob so reads can reverse them.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use super::{CacheError, CacheResult, CachedValue};

/// Stored in place of falsy values so "cached but empty" differs from "absent"
pub const EMPTY_SENTINEL: &str = "**empty**";

pub(crate) const FORMAT_JSON: &str = "json";
pub(crate) const FORMAT_BYTES: &str = "bytes";
pub(crate) const COMPRESSION_NONE: &str = "none";
pub(crate) const COMPRESSION_GZIP: &str = "gzip";

/// An encoded payload ready to be written
#[derive(Debug)]
pub(crate) struct Encoded {
    pub payload: Vec<u8>,
    pub format: &'static str,
    pub compression: &'static str,
}

/// Encodes a value, compressing when the serialized form reaches `gzip_threshold`
pub(crate) fn encode(value: &CachedValue, gzip_threshold: usize) -> CacheResult<Encoded> {
    let (raw, format) = match value {
        CachedValue::Json(json) => (serde_json::to_vec(json)?, FORMAT_JSON),
        CachedValue::Bytes(bytes) => (bytes.clone(), FORMAT_BYTES),
    };

    if raw.len() < gzip_threshold {
        return Ok(Encoded {
            payload: raw,
            format,
            compression: COMPRESSION_NONE,
        });
    }

    match gzip(&raw) {
        Ok(compressed) => Ok(Encoded {
            payload: compressed,
            format,
            compression: COMPRESSION_GZIP,
        }),
        Err(e) => {
            warn!("gzip failed, storing {} bytes uncompressed: {}", raw.len(), e);
            Ok(Encoded {
                payload: raw,
                format,
                compression: COMPRESSION_NONE,
            })
        }
    }
}

/// Reverses [`encode`] given the recorded format and compression
pub(crate) fn decode(payload: &[u8], format: &str, compression: &str) -> CacheResult<CachedValue> {
    let raw = match compression {
        COMPRESSION_NONE => payload.to_vec(),
        COMPRESSION_GZIP => gunzip(payload)?,
        other => return Err(CacheError::Corrupt(format!("unknown compression '{}'", other))),
    };

    match format {
        FORMAT_JSON => Ok(CachedValue::Json(serde_json::from_slice(&raw)?)),
        FORMAT_BYTES => Ok(CachedValue::Bytes(raw)),
        other => Err(CacheError::Corrupt(format!("unknown format '{}'", other))),
    }
}

fn gzip(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

fn gunzip(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(payload);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

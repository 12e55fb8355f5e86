//! Serialization of the rules index into a compact, versioned binary
//! format, and validation on the way back in.
//!
//! Layout: a 4-byte magic, a format version byte, the gzip-compressed
//! MessagePack encoding of [`RulesIndexData`], and a trailing 8-byte
//! little-endian seahash of the compressed payload. A blob failing any of
//! these checks is rejected before deserialization is attempted.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rmp_serde as rmps;

use crate::index::RulesIndexData;
use crate::utils::buffer_checksum;

const INDEX_DAT_MAGIC: [u8; 4] = *b"AFRI";
const INDEX_DAT_VERSION: u8 = 1;
const CHECKSUM_SIZE: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("msgpack encoding failed")]
    RmpSerde(#[from] rmps::encode::Error),
    #[error("compression failed")]
    Gz(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializationError {
    #[error("bad index magic")]
    BadMagic,
    #[error("unsupported index format version {0}")]
    UnsupportedFormatVersion(u8),
    #[error("index buffer truncated")]
    Truncated,
    #[error("index checksum mismatch")]
    ChecksumMismatch,
    #[error("msgpack decoding failed")]
    RmpSerde(#[from] rmps::decode::Error),
}

/// A serialized index ready to be written out, with the checksum that was
/// appended to it.
pub struct SerializedIndex {
    pub bytes: Vec<u8>,
    pub checksum: String,
}

pub fn serialize_index(index: &RulesIndexData) -> Result<SerializedIndex, SerializationError> {
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    rmps::encode::write(&mut gz, index)?;
    let payload = gz.finish()?;

    let checksum = buffer_checksum(&payload);
    let payload_hash = seahash::hash(&payload);

    let mut bytes =
        Vec::with_capacity(INDEX_DAT_MAGIC.len() + 1 + payload.len() + CHECKSUM_SIZE);
    bytes.extend_from_slice(&INDEX_DAT_MAGIC);
    bytes.push(INDEX_DAT_VERSION);
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&payload_hash.to_le_bytes());

    Ok(SerializedIndex { bytes, checksum })
}

pub fn deserialize_index(serialized: &[u8]) -> Result<RulesIndexData, DeserializationError> {
    let header_size = INDEX_DAT_MAGIC.len() + 1;
    if serialized.len() < header_size + CHECKSUM_SIZE {
        return Err(DeserializationError::Truncated);
    }
    if serialized[..INDEX_DAT_MAGIC.len()] != INDEX_DAT_MAGIC {
        return Err(DeserializationError::BadMagic);
    }
    let version = serialized[INDEX_DAT_MAGIC.len()];
    if version != INDEX_DAT_VERSION {
        return Err(DeserializationError::UnsupportedFormatVersion(version));
    }

    let payload = &serialized[header_size..serialized.len() - CHECKSUM_SIZE];
    let mut recorded_hash = [0u8; CHECKSUM_SIZE];
    recorded_hash.copy_from_slice(&serialized[serialized.len() - CHECKSUM_SIZE..]);
    if seahash::hash(payload) != u64::from_le_bytes(recorded_hash) {
        return Err(DeserializationError::ChecksumMismatch);
    }

    let index = rmps::decode::from_read(GzDecoder::new(payload))?;
    Ok(index)
}

#[cfg(test)]
#[path = "../tests/unit/data_format.rs"]
mod unit_tests;

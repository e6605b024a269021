//! # Persistence Format
//!
//! Binary serialization for scene documents.
//!
//! Format: Header (5 bytes) + postcard-serialized [`SceneDocument`].
//! - 4 bytes: Magic ("GWRK")
//! - 1 byte: Version
//!
//! ## Validation
//!
//! Size and header are checked before the payload is parsed:
//! - Maximum payload size limit (`MAX_PERSISTENCE_PAYLOAD_SIZE`)
//! - Header validation before payload parsing
//! - Graceful error handling for corrupted data

use super::document::{SceneDocument, document_to_scene, scene_to_document};
use crate::registry::DependencyResolver;
use crate::{GateworkError, Scene, primitives};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed size of an encoded document.
///
/// Validated before deserialization so corrupted input cannot drive large
/// allocations.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 64 * 1024 * 1024; // 64 MB

/// Length of the header.
pub const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes all document data.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), GateworkError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(GateworkError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(GateworkError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GateworkError> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Err(GateworkError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `bytes` start with the binary document magic.
#[must_use]
pub fn is_binary_document(bytes: &[u8]) -> bool {
    bytes.starts_with(primitives::MAGIC_BYTES)
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Encode a document (header + payload).
pub fn document_to_bytes(document: &SceneDocument) -> Result<Vec<u8>, GateworkError> {
    let header = PersistenceHeader::new();
    let payload = postcard::to_stdvec(document)
        .map_err(|e| GateworkError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Decode a document.
///
/// Checks, in order, before touching the payload:
/// 1. Minimum data size (header must be present)
/// 2. Maximum data size
/// 3. Header magic bytes and version
pub fn document_from_bytes(bytes: &[u8]) -> Result<SceneDocument, GateworkError> {
    if bytes.len() < HEADER_SIZE {
        return Err(GateworkError::DeserializationError(format!(
            "Data too short: minimum {HEADER_SIZE} bytes required"
        )));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(GateworkError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        GateworkError::DeserializationError(format!("Failed to decode scene document: {}", e))
    })
}

/// Encode a scene in the binary format.
pub fn scene_to_bytes(scene: &Scene) -> Result<Vec<u8>, GateworkError> {
    document_to_bytes(&scene_to_document(scene))
}

/// Decode a binary scene, resolving its dependencies through `resolver`.
pub fn scene_from_bytes<R: DependencyResolver + ?Sized>(
    bytes: &[u8],
    resolver: &mut R,
) -> Result<Scene, GateworkError> {
    document_to_scene(document_from_bytes(bytes)?, resolver)
}

/// BLAKE3 hash of the binary encoding, as lowercase hex.
///
/// Equal scenes hash equal: the encoding only depends on the document.
#[cfg(feature = "crypto-hash")]
pub fn document_hash(scene: &Scene) -> Result<String, GateworkError> {
    let bytes = scene_to_bytes(scene)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================

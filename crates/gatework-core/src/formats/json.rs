//! # JSON Documents
//!
//! Human-readable scene files. The JSON image is the same [`SceneDocument`]
//! the binary format carries, pretty-printed with `serde_json`.

use super::document::{SceneDocument, document_to_scene, scene_to_document};
use super::persistence::{MAX_PERSISTENCE_PAYLOAD_SIZE, document_from_bytes, is_binary_document};
use crate::registry::DependencyResolver;
use crate::{GateworkError, Scene};

/// Encode a document as pretty JSON.
pub fn document_to_json(document: &SceneDocument) -> Result<String, GateworkError> {
    serde_json::to_string_pretty(document)
        .map_err(|e| GateworkError::SerializationError(e.to_string()))
}

/// Decode a JSON document.
pub fn document_from_json(json: &str) -> Result<SceneDocument, GateworkError> {
    if json.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(GateworkError::DeserializationError(format!(
            "Document size {} bytes exceeds maximum allowed {} bytes",
            json.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }
    serde_json::from_str(json).map_err(|e| GateworkError::DeserializationError(e.to_string()))
}

/// Encode a scene as pretty JSON.
pub fn scene_to_json(scene: &Scene) -> Result<String, GateworkError> {
    document_to_json(&scene_to_document(scene))
}

/// Decode a JSON scene, resolving its dependencies through `resolver`.
pub fn scene_from_json<R: DependencyResolver + ?Sized>(
    json: &str,
    resolver: &mut R,
) -> Result<Scene, GateworkError> {
    document_to_scene(document_from_json(json)?, resolver)
}

/// Decode a document in either format, detected from the leading bytes.
pub fn decode_document(bytes: &[u8]) -> Result<SceneDocument, GateworkError> {
    if is_binary_document(bytes) {
        return document_from_bytes(bytes);
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| GateworkError::DeserializationError(format!("not a scene document: {e}")))?;
    document_from_json(text)
}

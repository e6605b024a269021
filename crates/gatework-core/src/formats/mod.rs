//! # Scene Formats
//!
//! Pure transformations between scenes and bytes. File I/O is left to the
//! caller (the CLI, or a [`ComponentStore`](crate::ComponentStore)).
//!
//! - `document`: the serializable [`SceneDocument`] and scene conversion
//! - `persistence`: binary format, magic/version header + postcard
//! - `json`: pretty JSON, and format detection for either encoding

mod document;
mod json;
mod persistence;

pub use document::{
    ComponentDoc, ContextDoc, GateDoc, InputDoc, OutputDoc, RelationDoc, SceneDocument,
    document_to_scene, scene_to_document,
};
pub use json::{decode_document, document_from_json, document_to_json, scene_from_json, scene_to_json};
#[cfg(feature = "crypto-hash")]
pub use persistence::document_hash;
pub use persistence::{
    HEADER_SIZE, MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, document_from_bytes,
    document_to_bytes, is_binary_document, scene_from_bytes, scene_to_bytes,
};

//! # gatework-core
//!
//! The deterministic logic-circuit engine for Gatework - THE LOGIC.
//!
//! A [`Scene`] holds gates, inputs, outputs and component nodes wired by
//! relations. Every structural edit propagates tri-state values
//! (`False`/`True`/`Disabled`) downstream before the call returns. A scene
//! with a [`ComponentContext`] can itself be used as a black-box component
//! inside other scenes, with bit-packed multi-bit I/O.
//!
//! ## Layout
//!
//! - `types`, `node`, `relation`, `context`, `scene`: the engine
//! - `dependency`, `registry`, `storage`: the component library
//! - `formats`: JSON and binary scene documents
//! - `tabs`: an owned set of open scenes for front ends
//!
//! ## Architectural Constraints
//!
//! - Synchronous: propagation runs to completion inside each call
//! - Deterministic: `BTreeMap`/`BTreeSet` only, integer time, no floats
//! - No async, no network dependencies (pure Rust)
//! - Logging through `tracing` macros; the subscriber belongs to the binary

// =============================================================================
// MODULES
// =============================================================================

pub mod context;
pub mod dependency;
pub mod formats;
pub mod node;
pub mod primitives;
pub mod registry;
pub mod relation;
pub mod scene;
pub mod storage;
pub mod tabs;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Direction, GateType, GateworkError, Layout, NodeId, NodeType, RelId, SockId, State};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use context::ComponentContext;
pub use node::{Component, Gate, Input, NodeRef, Output, SceneNode};
pub use relation::Rel;
pub use scene::{Dependency, Scene, SceneMeta};

// =============================================================================
// RE-EXPORTS: Component Library
// =============================================================================

pub use dependency::{DependencyKey, DependencySource};
pub use registry::{DependencyResolver, NoDependencies, Registry, RemoteSource};
pub use storage::{ComponentStore, DirectoryStore, MemoryStore, RedbStore};
pub use tabs::{Tab, TabManager};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    PersistenceHeader, SceneDocument, decode_document, document_to_scene, scene_from_bytes,
    scene_from_json, scene_to_bytes, scene_to_document, scene_to_json,
};

//! # Core Type Definitions
//!
//! This module contains the value types shared by every part of the engine:
//! - Node and relation identifiers (`NodeId`, `NodeType`, `RelId`, `SockId`)
//! - The tri-state signal value (`State`)
//! - Gate kinds and their boolean reductions (`GateType`)
//! - Presentation data carried opaquely by nodes (`Layout`, `Direction`)
//! - Error types (`GateworkError`)
//!
//! ## Determinism Guarantees
//!
//! All identifier types implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and iterate in a stable order.

use crate::primitives::UNASSIGNED_INDEX;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Socket number on a node or on a component boundary.
pub type SockId = u8;

// =============================================================================
// NODE IDENTIFIERS
// =============================================================================

/// The storage a [`NodeId`] addresses.
///
/// `ComponentInput` and `ComponentOutput` are virtual: they address the
/// boundary sockets of the scene's own component context, not a node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Gate,
    Component,
    Input,
    Output,
    ComponentInput,
    ComponentOutput,
}

impl NodeType {
    /// Whether this type addresses the component boundary rather than a slot.
    #[must_use]
    pub const fn is_virtual(self) -> bool {
        matches!(self, Self::ComponentInput | Self::ComponentOutput)
    }

    /// Whether nodes of this type can drive relations.
    #[must_use]
    pub const fn is_source(self) -> bool {
        !matches!(self, Self::Output | Self::ComponentOutput)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gate => "gate",
            Self::Component => "component",
            Self::Input => "input",
            Self::Output => "output",
            Self::ComponentInput => "component-input",
            Self::ComponentOutput => "component-output",
        };
        f.write_str(name)
    }
}

/// Typed handle into a scene's node storage.
///
/// Uniqueness is per `(ty, index)`. For virtual types the index is the
/// boundary socket number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub index: u16,
    pub ty: NodeType,
}

impl NodeId {
    /// Create a node identifier.
    #[must_use]
    pub const fn new(ty: NodeType, index: u16) -> Self {
        Self { index, ty }
    }

    /// An identifier of the given type that points nowhere.
    #[must_use]
    pub const fn unassigned(ty: NodeType) -> Self {
        Self {
            index: UNASSIGNED_INDEX,
            ty,
        }
    }

    /// Whether the index is the unassigned sentinel.
    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.index == UNASSIGNED_INDEX
    }

    /// The index as a slot position.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ty, self.index)
    }
}

/// Identifier of a relation (wire). Zero is never assigned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RelId(pub u32);

impl RelId {
    /// The reserved "no relation" id.
    pub const NONE: Self = Self(0);

    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether this is the reserved zero id.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel#{}", self.0)
    }
}

// =============================================================================
// SIGNAL STATE
// =============================================================================

/// Value carried by a relation or cached by a node.
///
/// `Disabled` means "not driven": some required upstream socket is empty.
/// It is distinct from `False` and is never coerced into it by propagation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum State {
    False,
    True,
    #[default]
    Disabled,
}

impl State {
    /// Boolean interpretation: only `True` is true.
    #[must_use]
    pub const fn is_true(self) -> bool {
        matches!(self, Self::True)
    }

    /// Whether the value is `Disabled`.
    #[must_use]
    pub const fn is_disabled(self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// `Some(bool)` for driven values, `None` for `Disabled`.
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::False => Some(false),
            Self::True => Some(true),
            Self::Disabled => None,
        }
    }

    /// Read bit `bit` of a packed word as a state.
    #[must_use]
    pub const fn from_bit(word: u64, bit: usize) -> Self {
        if (word >> bit) & 1 == 1 {
            Self::True
        } else {
            Self::False
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::False => "0",
            Self::True => "1",
            Self::Disabled => "-",
        };
        f.write_str(s)
    }
}

// =============================================================================
// GATE KINDS
// =============================================================================

/// Logic function of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GateType {
    Not,
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
}

impl GateType {
    /// All gate kinds, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Not,
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Nand,
        Self::Nor,
        Self::Xnor,
    ];

    /// Whether the arity of this gate can change.
    #[must_use]
    pub const fn is_variadic(self) -> bool {
        !matches!(self, Self::Not)
    }

    /// Number of inputs a freshly created gate has.
    #[must_use]
    pub const fn default_arity(self) -> usize {
        if self.is_variadic() { 2 } else { 1 }
    }

    /// Apply the gate's boolean reduction.
    ///
    /// NOT negates its first input; the others reduce over all inputs.
    pub fn reduce(self, inputs: impl IntoIterator<Item = bool>) -> bool {
        let mut inputs = inputs.into_iter();
        match self {
            Self::Not => !inputs.next().unwrap_or(false),
            Self::And => inputs.all(|v| v),
            Self::Or => inputs.any(|v| v),
            Self::Xor => inputs.filter(|v| *v).count() % 2 == 1,
            Self::Nand => !inputs.all(|v| v),
            Self::Nor => !inputs.any(|v| v),
            Self::Xnor => inputs.filter(|v| *v).count() % 2 == 0,
        }
    }

    /// Lowercase name, used by the CLI and in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Nand => "nand",
            Self::Nor => "nor",
            Self::Xnor => "xnor",
        }
    }
}

impl fmt::Display for GateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for GateType {
    type Err = GateworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or(GateworkError::InvalidGate)
    }
}

// =============================================================================
// LAYOUT (presentation only)
// =============================================================================

/// Facing of a node on the editor canvas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Direction {
    #[default]
    Right,
    Down,
    Left,
    Up,
}

/// Position and orientation of a node.
///
/// The engine never reads this; it is stored and serialized as-is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Layout {
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
}

impl Layout {
    /// Create a layout at the given position facing right.
    #[must_use]
    pub const fn at(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            direction: Direction::Right,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors returned by the Gatework engine.
///
/// Every structural operation (connect, disconnect, component binding,
/// document loading) reports failures through this type. Internal
/// consistency violations are not represented here: they are logged and
/// asserted in debug builds.
#[derive(Debug, Error)]
pub enum GateworkError {
    /// The node does not exist, or the socket is out of range for it.
    #[error("Invalid node id: {0}")]
    InvalidNodeId(NodeId),

    /// The relation id is zero, out of range, or already taken.
    #[error("Invalid relation id: {0}")]
    InvalidRelId(RelId),

    /// The relation id is in range but no relation carries it.
    #[error("Relation not found: {0}")]
    RelNotFound(RelId),

    /// The source node type cannot drive a relation.
    #[error("Invalid source type: {0}")]
    InvalidFromType(NodeType),

    /// The destination node type has no input sockets.
    #[error("Invalid destination type: {0}")]
    InvalidToType(NodeType),

    /// The scene has no component boundary.
    #[error("Scene is not a component")]
    NotAComponent,

    /// The destination socket already has a driver.
    #[error("Socket {sock} of {node} is already connected")]
    AlreadyConnected { node: NodeId, sock: SockId },

    /// The socket has no driver.
    #[error("Socket {sock} of {node} is not connected")]
    NotConnected { node: NodeId, sock: SockId },

    /// No component is stored under the dependency string.
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// A component node references a dependency the scene does not own.
    #[error("Undefined dependency: {0}")]
    UndefinedDependency(String),

    /// The dependency string does not follow `author/name/version`.
    #[error("Invalid dependency format: {0}")]
    InvalidDependencyFormat(String),

    /// Loading the dependency requires loading itself.
    #[error("Dependency cycle through: {0}")]
    DependencyCycle(String),

    /// The gate arity cannot change in the requested direction.
    #[error("Cannot change arity of {kind} gate with {arity} inputs")]
    GateArity { kind: GateType, arity: usize },

    /// Too many boundary sockets, or too many dependencies.
    #[error("Socket limit exceeded: {0}")]
    SocketLimit(usize),

    /// A node record in a document is malformed.
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// A gate record has an unknown kind or an impossible arity.
    #[error("Invalid gate")]
    InvalidGate,

    /// A document is structurally inconsistent.
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    #[error("Scene name exceeds {max} bytes")]
    NameTooLong { max: usize },

    #[error("Scene author exceeds {max} bytes")]
    AuthorTooLong { max: usize },

    #[error("Scene description exceeds {max} bytes")]
    DescriptionTooLong { max: usize },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

//! # Node Variants
//!
//! The four concrete node kinds a scene stores: `Gate`, `Input`, `Output`
//! and `Component`. The set is closed; the scene dispatches on
//! [`NodeType`] with a `match`.
//!
//! Nodes only hold their own wiring (relation ids per socket) and their
//! cached output. Evaluation reads relation values through the owning
//! [`Scene`](crate::Scene), which is also the only place values change.

use crate::primitives::{MAX_GATE_ARITY, MIN_GATE_ARITY};
use crate::{GateType, Layout, NodeType, RelId, SockId, State};

// =============================================================================
// SCENE NODE TRAIT
// =============================================================================

pub(crate) mod sealed {
    /// Slot storage access, reachable only from inside the crate.
    pub trait Storage: Sized {
        fn slots(scene: &crate::Scene) -> &Vec<Option<Self>>;
        fn slots_mut(scene: &mut crate::Scene) -> &mut Vec<Option<Self>>;
    }
}

use sealed::Storage;

/// A concrete node kind with its own slot sequence inside a scene.
///
/// Implemented for the four storable kinds so that
/// [`Scene::add_node`](crate::Scene::add_node) can be generic.
pub trait SceneNode: Storage {
    /// The node type tag for ids of this kind.
    const KIND: NodeType;

    /// Relations driving this node's input sockets (empty sockets skipped).
    fn driving_relations(&self) -> Vec<RelId>;

    /// Relations this node drives, across all output sockets.
    fn driven_relations(&self) -> Vec<RelId>;

    /// Presentation data of this node.
    fn layout(&self) -> Layout;
}

// =============================================================================
// GATE
// =============================================================================

/// A logic gate with one output socket fanning out to many relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    pub(crate) kind: GateType,
    pub(crate) inputs: Vec<Option<RelId>>,
    pub(crate) output: Vec<RelId>,
    pub(crate) value: State,
    pub layout: Layout,
}

impl Gate {
    /// Create a gate with its default arity (1 for NOT, 2 otherwise).
    #[must_use]
    pub fn new(kind: GateType) -> Self {
        Self::with_arity(kind, kind.default_arity())
    }

    /// Create a gate with `arity` empty input sockets.
    ///
    /// The arity is clamped into the range the gate kind supports.
    #[must_use]
    pub fn with_arity(kind: GateType, arity: usize) -> Self {
        let arity = if kind.is_variadic() {
            arity.clamp(MIN_GATE_ARITY, MAX_GATE_ARITY)
        } else {
            1
        };
        Self {
            kind,
            inputs: vec![None; arity],
            output: Vec::new(),
            value: State::Disabled,
            layout: Layout::default(),
        }
    }

    /// Set the presentation layout, builder style.
    #[must_use]
    pub fn at(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// The gate's logic function.
    #[must_use]
    pub fn kind(&self) -> GateType {
        self.kind
    }

    /// Number of input sockets.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.inputs.len()
    }

    /// Driver of an input socket.
    #[must_use]
    pub fn input(&self, sock: SockId) -> Option<RelId> {
        self.inputs.get(sock as usize).copied().flatten()
    }

    /// Relations driven by the output.
    #[must_use]
    pub fn fan_out(&self) -> &[RelId] {
        &self.output
    }

    /// Whether every input socket has a driver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inputs.iter().all(Option::is_some)
    }

    /// Cached output value; `Disabled` when an input socket is empty.
    #[must_use]
    pub fn get(&self) -> State {
        if self.is_connected() {
            self.value
        } else {
            State::Disabled
        }
    }

    /// Whether another input can be added.
    #[must_use]
    pub fn can_increment(&self) -> bool {
        self.kind.is_variadic() && self.inputs.len() < MAX_GATE_ARITY
    }

    /// Whether the last input can be removed.
    #[must_use]
    pub fn can_decrement(&self) -> bool {
        self.kind.is_variadic() && self.inputs.len() > MIN_GATE_ARITY
    }
}

// =============================================================================
// INPUT
// =============================================================================

/// A user-driven or clock-driven signal source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Input {
    pub(crate) value: bool,
    pub(crate) frequency: Option<u8>,
    pub(crate) output: Vec<RelId>,
    pub layout: Layout,
}

impl Input {
    /// Create a switch input with the given initial value.
    #[must_use]
    pub fn new(value: bool) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// Create a timer input that toggles every `period` ticks.
    ///
    /// A zero period yields a plain switch.
    #[must_use]
    pub fn timer(period: u8) -> Self {
        Self {
            frequency: (period != 0).then_some(period),
            ..Self::default()
        }
    }

    /// Set the presentation layout, builder style.
    #[must_use]
    pub fn at(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> bool {
        self.value
    }

    /// Timer period in ticks, if this input is a timer.
    #[must_use]
    pub fn frequency(&self) -> Option<u8> {
        self.frequency
    }

    /// Relations driven by this input.
    #[must_use]
    pub fn fan_out(&self) -> &[RelId] {
        &self.output
    }

    /// Inputs are never disabled.
    #[must_use]
    pub fn get(&self) -> State {
        State::from(self.value)
    }

    /// Timer value at `frame`: low for the first period, then alternating.
    pub(crate) fn phase_at(period: u8, frame: u64) -> bool {
        (frame / u64::from(period.max(1))) % 2 == 1
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

/// An observation point with a single input socket. Leaf of the signal graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Output {
    pub(crate) driver: Option<RelId>,
    pub(crate) value: State,
    pub layout: Layout,
}

impl Output {
    /// Create an undriven output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the presentation layout, builder style.
    #[must_use]
    pub fn at(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Relation driving socket 0.
    #[must_use]
    pub fn driver(&self) -> Option<RelId> {
        self.driver
    }

    /// Whether socket 0 has a driver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.driver.is_some()
    }

    /// Cached value; `Disabled` when undriven.
    #[must_use]
    pub fn get(&self) -> State {
        if self.is_connected() {
            self.value
        } else {
            State::Disabled
        }
    }
}

// =============================================================================
// COMPONENT
// =============================================================================

/// A usage site of a dependency scene, evaluated as a black box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Component {
    pub(crate) dependency: Option<u8>,
    pub(crate) inputs: Vec<Option<RelId>>,
    pub(crate) outputs: Vec<Vec<RelId>>,
    pub(crate) packed_output: u64,
    pub layout: Layout,
}

impl Component {
    /// Create a component node not yet bound to a dependency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the presentation layout, builder style.
    #[must_use]
    pub fn at(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Index into the owning scene's dependency list.
    #[must_use]
    pub fn dependency(&self) -> Option<u8> {
        self.dependency
    }

    /// Number of input sockets.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output sockets.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Driver of an input socket.
    #[must_use]
    pub fn input(&self, sock: SockId) -> Option<RelId> {
        self.inputs.get(sock as usize).copied().flatten()
    }

    /// Relations driven by an output socket.
    #[must_use]
    pub fn fan_out(&self, sock: SockId) -> &[RelId] {
        self.outputs.get(sock as usize).map_or(&[], Vec::as_slice)
    }

    /// Last packed output computed by the dependency.
    #[must_use]
    pub fn packed_output(&self) -> u64 {
        self.packed_output
    }

    /// Whether the component is bound and every input socket has a driver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.dependency.is_some() && self.inputs.iter().all(Option::is_some)
    }

    /// Value of output socket `sock`; `Disabled` when not connected.
    #[must_use]
    pub fn get(&self, sock: SockId) -> State {
        if self.is_connected() && (sock as usize) < self.outputs.len() {
            State::from_bit(self.packed_output, sock as usize)
        } else {
            State::Disabled
        }
    }
}

// =============================================================================
// RELATION BOOKKEEPING
// =============================================================================

impl Storage for Gate {
    fn slots(scene: &crate::Scene) -> &Vec<Option<Self>> {
        &scene.gates
    }

    fn slots_mut(scene: &mut crate::Scene) -> &mut Vec<Option<Self>> {
        &mut scene.gates
    }
}

impl SceneNode for Gate {
    const KIND: NodeType = NodeType::Gate;

    fn driving_relations(&self) -> Vec<RelId> {
        self.inputs.iter().flatten().copied().collect()
    }

    fn driven_relations(&self) -> Vec<RelId> {
        self.output.clone()
    }

    fn layout(&self) -> Layout {
        self.layout
    }
}

impl Storage for Input {
    fn slots(scene: &crate::Scene) -> &Vec<Option<Self>> {
        &scene.inputs
    }

    fn slots_mut(scene: &mut crate::Scene) -> &mut Vec<Option<Self>> {
        &mut scene.inputs
    }
}

impl SceneNode for Input {
    const KIND: NodeType = NodeType::Input;

    fn driving_relations(&self) -> Vec<RelId> {
        Vec::new()
    }

    fn driven_relations(&self) -> Vec<RelId> {
        self.output.clone()
    }

    fn layout(&self) -> Layout {
        self.layout
    }
}

impl Storage for Output {
    fn slots(scene: &crate::Scene) -> &Vec<Option<Self>> {
        &scene.outputs
    }

    fn slots_mut(scene: &mut crate::Scene) -> &mut Vec<Option<Self>> {
        &mut scene.outputs
    }
}

impl SceneNode for Output {
    const KIND: NodeType = NodeType::Output;

    fn driving_relations(&self) -> Vec<RelId> {
        self.driver.into_iter().collect()
    }

    fn driven_relations(&self) -> Vec<RelId> {
        Vec::new()
    }

    fn layout(&self) -> Layout {
        self.layout
    }
}

impl Storage for Component {
    fn slots(scene: &crate::Scene) -> &Vec<Option<Self>> {
        &scene.components
    }

    fn slots_mut(scene: &mut crate::Scene) -> &mut Vec<Option<Self>> {
        &mut scene.components
    }
}

impl SceneNode for Component {
    const KIND: NodeType = NodeType::Component;

    fn driving_relations(&self) -> Vec<RelId> {
        self.inputs.iter().flatten().copied().collect()
    }

    fn driven_relations(&self) -> Vec<RelId> {
        self.outputs.iter().flatten().copied().collect()
    }

    fn layout(&self) -> Layout {
        self.layout
    }
}

// =============================================================================
// NODE SUMMARY
// =============================================================================

/// Borrowed view over any stored node, for callers that iterate a scene.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Gate(&'a Gate),
    Input(&'a Input),
    Output(&'a Output),
    Component(&'a Component),
}

impl NodeRef<'_> {
    /// Whether every required input socket has a driver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        match self {
            Self::Gate(g) => g.is_connected(),
            Self::Input(_) => true,
            Self::Output(o) => o.is_connected(),
            Self::Component(c) => c.is_connected(),
        }
    }

    /// Output value of socket `sock` (socket 0 for single-output kinds).
    #[must_use]
    pub fn get(&self, sock: SockId) -> State {
        match self {
            Self::Gate(g) => g.get(),
            Self::Input(i) => i.get(),
            Self::Output(o) => o.get(),
            Self::Component(c) => c.get(sock),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

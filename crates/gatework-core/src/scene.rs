//! # Scene
//!
//! The owning container of a circuit: node slots, relations, the optional
//! component boundary, and the dependency scenes used by component nodes.
//!
//! ## Propagation
//!
//! [`Scene::signal`] is the single propagation primitive. It writes a value
//! into a relation and, when the value is stale, re-evaluates the
//! destination node, which in turn signals its own outgoing relations. The
//! cascade is plain synchronous recursion and runs to completion before the
//! public call that triggered it returns.
//!
//! Recursion is bounded by [`MAX_PROPAGATION_DEPTH`]. An oscillating loop
//! hits the bound; the rest of the cascade is dropped and the scene reports
//! `is_stable() == false` until the next top-level operation.
//!
//! ## Storage
//!
//! Nodes live in four dense slot sequences, one per kind. Removing a node
//! nulls its slot so indices held elsewhere stay valid; the next node of the
//! same kind reuses the first null slot.

use crate::node::{NodeRef, SceneNode};
use crate::primitives::{
    MAX_AUTHOR_LENGTH, MAX_DEPENDENCIES, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH,
    MAX_PROPAGATION_DEPTH, TICK_NANOS, UNASSIGNED_INDEX,
};
use crate::{
    Component, ComponentContext, Gate, GateworkError, Input, NodeId, NodeType, Output, Rel, RelId,
    SockId, State,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

// =============================================================================
// METADATA
// =============================================================================

/// Descriptive fields of a scene, each length-capped.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SceneMeta {
    pub name: String,
    pub author: String,
    pub description: String,
    pub version: u32,
}

impl SceneMeta {
    /// Check every field against its length cap.
    pub fn validate(&self) -> Result<(), GateworkError> {
        if self.name.len() > MAX_NAME_LENGTH {
            return Err(GateworkError::NameTooLong {
                max: MAX_NAME_LENGTH,
            });
        }
        if self.author.len() > MAX_AUTHOR_LENGTH {
            return Err(GateworkError::AuthorTooLong {
                max: MAX_AUTHOR_LENGTH,
            });
        }
        if self.description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(GateworkError::DescriptionTooLong {
                max: MAX_DESCRIPTION_LENGTH,
            });
        }
        Ok(())
    }
}

/// A component definition owned by value by the scene that uses it.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Dependency string the scene was resolved from.
    pub key: String,
    /// The component scene itself.
    pub scene: Scene,
}

// =============================================================================
// SCENE
// =============================================================================

/// A circuit: nodes, relations, and optionally a component boundary.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub(crate) meta: SceneMeta,
    pub(crate) gates: Vec<Option<Gate>>,
    pub(crate) inputs: Vec<Option<Input>>,
    pub(crate) outputs: Vec<Option<Output>>,
    pub(crate) components: Vec<Option<Component>>,
    pub(crate) rels: BTreeMap<RelId, Rel>,
    pub(crate) last_rel: u32,
    /// Lowest slot per kind that may be free.
    free_hints: [usize; 4],
    pub(crate) context: Option<ComponentContext>,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) frame: u64,
    /// Sub-tick remainder carried between `run` calls.
    pending_nanos: u64,
    depth: usize,
    unstable: bool,
}

/// Log an internal consistency failure.
///
/// These indicate a bug in the engine rather than bad input, so they are
/// asserted in debug builds and skipped over in release builds.
#[cold]
pub(crate) fn invariant_violated(what: std::fmt::Arguments<'_>) {
    tracing::error!(target: "gatework_core::scene", "scene invariant violated: {}", what);
    debug_assert!(false, "scene invariant violated: {what}");
}

const fn hint_slot(kind: NodeType) -> usize {
    match kind {
        NodeType::Gate => 0,
        NodeType::Input => 1,
        NodeType::Output => 2,
        _ => 3,
    }
}

impl Scene {
    /// Create an empty scene without a component boundary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty component scene with the given boundary.
    pub fn component(input_count: usize, output_count: usize) -> Result<Self, GateworkError> {
        let mut scene = Self::new();
        scene.setup_context(input_count, output_count)?;
        Ok(scene)
    }

    // =========================================================================
    // METADATA
    // =========================================================================

    /// Scene metadata.
    #[must_use]
    pub fn meta(&self) -> &SceneMeta {
        &self.meta
    }

    /// Replace all metadata at once, validating length caps.
    pub fn set_meta(&mut self, meta: SceneMeta) -> Result<(), GateworkError> {
        meta.validate()?;
        self.meta = meta;
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), GateworkError> {
        let name = name.into();
        if name.len() > MAX_NAME_LENGTH {
            return Err(GateworkError::NameTooLong {
                max: MAX_NAME_LENGTH,
            });
        }
        self.meta.name = name;
        Ok(())
    }

    pub fn set_author(&mut self, author: impl Into<String>) -> Result<(), GateworkError> {
        let author = author.into();
        if author.len() > MAX_AUTHOR_LENGTH {
            return Err(GateworkError::AuthorTooLong {
                max: MAX_AUTHOR_LENGTH,
            });
        }
        self.meta.author = author;
        Ok(())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), GateworkError> {
        let description = description.into();
        if description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(GateworkError::DescriptionTooLong {
                max: MAX_DESCRIPTION_LENGTH,
            });
        }
        self.meta.description = description;
        Ok(())
    }

    pub fn set_version(&mut self, version: u32) {
        self.meta.version = version;
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Whether this scene has a component boundary.
    #[must_use]
    pub fn is_component(&self) -> bool {
        self.context.is_some()
    }

    /// The component boundary, if any.
    #[must_use]
    pub fn context(&self) -> Option<&ComponentContext> {
        self.context.as_ref()
    }

    /// Whether the last top-level operation settled within the depth bound.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        !self.unstable
    }

    /// Current frame of the scene clock.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Highest relation id handed out so far.
    #[must_use]
    pub fn last_rel_id(&self) -> RelId {
        RelId(self.last_rel)
    }

    #[must_use]
    pub fn gate(&self, id: NodeId) -> Option<&Gate> {
        self.slot::<Gate>(id)
    }

    #[must_use]
    pub fn input(&self, id: NodeId) -> Option<&Input> {
        self.slot::<Input>(id)
    }

    #[must_use]
    pub fn output(&self, id: NodeId) -> Option<&Output> {
        self.slot::<Output>(id)
    }

    #[must_use]
    pub fn component_node(&self, id: NodeId) -> Option<&Component> {
        self.slot::<Component>(id)
    }

    /// Borrowed view of any stored node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        match id.ty {
            NodeType::Gate => self.gate(id).map(NodeRef::Gate),
            NodeType::Input => self.input(id).map(NodeRef::Input),
            NodeType::Output => self.output(id).map(NodeRef::Output),
            NodeType::Component => self.component_node(id).map(NodeRef::Component),
            NodeType::ComponentInput | NodeType::ComponentOutput => None,
        }
    }

    /// Whether the node exists (virtual ids exist while their socket does).
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        match id.ty {
            NodeType::ComponentInput => self
                .context
                .as_ref()
                .is_some_and(|ctx| id.slot() < ctx.input_count()),
            NodeType::ComponentOutput => self
                .context
                .as_ref()
                .is_some_and(|ctx| id.slot() < ctx.output_count()),
            _ => self.node(id).is_some(),
        }
    }

    /// All stored nodes in deterministic order (kind, then index).
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, NodeRef<'_>)> + '_ {
        fn ids<T>(
            kind: NodeType,
            slots: &[Option<T>],
        ) -> impl Iterator<Item = (NodeId, &T)> + '_ {
            slots.iter().enumerate().filter_map(move |(i, slot)| {
                slot.as_ref().map(|node| (NodeId::new(kind, i as u16), node))
            })
        }
        ids(NodeType::Gate, &self.gates)
            .map(|(id, n)| (id, NodeRef::Gate(n)))
            .chain(ids(NodeType::Component, &self.components).map(|(id, n)| (id, NodeRef::Component(n))))
            .chain(ids(NodeType::Input, &self.inputs).map(|(id, n)| (id, NodeRef::Input(n))))
            .chain(ids(NodeType::Output, &self.outputs).map(|(id, n)| (id, NodeRef::Output(n))))
    }

    /// Ids of all stored nodes of one kind.
    #[must_use]
    pub fn ids_of(&self, kind: NodeType) -> Vec<NodeId> {
        self.nodes()
            .map(|(id, _)| id)
            .filter(|id| id.ty == kind)
            .collect()
    }

    /// Number of stored (non-null) nodes across all kinds.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    #[must_use]
    pub fn relation(&self, id: RelId) -> Option<&Rel> {
        self.rels.get(&id)
    }

    /// All relations ordered by id.
    pub fn relations(&self) -> impl Iterator<Item = &Rel> {
        self.rels.values()
    }

    #[must_use]
    pub fn relation_count(&self) -> usize {
        self.rels.len()
    }

    /// Output value of `sock` on `id`.
    ///
    /// Returns `Disabled` for unknown nodes, unconnected gates, outputs and
    /// components, and for undriven boundary sockets.
    #[must_use]
    pub fn get(&self, id: NodeId, sock: SockId) -> State {
        match id.ty {
            NodeType::ComponentInput | NodeType::ComponentOutput => self
                .context
                .as_ref()
                .map_or(State::Disabled, |ctx| ctx.get_value(id)),
            _ => self.node(id).map_or(State::Disabled, |n| n.get(sock)),
        }
    }

    /// Whether every required input socket of `id` has a driver.
    #[must_use]
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.is_connected())
    }

    /// Relation currently driving input socket `sock` of `to`.
    #[must_use]
    pub fn driver_of(&self, to: NodeId, sock: SockId) -> Option<RelId> {
        match to.ty {
            NodeType::Gate => self.gate(to)?.input(sock),
            NodeType::Component => self.component_node(to)?.input(sock),
            NodeType::Output if sock == 0 => self.output(to)?.driver(),
            NodeType::ComponentOutput => self.context.as_ref()?.driver(to.index as SockId),
            _ => None,
        }
    }

    /// Whether any input, or any input of a dependency, is a timer.
    #[must_use]
    pub fn has_timers(&self) -> bool {
        self.inputs.iter().flatten().any(|i| i.frequency.is_some())
            || self.dependencies.iter().any(|d| d.scene.has_timers())
    }

    fn slot<T: SceneNode>(&self, id: NodeId) -> Option<&T> {
        if id.ty != T::KIND {
            return None;
        }
        T::slots(self).get(id.slot()).and_then(Option::as_ref)
    }

    fn slot_mut<T: SceneNode>(&mut self, id: NodeId) -> Result<&mut T, GateworkError> {
        if id.ty != T::KIND {
            return Err(GateworkError::InvalidNodeId(id));
        }
        T::slots_mut(self)
            .get_mut(id.slot())
            .and_then(Option::as_mut)
            .ok_or(GateworkError::InvalidNodeId(id))
    }

    // =========================================================================
    // NODE LIFECYCLE
    // =========================================================================

    /// Store a node, reusing the first null slot of its kind.
    pub fn add_node<T: SceneNode>(&mut self, node: T) -> Result<NodeId, GateworkError> {
        let hint = self.free_hints[hint_slot(T::KIND)];
        let slots = T::slots_mut(self);
        let index = match slots.iter().skip(hint).position(Option::is_none) {
            Some(offset) => hint + offset,
            None => slots.len(),
        };
        if index >= UNASSIGNED_INDEX as usize {
            return Err(GateworkError::InvalidNodeId(NodeId::unassigned(T::KIND)));
        }
        if index == slots.len() {
            slots.push(Some(node));
        } else {
            slots[index] = Some(node);
        }
        self.free_hints[hint_slot(T::KIND)] = index + 1;
        Ok(NodeId::new(T::KIND, index as u16))
    }

    /// Append a slot without reuse. Document loading keeps indices as stored.
    pub(crate) fn place<T: SceneNode>(&mut self, node: Option<T>) {
        T::slots_mut(self).push(node);
    }

    /// Recompute the free-slot hints after bulk placement.
    pub(crate) fn reset_free_hints(&mut self) {
        fn first_free<T>(slots: &[Option<T>]) -> usize {
            slots.iter().position(Option::is_none).unwrap_or(slots.len())
        }
        self.free_hints = [
            first_free(&self.gates),
            first_free(&self.inputs),
            first_free(&self.outputs),
            first_free(&self.components),
        ];
    }

    /// Disconnect every relation touching `id`, then null its slot.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GateworkError> {
        self.begin_propagation();
        match id.ty {
            NodeType::Gate => self.remove_slot::<Gate>(id),
            NodeType::Input => self.remove_slot::<Input>(id),
            NodeType::Output => self.remove_slot::<Output>(id),
            NodeType::Component => self.remove_slot::<Component>(id),
            NodeType::ComponentInput | NodeType::ComponentOutput => {
                Err(GateworkError::InvalidNodeId(id))
            }
        }
    }

    fn remove_slot<T: SceneNode>(&mut self, id: NodeId) -> Result<(), GateworkError> {
        let node = self
            .slot::<T>(id)
            .ok_or(GateworkError::InvalidNodeId(id))?;
        let touching: BTreeSet<RelId> = node
            .driven_relations()
            .into_iter()
            .chain(node.driving_relations())
            .collect();
        for rel in touching {
            self.disconnect_inner(rel)?;
        }
        T::slots_mut(self)[id.slot()] = None;
        let hint = &mut self.free_hints[hint_slot(T::KIND)];
        *hint = (*hint).min(id.slot());
        Ok(())
    }

    // =========================================================================
    // CONNECTION PROTOCOL
    // =========================================================================

    /// Connect `from`/`from_sock` to `to`/`to_sock` under the next free id.
    ///
    /// The new relation is evaluated immediately, so downstream nodes see a
    /// correct value without an extra trigger.
    pub fn connect(
        &mut self,
        to: NodeId,
        to_sock: SockId,
        from: NodeId,
        from_sock: SockId,
    ) -> Result<RelId, GateworkError> {
        let id = self
            .last_rel
            .checked_add(1)
            .map(RelId)
            .ok_or(GateworkError::InvalidRelId(RelId(u32::MAX)))?;
        self.connect_with_id(id, to, to_sock, from, from_sock)?;
        Ok(id)
    }

    /// Connect under an explicit relation id (used when loading documents).
    ///
    /// Every check runs before any mutation; a rejected connection leaves
    /// the scene untouched. For boundary pseudo-nodes the socket is the node
    /// index and the socket argument is ignored. A relation from a boundary
    /// input carries that socket's current bit; connecting does not reset
    /// the execution input.
    pub fn connect_with_id(
        &mut self,
        id: RelId,
        to: NodeId,
        to_sock: SockId,
        from: NodeId,
        from_sock: SockId,
    ) -> Result<(), GateworkError> {
        self.begin_propagation();
        self.check_connection(id, to, to_sock, from, from_sock)?;

        let from_sock = if from.ty == NodeType::ComponentInput {
            from.index as SockId
        } else {
            from_sock
        };
        let to_sock = if to.ty == NodeType::ComponentOutput {
            to.index as SockId
        } else {
            to_sock
        };

        self.claim_socket(id, to, to_sock);
        self.rels
            .insert(id, Rel::new(id, to, to_sock, from, from_sock));
        self.last_rel = self.last_rel.max(id.value());
        self.attach_source(id, from, from_sock);
        Ok(())
    }

    fn check_connection(
        &self,
        id: RelId,
        to: NodeId,
        to_sock: SockId,
        from: NodeId,
        from_sock: SockId,
    ) -> Result<(), GateworkError> {
        if id.is_none() || self.rels.contains_key(&id) {
            return Err(GateworkError::InvalidRelId(id));
        }

        // Source side.
        match from.ty {
            NodeType::Output | NodeType::ComponentOutput => {
                return Err(GateworkError::InvalidFromType(from.ty));
            }
            NodeType::Gate | NodeType::Input => {
                if self.node(from).is_none() {
                    return Err(GateworkError::InvalidNodeId(from));
                }
            }
            NodeType::Component => {
                let component = self
                    .component_node(from)
                    .ok_or(GateworkError::InvalidNodeId(from))?;
                if component.dependency.is_none()
                    || from_sock as usize >= component.output_count()
                {
                    return Err(GateworkError::InvalidNodeId(from));
                }
            }
            NodeType::ComponentInput => {
                let ctx = self.context.as_ref().ok_or(GateworkError::NotAComponent)?;
                if from.slot() >= ctx.input_count() {
                    return Err(GateworkError::InvalidNodeId(from));
                }
            }
        }

        // Destination side.
        let occupied = match to.ty {
            NodeType::Gate => {
                let gate = self.gate(to).ok_or(GateworkError::InvalidNodeId(to))?;
                gate.inputs
                    .get(to_sock as usize)
                    .ok_or(GateworkError::InvalidNodeId(to))?
                    .is_some()
            }
            NodeType::Component => {
                let component = self
                    .component_node(to)
                    .ok_or(GateworkError::InvalidNodeId(to))?;
                component
                    .inputs
                    .get(to_sock as usize)
                    .ok_or(GateworkError::InvalidNodeId(to))?
                    .is_some()
            }
            NodeType::Output => {
                let output = self.output(to).ok_or(GateworkError::InvalidNodeId(to))?;
                if to_sock != 0 {
                    return Err(GateworkError::InvalidNodeId(to));
                }
                output.is_connected()
            }
            NodeType::ComponentOutput => {
                let ctx = self.context.as_ref().ok_or(GateworkError::NotAComponent)?;
                ctx.outputs
                    .get(to.slot())
                    .ok_or(GateworkError::InvalidNodeId(to))?
                    .is_some()
            }
            NodeType::Input | NodeType::ComponentInput => {
                return Err(GateworkError::InvalidToType(to.ty));
            }
        };
        if occupied {
            let sock = if to.ty == NodeType::ComponentOutput {
                to.index as SockId
            } else {
                to_sock
            };
            return Err(GateworkError::AlreadyConnected { node: to, sock });
        }
        Ok(())
    }

    /// Write `id` into the destination slot. Only called after checks pass.
    fn claim_socket(&mut self, id: RelId, to: NodeId, to_sock: SockId) {
        let slot = match to.ty {
            NodeType::Gate => self
                .slot_mut::<Gate>(to)
                .ok()
                .and_then(|g| g.inputs.get_mut(to_sock as usize)),
            NodeType::Component => self
                .slot_mut::<Component>(to)
                .ok()
                .and_then(|c| c.inputs.get_mut(to_sock as usize)),
            NodeType::Output => self.slot_mut::<Output>(to).ok().map(|o| &mut o.driver),
            NodeType::ComponentOutput => self
                .context
                .as_mut()
                .and_then(|ctx| ctx.outputs.get_mut(to_sock as usize)),
            NodeType::Input | NodeType::ComponentInput => None,
        };
        match slot {
            Some(slot) => *slot = Some(id),
            None => invariant_violated(format_args!("cannot claim socket {to_sock} of {to}")),
        }
    }

    /// Register `id` as outgoing from its source and evaluate the source.
    fn attach_source(&mut self, id: RelId, from: NodeId, from_sock: SockId) {
        let fan_out = match from.ty {
            NodeType::Gate => self.slot_mut::<Gate>(from).ok().map(|g| &mut g.output),
            NodeType::Input => self.slot_mut::<Input>(from).ok().map(|i| &mut i.output),
            NodeType::Component => self
                .slot_mut::<Component>(from)
                .ok()
                .and_then(|c| c.outputs.get_mut(from_sock as usize)),
            NodeType::ComponentInput => self
                .context
                .as_mut()
                .and_then(|ctx| ctx.inputs.get_mut(from_sock as usize)),
            NodeType::Output | NodeType::ComponentOutput => None,
        };
        let Some(fan_out) = fan_out else {
            invariant_violated(format_args!("cannot attach {id} to {from}"));
            return;
        };
        fan_out.push(id);

        if from.ty == NodeType::ComponentInput {
            let value = self
                .context
                .as_ref()
                .map_or(State::Disabled, |ctx| ctx.get_value(from));
            self.propagate(id, value);
        } else {
            self.on_signal(from);
        }
    }

    /// Remove a relation and re-evaluate its destination.
    pub fn disconnect(&mut self, id: RelId) -> Result<(), GateworkError> {
        self.begin_propagation();
        self.disconnect_inner(id)
    }

    /// Disconnect whatever drives input socket `sock` of `to`.
    pub fn disconnect_socket(&mut self, to: NodeId, sock: SockId) -> Result<RelId, GateworkError> {
        if !self.contains(to) {
            return Err(GateworkError::InvalidNodeId(to));
        }
        let rel = self
            .driver_of(to, sock)
            .ok_or(GateworkError::NotConnected { node: to, sock })?;
        self.disconnect(rel)?;
        Ok(rel)
    }

    pub(crate) fn disconnect_inner(&mut self, id: RelId) -> Result<(), GateworkError> {
        if id.is_none() || id.value() > self.last_rel {
            return Err(GateworkError::InvalidRelId(id));
        }
        let rel = *self.rels.get(&id).ok_or(GateworkError::RelNotFound(id))?;

        self.detach_source(&rel);
        self.release_socket(&rel);
        self.rels.remove(&id);
        Ok(())
    }

    fn detach_source(&mut self, rel: &Rel) {
        let fan_out = match rel.from.ty {
            NodeType::Gate => self.slot_mut::<Gate>(rel.from).ok().map(|g| &mut g.output),
            NodeType::Input => self.slot_mut::<Input>(rel.from).ok().map(|i| &mut i.output),
            NodeType::Component => self
                .slot_mut::<Component>(rel.from)
                .ok()
                .and_then(|c| c.outputs.get_mut(rel.from_sock as usize)),
            NodeType::ComponentInput => self
                .context
                .as_mut()
                .and_then(|ctx| ctx.inputs.get_mut(rel.from_sock as usize)),
            NodeType::Output | NodeType::ComponentOutput => None,
        };
        match fan_out {
            Some(fan_out) => fan_out.retain(|r| *r != rel.id),
            None => invariant_violated(format_args!("{} has no source {}", rel.id, rel.from)),
        }
    }

    fn release_socket(&mut self, rel: &Rel) {
        let slot = match rel.to.ty {
            NodeType::Gate => self
                .slot_mut::<Gate>(rel.to)
                .ok()
                .and_then(|g| g.inputs.get_mut(rel.to_sock as usize)),
            NodeType::Component => self
                .slot_mut::<Component>(rel.to)
                .ok()
                .and_then(|c| c.inputs.get_mut(rel.to_sock as usize)),
            NodeType::Output => self.slot_mut::<Output>(rel.to).ok().map(|o| &mut o.driver),
            NodeType::ComponentOutput => self
                .context
                .as_mut()
                .and_then(|ctx| ctx.outputs.get_mut(rel.to_sock as usize)),
            NodeType::Input | NodeType::ComponentInput => None,
        };
        match slot {
            Some(slot) if *slot == Some(rel.id) => *slot = None,
            _ => {
                invariant_violated(format_args!("{} does not drive {}", rel.id, rel.to));
                return;
            }
        }

        if rel.to.ty == NodeType::ComponentOutput {
            // Only the packed output can change; internal wiring is untouched.
            self.refresh_context_output();
        } else {
            self.on_signal(rel.to);
        }
    }

    // =========================================================================
    // PROPAGATION
    // =========================================================================

    /// Push `value` into relation `id` and propagate if it is stale.
    ///
    /// Unknown ids and the zero id are ignored. The value is overwritten the
    /// next time the relation's source re-evaluates.
    pub fn signal(&mut self, id: RelId, value: State) {
        self.begin_propagation();
        if self.rels.contains_key(&id) {
            self.propagate(id, value);
        }
    }

    /// Re-evaluate a node and signal its outgoing relations.
    pub fn evaluate(&mut self, id: NodeId) -> Result<(), GateworkError> {
        if self.node(id).is_none() {
            return Err(GateworkError::InvalidNodeId(id));
        }
        self.begin_propagation();
        self.on_signal(id);
        Ok(())
    }

    pub(crate) fn begin_propagation(&mut self) {
        if self.depth == 0 {
            self.unstable = false;
        }
    }

    fn mark_unstable(&mut self, at: RelId) {
        if !self.unstable {
            tracing::warn!(
                target: "gatework_core::scene",
                "propagation exceeded depth {} at {}; circuit does not settle",
                MAX_PROPAGATION_DEPTH,
                at
            );
        }
        self.unstable = true;
    }

    pub(crate) fn propagate(&mut self, id: RelId, value: State) {
        if id.is_none() || self.unstable {
            return;
        }
        let Some(rel) = self.rels.get_mut(&id) else {
            invariant_violated(format_args!("signal on missing {id}"));
            return;
        };
        if !rel.is_stale(value) {
            return;
        }
        rel.value = value;
        let to = rel.to;

        if self.depth >= MAX_PROPAGATION_DEPTH {
            self.mark_unstable(id);
            return;
        }
        self.depth += 1;
        if to.ty == NodeType::ComponentOutput {
            if let Some(ctx) = self.context.as_mut() {
                ctx.set_value(to, value);
            }
        } else {
            self.on_signal(to);
        }
        self.depth -= 1;
    }

    /// Overwrite relation values and re-derive every cached node value
    /// from them without propagating.
    ///
    /// Runs after document loading: replaying connections in id order can
    /// settle a feedback loop in a different state than the one saved.
    pub(crate) fn restore_relation_values(
        &mut self,
        values: impl IntoIterator<Item = (RelId, State)>,
    ) {
        for (id, value) in values {
            match self.rels.get_mut(&id) {
                Some(rel) => rel.value = value,
                None => invariant_violated(format_args!("restoring missing {id}")),
            }
        }

        for index in 0..self.gates.len() {
            let Some(gate) = self.gates[index].as_ref() else {
                continue;
            };
            let value = if gate.is_connected() {
                let bits: Vec<bool> = gate
                    .inputs
                    .iter()
                    .flatten()
                    .map(|rel| self.relation_bit(*rel))
                    .collect();
                State::from(gate.kind.reduce(bits))
            } else {
                State::Disabled
            };
            if let Some(gate) = self.gates[index].as_mut() {
                gate.value = value;
            }
        }

        for index in 0..self.outputs.len() {
            let Some(output) = self.outputs[index].as_ref() else {
                continue;
            };
            let value = output
                .driver
                .and_then(|rel| self.rels.get(&rel))
                .map_or(State::Disabled, |rel| rel.value);
            if let Some(output) = self.outputs[index].as_mut() {
                output.value = value;
            }
        }

        // A component socket with fan-out carries its bit on every relation.
        for index in 0..self.components.len() {
            let Some(component) = self.components[index].as_ref() else {
                continue;
            };
            let mut packed = component.packed_output;
            for (sock, rels) in component.outputs.iter().enumerate() {
                let Some(value) = rels.first().and_then(|rel| self.rels.get(rel)).map(|r| r.value)
                else {
                    continue;
                };
                if value.is_true() {
                    packed |= 1 << sock;
                } else {
                    packed &= !(1u64 << sock);
                }
            }
            if let Some(component) = self.components[index].as_mut() {
                component.packed_output = packed;
            }
        }

        self.refresh_context_output();
    }

    pub(crate) fn on_signal(&mut self, id: NodeId) {
        match id.ty {
            NodeType::Gate => self.eval_gate(id),
            NodeType::Input => self.eval_input(id),
            NodeType::Output => self.eval_output(id),
            NodeType::Component => self.eval_component(id),
            NodeType::ComponentInput | NodeType::ComponentOutput => {
                invariant_violated(format_args!("{id} is not evaluable"));
            }
        }
    }

    /// Boolean reading of a relation feeding a fully connected node.
    fn relation_bit(&self, id: RelId) -> bool {
        match self.rels.get(&id).map(|r| r.value) {
            Some(State::True) => true,
            Some(State::False) => false,
            Some(State::Disabled) => {
                tracing::debug!(target: "gatework_core::scene", "{} is disabled on a connected socket", id);
                false
            }
            None => {
                invariant_violated(format_args!("socket driven by missing {id}"));
                false
            }
        }
    }

    fn eval_gate(&mut self, id: NodeId) {
        let Some(gate) = self.gate(id) else {
            invariant_violated(format_args!("evaluating missing {id}"));
            return;
        };
        let value = if gate.is_connected() {
            let bits: Vec<bool> = gate
                .inputs
                .iter()
                .flatten()
                .map(|rel| self.relation_bit(*rel))
                .collect();
            State::from(gate.kind.reduce(bits))
        } else {
            State::Disabled
        };
        let fan_out = gate.output.clone();
        if let Ok(gate) = self.slot_mut::<Gate>(id) {
            gate.value = value;
        }
        for rel in fan_out {
            self.propagate(rel, value);
        }
    }

    fn eval_input(&mut self, id: NodeId) {
        let Some(input) = self.input(id) else {
            invariant_violated(format_args!("evaluating missing {id}"));
            return;
        };
        let value = input.get();
        let fan_out = input.output.clone();
        for rel in fan_out {
            self.propagate(rel, value);
        }
    }

    fn eval_output(&mut self, id: NodeId) {
        let Some(output) = self.output(id) else {
            invariant_violated(format_args!("evaluating missing {id}"));
            return;
        };
        let value = output
            .driver
            .and_then(|rel| self.rels.get(&rel))
            .map_or(State::Disabled, |rel| rel.value);
        if let Ok(output) = self.slot_mut::<Output>(id) {
            output.value = value;
        }
    }

    /// Run the dependency on the packed inputs and fan the result out.
    ///
    /// An unconnected component keeps its last packed output but signals
    /// `Disabled` on every output socket.
    fn eval_component(&mut self, id: NodeId) {
        let Some(component) = self.component_node(id) else {
            invariant_violated(format_args!("evaluating missing {id}"));
            return;
        };
        let dependency = component.dependency.filter(|_| component.is_connected());
        let packed_input = match dependency {
            Some(_) => component
                .inputs
                .iter()
                .flatten()
                .enumerate()
                .filter(|(_, rel)| self.relation_bit(**rel))
                .fold(0u64, |acc, (sock, _)| acc | (1 << sock)),
            None => 0,
        };
        let fan_out = component.outputs.clone();
        let frame = self.frame;

        let packed_output = match dependency {
            Some(index) => match self.dependencies.get_mut(index as usize) {
                Some(dep) => {
                    let packed = dep.scene.run_context(packed_input, frame);
                    let settled = dep.scene.is_stable();
                    if !settled {
                        self.unstable = true;
                    }
                    Some(packed)
                }
                None => {
                    invariant_violated(format_args!("{id} uses missing dependency {index}"));
                    None
                }
            },
            None => None,
        };

        if let (Some(packed), Ok(component)) = (packed_output, self.slot_mut::<Component>(id)) {
            component.packed_output = packed;
        }
        for (sock, rels) in fan_out.into_iter().enumerate() {
            let value = packed_output.map_or(State::Disabled, |packed| State::from_bit(packed, sock));
            for rel in rels {
                self.propagate(rel, value);
            }
        }
    }

    // =========================================================================
    // INPUTS AND TIMERS
    // =========================================================================

    /// Set an input and propagate.
    pub fn set_input(&mut self, id: NodeId, value: bool) -> Result<(), GateworkError> {
        self.slot_mut::<Input>(id)?.value = value;
        self.begin_propagation();
        self.on_signal(id);
        Ok(())
    }

    /// Flip an input and propagate. Returns the new value.
    pub fn toggle_input(&mut self, id: NodeId) -> Result<bool, GateworkError> {
        let input = self.slot_mut::<Input>(id)?;
        input.value = !input.value;
        let value = input.value;
        self.begin_propagation();
        self.on_signal(id);
        Ok(value)
    }

    /// Make an input a timer with the given period, or a switch for `None`/0.
    ///
    /// Does not signal; the clock picks the change up on the next tick.
    pub fn set_frequency(&mut self, id: NodeId, period: Option<u8>) -> Result<(), GateworkError> {
        self.slot_mut::<Input>(id)?.frequency = period.filter(|p| *p != 0);
        Ok(())
    }

    /// Advance the scene clock by `delta`. Returns the number of ticks run.
    ///
    /// Time below one tick is carried over to the next call.
    pub fn run(&mut self, delta: Duration) -> u64 {
        let nanos = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.pending_nanos = self.pending_nanos.saturating_add(nanos);
        let ticks = self.pending_nanos / TICK_NANOS;
        self.pending_nanos %= TICK_NANOS;
        for _ in 0..ticks {
            self.step();
        }
        ticks
    }

    /// Run a single clock tick.
    ///
    /// A timer is due when `frame % period == 0` and then takes its phase
    /// for the frame, so a timer set by hand falls back in step with nested
    /// timers at its next edge.
    pub fn step(&mut self) {
        self.begin_propagation();
        self.frame = self.frame.wrapping_add(1);
        let frame = self.frame;

        let changed: Vec<NodeId> = self
            .inputs
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| {
                let input = slot.as_mut()?;
                let period = input.frequency?;
                if frame % u64::from(period) != 0 {
                    return None;
                }
                let phase = Input::phase_at(period, frame);
                (input.value != phase).then(|| {
                    input.value = phase;
                    NodeId::new(NodeType::Input, i as u16)
                })
            })
            .collect();
        for id in changed {
            self.on_signal(id);
        }
        self.tick_clocked_components();
    }

    /// Re-evaluate components whose definitions contain timers.
    fn tick_clocked_components(&mut self) {
        let clocked: Vec<NodeId> = self
            .components
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let index = slot.as_ref()?.dependency?;
                let dep = self.dependencies.get(index as usize)?;
                dep.scene
                    .has_timers()
                    .then_some(NodeId::new(NodeType::Component, i as u16))
            })
            .collect();
        for id in clocked {
            self.on_signal(id);
        }
    }

    /// Bring timers to their phase for the current frame.
    ///
    /// Used when the scene runs as a component: nested clocks follow the
    /// caller's frame instead of their own tick history.
    pub(crate) fn sync_timers(&mut self) {
        let frame = self.frame;
        let changed: Vec<NodeId> = self
            .inputs
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| {
                let input = slot.as_mut()?;
                let phase = Input::phase_at(input.frequency?, frame);
                (input.value != phase).then(|| {
                    input.value = phase;
                    NodeId::new(NodeType::Input, i as u16)
                })
            })
            .collect();
        for id in changed {
            self.on_signal(id);
        }
        self.tick_clocked_components();
    }

    // =========================================================================
    // GATE ARITY
    // =========================================================================

    /// Append an empty input socket to a variadic gate.
    ///
    /// The gate becomes `Disabled` until the new socket is driven.
    pub fn increment_gate(&mut self, id: NodeId) -> Result<(), GateworkError> {
        let gate = self.slot_mut::<Gate>(id)?;
        if !gate.can_increment() {
            return Err(GateworkError::GateArity {
                kind: gate.kind,
                arity: gate.arity(),
            });
        }
        gate.inputs.push(None);
        tracing::debug!(target: "gatework_core::scene", "{} arity -> {}", id, gate.arity());
        self.begin_propagation();
        self.on_signal(id);
        Ok(())
    }

    /// Remove the last input socket of a variadic gate, disconnecting it.
    pub fn decrement_gate(&mut self, id: NodeId) -> Result<(), GateworkError> {
        let gate = self.slot_mut::<Gate>(id)?;
        if !gate.can_decrement() {
            return Err(GateworkError::GateArity {
                kind: gate.kind,
                arity: gate.arity(),
            });
        }
        let trailing = gate.inputs.last().copied().flatten();
        self.begin_propagation();
        if let Some(rel) = trailing {
            self.disconnect_inner(rel)?;
        }
        let gate = self.slot_mut::<Gate>(id)?;
        gate.inputs.pop();
        tracing::debug!(target: "gatework_core::scene", "{} arity -> {}", id, gate.arity());
        self.on_signal(id);
        Ok(())
    }

    // =========================================================================
    // COMPONENTS AND DEPENDENCIES
    // =========================================================================

    /// Own a component definition under `key`. Returns its index.
    ///
    /// A key already present keeps its existing scene and index.
    pub fn add_dependency(
        &mut self,
        key: impl Into<String>,
        scene: Scene,
    ) -> Result<u8, GateworkError> {
        let key = key.into();
        if let Some(index) = self.dependency_index(&key) {
            return Ok(index);
        }
        if !scene.is_component() {
            return Err(GateworkError::NotAComponent);
        }
        if self.dependencies.len() >= MAX_DEPENDENCIES {
            return Err(GateworkError::SocketLimit(self.dependencies.len()));
        }
        self.dependencies.push(Dependency { key, scene });
        Ok((self.dependencies.len() - 1) as u8)
    }

    /// Index of the dependency stored under `key`.
    #[must_use]
    pub fn dependency_index(&self, key: &str) -> Option<u8> {
        self.dependencies
            .iter()
            .position(|d| d.key == key)
            .map(|i| i as u8)
    }

    /// Owned dependencies in index order.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Boundary socket counts of dependency `index`.
    fn dependency_shape(&self, index: u8) -> Result<(usize, usize), GateworkError> {
        let dep = self
            .dependencies
            .get(index as usize)
            .ok_or_else(|| GateworkError::UndefinedDependency(format!("#{index}")))?;
        let ctx = dep.scene.context().ok_or(GateworkError::NotAComponent)?;
        Ok((ctx.input_count(), ctx.output_count()))
    }

    /// Bind a component node to dependency `index`, resizing its sockets.
    ///
    /// Relations on sockets that no longer exist are disconnected.
    pub fn set_component(&mut self, id: NodeId, index: u8) -> Result<(), GateworkError> {
        let (input_count, output_count) = self.dependency_shape(index)?;
        let component = self
            .component_node(id)
            .ok_or(GateworkError::InvalidNodeId(id))?;
        let stale: Vec<RelId> = component
            .inputs
            .iter()
            .skip(input_count)
            .flatten()
            .copied()
            .chain(component.outputs.iter().skip(output_count).flatten().copied())
            .collect();

        self.begin_propagation();
        for rel in stale {
            self.disconnect_inner(rel)?;
        }
        let component = self.slot_mut::<Component>(id)?;
        component.dependency = Some(index);
        component.inputs.resize(input_count, None);
        component.outputs.resize_with(output_count, Vec::new);
        self.on_signal(id);
        Ok(())
    }

    /// Add a component node bound to dependency `index`.
    pub fn add_component(&mut self, index: u8) -> Result<NodeId, GateworkError> {
        self.dependency_shape(index)?;
        let id = self.add_node(Component::new())?;
        self.set_component(id, index)?;
        Ok(id)
    }
}

// =============================================================================
// TESTS
// =============================================================================

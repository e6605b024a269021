//! # Component Context
//!
//! The boundary of a scene used as a reusable component. Boundary sockets
//! appear inside the scene as two virtual node kinds:
//!
//! - `ComponentInput`: a source; socket `i` carries bit `i` of the packed input
//! - `ComponentOutput`: a sink; socket `i` sets bit `i` of the packed output
//!
//! Packed words are little-endian by socket: socket 0 is the least
//! significant bit.

use crate::primitives::MAX_SOCKETS;
use crate::{GateworkError, NodeId, NodeType, RelId, Scene, SockId, State};

/// Mask with the low `count` bits set.
const fn low_bits(count: usize) -> u64 {
    if count >= MAX_SOCKETS {
        u64::MAX
    } else {
        (1 << count) - 1
    }
}

/// Boundary sockets and the last packed execution of a component scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentContext {
    /// Fan-out of each boundary input socket.
    pub(crate) inputs: Vec<Vec<RelId>>,
    /// Driver of each boundary output socket.
    pub(crate) outputs: Vec<Option<RelId>>,
    pub(crate) execution_input: u64,
    pub(crate) execution_output: u64,
}

impl ComponentContext {
    /// Virtual node id of boundary input socket `socket`.
    #[must_use]
    pub const fn input_node(socket: SockId) -> NodeId {
        NodeId::new(NodeType::ComponentInput, socket as u16)
    }

    /// Virtual node id of boundary output socket `socket`.
    #[must_use]
    pub const fn output_node(socket: SockId) -> NodeId {
        NodeId::new(NodeType::ComponentOutput, socket as u16)
    }

    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Packed input of the last execution.
    #[must_use]
    pub fn execution_input(&self) -> u64 {
        self.execution_input
    }

    /// Packed output of the last execution.
    #[must_use]
    pub fn execution_output(&self) -> u64 {
        self.execution_output
    }

    /// Relations fed by boundary input `socket`.
    #[must_use]
    pub fn fan_out(&self, socket: SockId) -> &[RelId] {
        self.inputs.get(socket as usize).map_or(&[], Vec::as_slice)
    }

    /// Relation driving boundary output `socket`.
    #[must_use]
    pub fn driver(&self, socket: SockId) -> Option<RelId> {
        self.outputs.get(socket as usize).copied().flatten()
    }

    /// Value of a boundary pseudo-node.
    ///
    /// Inputs read their bit of the packed input. Outputs read their bit of
    /// the packed output, or `Disabled` while undriven.
    #[must_use]
    pub fn get_value(&self, id: NodeId) -> State {
        match id.ty {
            NodeType::ComponentInput if id.slot() < self.inputs.len() => {
                State::from_bit(self.execution_input, id.slot())
            }
            NodeType::ComponentOutput => match self.outputs.get(id.slot()) {
                Some(Some(_)) => State::from_bit(self.execution_output, id.slot()),
                _ => State::Disabled,
            },
            _ => State::Disabled,
        }
    }

    /// Record the value arriving at a boundary output.
    ///
    /// `Disabled` clears the bit. Ids of any other kind are ignored.
    pub fn set_value(&mut self, id: NodeId, value: State) {
        if id.ty != NodeType::ComponentOutput || id.slot() >= self.outputs.len() {
            return;
        }
        let bit = 1u64 << id.slot();
        if value.is_true() {
            self.execution_output |= bit;
        } else {
            self.execution_output &= !bit;
        }
    }
}

// =============================================================================
// SCENE INTEGRATION
// =============================================================================

impl Scene {
    /// Give the scene a component boundary, or resize the existing one.
    ///
    /// Relations on boundary sockets that no longer exist are disconnected.
    pub fn setup_context(
        &mut self,
        input_count: usize,
        output_count: usize,
    ) -> Result<(), GateworkError> {
        if input_count > MAX_SOCKETS {
            return Err(GateworkError::SocketLimit(input_count));
        }
        if output_count > MAX_SOCKETS {
            return Err(GateworkError::SocketLimit(output_count));
        }

        let ctx = self.context.get_or_insert_with(ComponentContext::default);
        let stale: Vec<RelId> = ctx
            .inputs
            .iter()
            .skip(input_count)
            .flatten()
            .copied()
            .chain(ctx.outputs.iter().skip(output_count).flatten().copied())
            .collect();

        self.begin_propagation();
        for rel in stale {
            self.disconnect_inner(rel)?;
        }

        if let Some(ctx) = self.context.as_mut() {
            ctx.inputs.resize_with(input_count, Vec::new);
            ctx.outputs.resize(output_count, None);
            ctx.execution_input &= low_bits(input_count);
            ctx.execution_output &= low_bits(output_count);
        }
        tracing::debug!(
            target: "gatework_core::context",
            "component boundary set to {} inputs, {} outputs",
            input_count,
            output_count
        );
        Ok(())
    }

    /// Evaluate the scene as a black box at `frame`.
    ///
    /// Bit `i` of `input` drives boundary input `i`; bit `i` of the result
    /// is `1` iff boundary output `i` is driven `True`. Calling twice with
    /// the same arguments yields the same result.
    pub fn execute(&mut self, input: u64, frame: u64) -> Result<u64, GateworkError> {
        if self.context.is_none() {
            return Err(GateworkError::NotAComponent);
        }
        Ok(self.run_context(input, frame))
    }

    /// Drive the boundary inputs and collect the boundary outputs.
    ///
    /// The scene clock is moved to `frame` for the duration of the run so
    /// that timers inside agree with the caller.
    pub(crate) fn run_context(&mut self, input: u64, frame: u64) -> u64 {
        self.begin_propagation();
        let Some(ctx) = self.context.as_mut() else {
            return 0;
        };
        let input = input & low_bits(ctx.inputs.len());
        ctx.execution_input = input;
        let fan_outs: Vec<Vec<RelId>> = ctx.inputs.clone();

        let saved = std::mem::replace(&mut self.frame, frame);
        if self.has_timers() {
            self.sync_timers();
        }
        for (socket, rels) in fan_outs.into_iter().enumerate() {
            let value = State::from_bit(input, socket);
            for rel in rels {
                self.propagate(rel, value);
            }
        }
        let output = self.refresh_context_output();
        self.frame = saved;
        output
    }

    /// Recompute the packed output from the boundary output drivers.
    pub(crate) fn refresh_context_output(&mut self) -> u64 {
        let Some(ctx) = self.context.as_ref() else {
            return 0;
        };
        let packed = ctx
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, driver)| {
                driver
                    .and_then(|rel| self.rels.get(&rel))
                    .is_some_and(|rel| rel.value.is_true())
            })
            .fold(0u64, |acc, (socket, _)| acc | (1 << socket));
        if let Some(ctx) = self.context.as_mut() {
            ctx.execution_output = packed;
        }
        packed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Gate, GateType};

    #[test]
    fn boundary_bits_are_lsb_first() {
        let mut ctx = ComponentContext {
            inputs: vec![Vec::new(); 3],
            outputs: vec![Some(RelId(1)), Some(RelId(2))],
            execution_input: 0b100,
            execution_output: 0,
        };
        assert_eq!(ctx.get_value(ComponentContext::input_node(0)), State::False);
        assert_eq!(ctx.get_value(ComponentContext::input_node(2)), State::True);
        assert_eq!(ctx.get_value(ComponentContext::input_node(3)), State::Disabled);

        ctx.set_value(ComponentContext::output_node(1), State::True);
        assert_eq!(ctx.execution_output(), 0b10);
        ctx.set_value(ComponentContext::output_node(1), State::Disabled);
        assert_eq!(ctx.execution_output(), 0);
    }

    #[test]
    fn undriven_output_is_disabled() {
        let ctx = ComponentContext {
            outputs: vec![None],
            execution_output: 1,
            ..ComponentContext::default()
        };
        assert_eq!(ctx.get_value(ComponentContext::output_node(0)), State::Disabled);
    }

    #[test]
    fn socket_limit_enforced() {
        let mut scene = Scene::new();
        assert!(matches!(
            scene.setup_context(MAX_SOCKETS + 1, 1),
            Err(GateworkError::SocketLimit(_))
        ));
        assert!(scene.setup_context(MAX_SOCKETS, MAX_SOCKETS).is_ok());
    }

    #[test]
    fn execute_requires_boundary() {
        let mut scene = Scene::new();
        assert!(matches!(
            scene.execute(0, 0),
            Err(GateworkError::NotAComponent)
        ));
    }

    #[test]
    fn inverter_component() {
        let mut scene = Scene::component(1, 1).expect("component");
        let not = scene.add_node(Gate::new(GateType::Not)).expect("gate");
        scene
            .connect(not, 0, ComponentContext::input_node(0), 0)
            .expect("connect in");
        scene
            .connect(ComponentContext::output_node(0), 0, not, 0)
            .expect("connect out");

        assert_eq!(scene.execute(0, 0).expect("execute"), 1);
        assert_eq!(scene.execute(1, 0).expect("execute"), 0);
        assert_eq!(scene.execute(1, 0).expect("execute"), 0);
    }

    #[test]
    fn shrinking_boundary_disconnects() {
        let mut scene = Scene::component(2, 1).expect("component");
        let out = ComponentContext::output_node(0);
        let rel = scene
            .connect(out, 0, ComponentContext::input_node(1), 0)
            .expect("connect");
        assert_eq!(scene.execute(0b10, 0).expect("execute"), 1);

        scene.setup_context(1, 1).expect("resize");
        assert!(scene.relation(rel).is_none());
        assert_eq!(scene.execute(0b11, 0).expect("execute"), 0);
    }
}

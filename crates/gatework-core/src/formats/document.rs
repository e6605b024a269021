//! # Scene Documents
//!
//! `SceneDocument` is the serializable image of a [`Scene`]. Both codecs
//! (JSON and the binary persistence format) encode this one structure.
//!
//! What a document keeps:
//! - node slots per kind, including null slots, so ids survive a round trip
//! - gate kind and arity, input value and timer period, node layouts
//! - relations with their ids, endpoints, sockets and current values
//! - metadata, boundary socket counts and the last relation id
//! - dependency strings and the dependency index of each component node
//!
//! Relations are reconnected on load, then their saved values are written
//! back so that circuits with feedback come back in the state they were
//! saved in.

use crate::registry::DependencyResolver;
use crate::scene::SceneMeta;
use crate::{
    Component, Gate, GateType, GateworkError, Input, Layout, NodeId, Output, RelId, Scene, SockId,
    State,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Serializable image of a scene.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SceneDocument {
    pub meta: SceneMeta,
    pub context: Option<ContextDoc>,
    /// Dependency strings, in dependency-index order.
    pub dependencies: Vec<String>,
    pub gates: Vec<Option<GateDoc>>,
    pub inputs: Vec<Option<InputDoc>>,
    pub outputs: Vec<Option<OutputDoc>>,
    pub components: Vec<Option<ComponentDoc>>,
    /// Relations in ascending id order.
    pub relations: Vec<RelationDoc>,
    pub last_rel: u32,
}

/// Component boundary socket counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDoc {
    pub inputs: u8,
    pub outputs: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDoc {
    pub kind: GateType,
    pub arity: u8,
    pub layout: Layout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDoc {
    pub value: bool,
    pub frequency: Option<u8>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDoc {
    pub layout: Layout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDoc {
    pub dependency: Option<u8>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDoc {
    pub id: RelId,
    pub from: NodeId,
    pub from_sock: SockId,
    pub to: NodeId,
    pub to_sock: SockId,
    pub value: State,
}

impl GateDoc {
    fn into_gate(self) -> Result<Gate, GateworkError> {
        let arity = self.arity as usize;
        let gate = Gate::with_arity(self.kind, arity);
        if gate.arity() != arity {
            return Err(GateworkError::InvalidGate);
        }
        Ok(gate.at(self.layout))
    }
}

// =============================================================================
// SCENE -> DOCUMENT
// =============================================================================

/// Capture a scene as a document.
#[must_use]
pub fn scene_to_document(scene: &Scene) -> SceneDocument {
    SceneDocument {
        meta: scene.meta.clone(),
        context: scene.context.as_ref().map(|ctx| ContextDoc {
            inputs: ctx.input_count() as u8,
            outputs: ctx.output_count() as u8,
        }),
        dependencies: scene.dependencies.iter().map(|d| d.key.clone()).collect(),
        gates: scene
            .gates
            .iter()
            .map(|slot| {
                slot.as_ref().map(|g| GateDoc {
                    kind: g.kind,
                    arity: g.arity() as u8,
                    layout: g.layout,
                })
            })
            .collect(),
        inputs: scene
            .inputs
            .iter()
            .map(|slot| {
                slot.as_ref().map(|i| InputDoc {
                    value: i.value,
                    frequency: i.frequency,
                    layout: i.layout,
                })
            })
            .collect(),
        outputs: scene
            .outputs
            .iter()
            .map(|slot| slot.as_ref().map(|o| OutputDoc { layout: o.layout }))
            .collect(),
        components: scene
            .components
            .iter()
            .map(|slot| {
                slot.as_ref().map(|c| ComponentDoc {
                    dependency: c.dependency,
                    layout: c.layout,
                })
            })
            .collect(),
        relations: scene
            .rels
            .values()
            .map(|r| RelationDoc {
                id: r.id,
                from: r.from,
                from_sock: r.from_sock,
                to: r.to,
                to_sock: r.to_sock,
                value: r.value,
            })
            .collect(),
        last_rel: scene.last_rel,
    }
}

// =============================================================================
// DOCUMENT -> SCENE
// =============================================================================

/// Rebuild a scene from a document.
///
/// Dependencies are resolved first, in index order, through `resolver`.
/// Relations are then reconnected in id order, which re-runs propagation,
/// and finally take their saved values. Node values are re-derived from
/// those without propagating again.
pub fn document_to_scene<R: DependencyResolver + ?Sized>(
    document: SceneDocument,
    resolver: &mut R,
) -> Result<Scene, GateworkError> {
    document.meta.validate()?;

    let mut scene = Scene::new();
    scene.meta = document.meta;

    let mut seen = BTreeSet::new();
    for key in document.dependencies {
        if !seen.insert(key.clone()) {
            return Err(GateworkError::InvalidScene(format!(
                "duplicate dependency {key}"
            )));
        }
        let dependency = resolver.resolve_dependency(&key)?;
        scene.add_dependency(key, dependency)?;
    }

    if let Some(ctx) = document.context {
        scene.setup_context(ctx.inputs as usize, ctx.outputs as usize)?;
    }

    for slot in document.gates {
        scene.place(slot.map(GateDoc::into_gate).transpose()?);
    }
    for slot in document.inputs {
        scene.place(slot.map(|i| {
            let mut input = Input::timer(i.frequency.unwrap_or(0)).at(i.layout);
            input.value = i.value;
            input
        }));
    }
    for slot in document.outputs {
        scene.place(slot.map(|o| Output::new().at(o.layout)));
    }
    let mut bindings = Vec::new();
    for (index, slot) in document.components.into_iter().enumerate() {
        if let Some(ComponentDoc {
            dependency: Some(dependency),
            ..
        }) = slot
        {
            bindings.push((index, dependency));
        }
        scene.place(slot.map(|c| Component::new().at(c.layout)));
    }
    for (index, dependency) in bindings {
        if dependency as usize >= scene.dependencies.len() {
            return Err(GateworkError::UndefinedDependency(format!(
                "#{dependency} (component {index})"
            )));
        }
        let id = NodeId::new(crate::NodeType::Component, index as u16);
        scene.set_component(id, dependency)?;
    }

    let mut previous = RelId::NONE;
    let mut values = Vec::with_capacity(document.relations.len());
    for rel in document.relations {
        if rel.id <= previous {
            return Err(GateworkError::InvalidScene(format!(
                "relation {} out of order or duplicated",
                rel.id
            )));
        }
        previous = rel.id;
        scene
            .connect_with_id(rel.id, rel.to, rel.to_sock, rel.from, rel.from_sock)
            .map_err(|e| match e {
                GateworkError::InvalidRelId(id) => {
                    GateworkError::InvalidScene(format!("unusable relation id {id}"))
                }
                other => GateworkError::InvalidNode(format!("{}: {}", rel.id, other)),
            })?;
        values.push((rel.id, rel.value));
    }
    scene.restore_relation_values(values);

    if document.last_rel < previous.value() {
        return Err(GateworkError::InvalidScene(format!(
            "last relation id {} below {}",
            document.last_rel, previous
        )));
    }
    scene.last_rel = document.last_rel;
    scene.reset_free_hints();
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComponentContext;
    use crate::registry::NoDependencies;

    fn inverter() -> Scene {
        let mut scene = Scene::component(1, 1).expect("component");
        let not = scene.add_node(Gate::new(GateType::Not)).expect("gate");
        scene
            .connect(not, 0, ComponentContext::input_node(0), 0)
            .expect("connect");
        scene
            .connect(ComponentContext::output_node(0), 0, not, 0)
            .expect("connect");
        scene
    }

    #[test]
    fn null_slots_survive() {
        let mut scene = Scene::new();
        let a = scene.add_node(Input::new(true)).expect("input");
        let b = scene.add_node(Input::new(false)).expect("input");
        let out = scene.add_node(Output::new()).expect("output");
        scene.connect(out, 0, b, 0).expect("connect");
        scene.remove_node(a).expect("remove");

        let document = scene_to_document(&scene);
        assert_eq!(document.inputs.len(), 2);
        assert!(document.inputs[0].is_none());

        let restored = document_to_scene(document, &mut NoDependencies).expect("restore");
        assert!(restored.input(a).is_none());
        assert_eq!(restored.get(out, 0), State::False);
        assert_eq!(restored.last_rel_id(), RelId(1));
    }

    #[test]
    fn not_gate_arity_validated() {
        let mut document = scene_to_document(&Scene::new());
        document.gates.push(Some(GateDoc {
            kind: GateType::Not,
            arity: 2,
            layout: Layout::default(),
        }));
        assert!(matches!(
            document_to_scene(document, &mut NoDependencies),
            Err(GateworkError::InvalidGate)
        ));
    }

    #[test]
    fn dangling_relation_rejected() {
        let mut document = scene_to_document(&inverter());
        document.relations[0].from = NodeId::new(crate::NodeType::Gate, 7);
        assert!(matches!(
            document_to_scene(document, &mut NoDependencies),
            Err(GateworkError::InvalidNode(_))
        ));
    }

    #[test]
    fn duplicate_relation_ids_rejected() {
        let mut document = scene_to_document(&inverter());
        document.relations[1].id = document.relations[0].id;
        assert!(matches!(
            document_to_scene(document, &mut NoDependencies),
            Err(GateworkError::InvalidScene(_))
        ));
    }

    #[test]
    fn metadata_caps_checked_on_load() {
        let mut document = scene_to_document(&Scene::new());
        document.meta.author = "a".repeat(100);
        assert!(matches!(
            document_to_scene(document, &mut NoDependencies),
            Err(GateworkError::AuthorTooLong { .. })
        ));
    }

    #[test]
    fn component_scene_roundtrip() {
        let scene = inverter();
        let document = scene_to_document(&scene);
        let mut restored =
            document_to_scene(document.clone(), &mut NoDependencies).expect("restore");
        assert_eq!(scene_to_document(&restored), document);
        assert_eq!(restored.execute(0, 0).expect("execute"), 1);
    }
}

//! # Component Tests
//!
//! Scenes used as black boxes: packed execution, component nodes in a
//! parent scene, nesting, rebinding, clocks inside components, and
//! documents that carry dependencies.

use gatework_core::{
    ComponentContext, Gate, GateType, Input, NodeId, Output, Registry, Scene, State,
    scene_from_bytes, scene_from_json, scene_to_bytes, scene_to_json,
};

/// 2:1 multiplexer. Sockets: 0 = select, 1 = a, 2 = b. Output = select ? b : a.
fn mux() -> Scene {
    let mut scene = Scene::component(3, 1).expect("component");
    scene.set_name("mux").expect("name");
    let sel = ComponentContext::input_node(0);
    let a = ComponentContext::input_node(1);
    let b = ComponentContext::input_node(2);
    let not = scene.add_node(Gate::new(GateType::Not)).expect("gate");
    let and_a = scene.add_node(Gate::new(GateType::And)).expect("gate");
    let and_b = scene.add_node(Gate::new(GateType::And)).expect("gate");
    let or = scene.add_node(Gate::new(GateType::Or)).expect("gate");

    scene.connect(not, 0, sel, 0).expect("connect");
    scene.connect(and_a, 0, a, 0).expect("connect");
    scene.connect(and_a, 1, not, 0).expect("connect");
    scene.connect(and_b, 0, b, 0).expect("connect");
    scene.connect(and_b, 1, sel, 0).expect("connect");
    scene.connect(or, 0, and_a, 0).expect("connect");
    scene.connect(or, 1, and_b, 0).expect("connect");
    scene
        .connect(ComponentContext::output_node(0), 0, or, 0)
        .expect("connect");
    scene
}

fn mux_reference(packed: u64) -> u64 {
    let (sel, a, b) = (packed & 1, (packed >> 1) & 1, (packed >> 2) & 1);
    if sel == 1 { b } else { a }
}

/// Parent scene with one mux component driven by three inputs.
fn mux_parent() -> (Scene, [NodeId; 3], NodeId, NodeId) {
    let mut scene = Scene::new();
    let index = scene.add_dependency("@mux", mux()).expect("dependency");
    let component = scene.add_component(index).expect("component");
    let mut inputs = [NodeId::new(gatework_core::NodeType::Input, 0); 3];
    for (sock, slot) in inputs.iter_mut().enumerate() {
        *slot = scene.add_node(Input::new(false)).expect("input");
        scene
            .connect(component, sock as u8, *slot, 0)
            .expect("connect input");
    }
    let out = scene.add_node(Output::new()).expect("output");
    scene.connect(out, 0, component, 0).expect("connect output");
    (scene, inputs, component, out)
}

#[test]
fn mux_execute_matches_reference() {
    let mut scene = mux();
    for packed in 0..8u64 {
        assert_eq!(
            scene.execute(packed, 0).expect("execute"),
            mux_reference(packed),
            "input {packed:03b}"
        );
    }
}

#[test]
fn execute_is_idempotent() {
    let mut scene = mux();
    let first = scene.execute(0b110, 0).expect("execute");
    let second = scene.execute(0b110, 0).expect("execute");
    assert_eq!(first, second);
    assert_eq!(scene.context().expect("context").execution_output(), first);
    assert_eq!(scene.context().expect("context").execution_input(), 0b110);
}

#[test]
fn bits_beyond_boundary_are_ignored() {
    let mut scene = mux();
    assert_eq!(
        scene.execute(0b1111_0010, 0).expect("execute"),
        scene.execute(0b010, 0).expect("execute")
    );
}

#[test]
fn component_node_follows_inputs() {
    let (mut scene, [sel, a, b], _, out) = mux_parent();
    assert_eq!(scene.get(out, 0), State::False);

    scene.set_input(a, true).expect("set");
    assert_eq!(scene.get(out, 0), State::True);
    scene.set_input(sel, true).expect("set");
    assert_eq!(scene.get(out, 0), State::False);
    scene.set_input(b, true).expect("set");
    assert_eq!(scene.get(out, 0), State::True);
}

#[test]
fn partially_connected_component_is_disabled() {
    let (mut scene, [_, a, _], component, out) = mux_parent();
    scene.set_input(a, true).expect("set");
    let packed = scene.component_node(component).expect("node").packed_output();
    assert_eq!(packed, 1);

    scene.disconnect_socket(component, 2).expect("disconnect");
    assert_eq!(scene.get(out, 0), State::Disabled);
    assert!(!scene.is_connected(component));
    assert_eq!(
        scene.component_node(component).expect("node").packed_output(),
        packed
    );
}

#[test]
fn unbound_component_cannot_source() {
    let mut scene = Scene::new();
    let component = scene.add_node(gatework_core::Component::new()).expect("node");
    let out = scene.add_node(Output::new()).expect("output");
    assert!(scene.connect(out, 0, component, 0).is_err());

    let index = scene.add_dependency("@mux", mux()).expect("dependency");
    scene.set_component(component, index).expect("bind");
    assert!(scene.connect(out, 0, component, 1).is_err());
    scene.connect(out, 0, component, 0).expect("connect");
    assert_eq!(scene.get(out, 0), State::Disabled);
}

#[test]
fn nested_components() {
    // xor(x0, x1) = mux(select = x0, a = x1, b = !x1)
    let mut xor = Scene::component(2, 1).expect("component");
    let index = xor.add_dependency("@mux", mux()).expect("dependency");
    let inner = xor.add_component(index).expect("component");
    let not = xor.add_node(Gate::new(GateType::Not)).expect("gate");
    let x0 = ComponentContext::input_node(0);
    let x1 = ComponentContext::input_node(1);
    xor.connect(inner, 0, x0, 0).expect("connect");
    xor.connect(inner, 1, x1, 0).expect("connect");
    xor.connect(not, 0, x1, 0).expect("connect");
    xor.connect(inner, 2, not, 0).expect("connect");
    xor.connect(ComponentContext::output_node(0), 0, inner, 0)
        .expect("connect");

    for packed in 0..4u64 {
        let expected = (packed & 1) ^ (packed >> 1);
        assert_eq!(xor.execute(packed, 0).expect("execute"), expected);
    }

    let mut top = Scene::new();
    let index = top.add_dependency("@xor", xor).expect("dependency");
    let component = top.add_component(index).expect("component");
    let a = top.add_node(Input::new(true)).expect("input");
    let b = top.add_node(Input::new(false)).expect("input");
    let out = top.add_node(Output::new()).expect("output");
    top.connect(component, 0, a, 0).expect("connect");
    top.connect(component, 1, b, 0).expect("connect");
    top.connect(out, 0, component, 0).expect("connect");
    assert_eq!(top.get(out, 0), State::True);
    top.set_input(b, true).expect("set");
    assert_eq!(top.get(out, 0), State::False);
}

#[test]
fn rebinding_drops_sockets_that_no_longer_fit() {
    let (mut scene, [_, a, b], component, out) = mux_parent();
    let mut buffer = Scene::component(1, 1).expect("component");
    buffer
        .connect(
            ComponentContext::output_node(0),
            0,
            ComponentContext::input_node(0),
            0,
        )
        .expect("connect");
    let index = scene.add_dependency("@buf", buffer).expect("dependency");

    scene.set_component(component, index).expect("rebind");
    let node = scene.component_node(component).expect("node");
    assert_eq!(node.input_count(), 1);
    assert!(scene.input(a).expect("input").fan_out().is_empty());
    assert!(scene.input(b).expect("input").fan_out().is_empty());
    assert_eq!(scene.relation_count(), 2);
    assert_eq!(scene.get(out, 0), State::False);
}

#[test]
fn boundary_output_disconnect_clears_bit() {
    let mut scene = mux();
    assert_eq!(scene.execute(0b010, 0).expect("execute"), 1);
    let driver = scene
        .context()
        .expect("context")
        .driver(0)
        .expect("driver");
    scene.disconnect(driver).expect("disconnect");
    assert_eq!(scene.execute(0b010, 0).expect("execute"), 0);
    assert_eq!(
        scene.get(ComponentContext::output_node(0), 0),
        State::Disabled
    );
}

#[test]
fn timer_inside_component_follows_parent_clock() {
    let mut blink = Scene::component(0, 1).expect("component");
    let timer = blink.add_node(Input::timer(2)).expect("timer");
    blink
        .connect(ComponentContext::output_node(0), 0, timer, 0)
        .expect("connect");

    let mut scene = Scene::new();
    let index = scene.add_dependency("@blink", blink).expect("dependency");
    let component = scene.add_component(index).expect("component");
    let out = scene.add_node(Output::new()).expect("output");
    scene.connect(out, 0, component, 0).expect("connect");
    assert_eq!(scene.get(out, 0), State::False);

    let mut seen = Vec::new();
    for _ in 0..4 {
        scene.step();
        seen.push(scene.get(out, 0));
    }
    assert_eq!(
        seen,
        vec![State::False, State::True, State::True, State::False]
    );
}

#[test]
fn documents_with_dependencies_roundtrip() {
    let mut registry = Registry::in_memory();
    registry.insert("@mux", mux()).expect("insert");

    let (mut scene, [sel, _, b], _, out) = mux_parent();
    scene.set_input(sel, true).expect("set");
    scene.set_input(b, true).expect("set");

    let json = scene_to_json(&scene).expect("json");
    let restored = scene_from_json(&json, &mut registry).expect("from json");
    assert_eq!(scene_to_json(&restored).expect("json"), json);
    assert_eq!(restored.get(out, 0), State::True);

    let bytes = scene_to_bytes(&scene).expect("bytes");
    let restored = scene_from_bytes(&bytes, &mut registry).expect("from bytes");
    assert_eq!(scene_to_bytes(&restored).expect("bytes"), bytes);
    assert_eq!(restored.dependencies()[0].key, "@mux");
}

#[test]
fn missing_dependency_fails_load() {
    let (scene, _, _, _) = mux_parent();
    let json = scene_to_json(&scene).expect("json");
    let mut registry = Registry::in_memory();
    assert!(matches!(
        scene_from_json(&json, &mut registry),
        Err(gatework_core::GateworkError::ComponentNotFound(_))
    ));
}

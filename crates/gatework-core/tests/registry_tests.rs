//! # Registry Tests
//!
//! Dependency resolution through the registry: stores on disk, remote
//! fallback with caching, transitive loads and cycle detection.

use gatework_core::formats::{ContextDoc, SceneDocument, document_to_bytes};
use gatework_core::{
    ComponentContext, ComponentStore, DependencyKey, DirectoryStore, GateworkError, Input,
    MemoryStore, Output, RedbStore, Registry, RemoteSource, Scene, State, scene_to_bytes,
};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tempfile::tempdir;

fn buffer() -> Scene {
    let mut scene = Scene::component(1, 1).expect("component");
    scene
        .connect(
            ComponentContext::output_node(0),
            0,
            ComponentContext::input_node(0),
            0,
        )
        .expect("connect");
    scene
}

/// Inverter built from a NOT gate.
fn inverter() -> Scene {
    let mut scene = Scene::component(1, 1).expect("component");
    let not = scene
        .add_node(gatework_core::Gate::new(gatework_core::GateType::Not))
        .expect("gate");
    scene
        .connect(not, 0, ComponentContext::input_node(0), 0)
        .expect("connect");
    scene
        .connect(ComponentContext::output_node(0), 0, not, 0)
        .expect("connect");
    scene
}

/// Component whose only node is a component bound to `inner_key`.
fn wrapper(inner_key: &str, inner: Scene) -> Scene {
    let mut scene = Scene::component(1, 1).expect("component");
    let index = scene.add_dependency(inner_key, inner).expect("dependency");
    let node = scene.add_component(index).expect("component");
    scene
        .connect(node, 0, ComponentContext::input_node(0), 0)
        .expect("connect");
    scene
        .connect(ComponentContext::output_node(0), 0, node, 0)
        .expect("connect");
    scene
}

/// Remote that serves fixed documents and counts fetches.
struct CountingRemote {
    documents: BTreeMap<String, Vec<u8>>,
    fetches: Rc<Cell<usize>>,
}

impl RemoteSource for CountingRemote {
    fn fetch(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError> {
        self.fetches.set(self.fetches.get() + 1);
        Ok(self.documents.get(&key.to_string()).cloned())
    }
}

fn key(text: &str) -> DependencyKey {
    DependencyKey::parse(text).expect("key")
}

#[test]
fn directory_store_survives_a_new_registry() {
    let temp = tempdir().expect("temp dir");
    let mut registry = Registry::new(Box::new(DirectoryStore::new(temp.path())));
    registry.publish("local/inv/1", &inverter()).expect("publish");
    assert!(temp.path().join("local").join("inv").join("1.gwc").exists());

    let mut fresh = Registry::new(Box::new(DirectoryStore::new(temp.path())));
    let mut scene = fresh.resolve("local/inv/1").expect("resolve").clone();
    assert_eq!(scene.execute(0, 0).expect("execute"), 1);
    assert_eq!(scene.execute(1, 0).expect("execute"), 0);
    assert_eq!(
        fresh.store().keys().expect("keys"),
        vec![key("local/inv/1")]
    );
}

#[test]
fn remote_fetch_is_cached_into_store() {
    let fetches = Rc::new(Cell::new(0));
    let remote = CountingRemote {
        documents: BTreeMap::from([(
            "alice/inv/2".to_string(),
            scene_to_bytes(&inverter()).expect("bytes"),
        )]),
        fetches: Rc::clone(&fetches),
    };
    let mut registry = Registry::in_memory().with_remote(Box::new(remote));

    registry.resolve("alice/inv/2").expect("resolve");
    assert_eq!(fetches.get(), 1);
    assert!(registry.store().load(&key("alice/inv/2")).expect("load").is_some());

    registry.shutdown();
    registry.resolve("alice/inv/2").expect("resolve from store");
    assert_eq!(fetches.get(), 1);
}

#[test]
fn local_and_std_keys_never_reach_remote() {
    let fetches = Rc::new(Cell::new(0));
    let remote = CountingRemote {
        documents: BTreeMap::new(),
        fetches: Rc::clone(&fetches),
    };
    let mut registry = Registry::in_memory().with_remote(Box::new(remote));

    assert!(matches!(
        registry.resolve("local/missing/1"),
        Err(GateworkError::ComponentNotFound(_))
    ));
    assert!(matches!(
        registry.resolve("@missing"),
        Err(GateworkError::ComponentNotFound(_))
    ));
    assert_eq!(fetches.get(), 0);

    assert!(matches!(
        registry.resolve("bob/missing/1"),
        Err(GateworkError::ComponentNotFound(_))
    ));
    assert_eq!(fetches.get(), 1);
}

#[test]
fn transitive_dependencies_load_through_registry() {
    let mut store = MemoryStore::new();
    store
        .save(&key("me/inner/1"), &scene_to_bytes(&inverter()).expect("bytes"))
        .expect("save inner");
    store
        .save(
            &key("me/outer/1"),
            &scene_to_bytes(&wrapper("me/inner/1", inverter())).expect("bytes"),
        )
        .expect("save outer");
    let mut registry = Registry::new(Box::new(store));

    let mut outer = registry.resolve("me/outer/1").expect("resolve").clone();
    assert!(registry.contains("me/inner/1"));
    assert_eq!(outer.execute(0, 0).expect("execute"), 1);

    let mut scene = Scene::new();
    let index = scene.add_dependency("me/outer/1", outer).expect("dependency");
    let node = scene.add_component(index).expect("component");
    let input = scene.add_node(Input::new(true)).expect("input");
    let output = scene.add_node(Output::new()).expect("output");
    scene.connect(node, 0, input, 0).expect("connect");
    scene.connect(output, 0, node, 0).expect("connect");
    assert_eq!(scene.get(output, 0), State::False);
}

fn component_document(dependencies: &[&str]) -> Vec<u8> {
    let document = SceneDocument {
        context: Some(ContextDoc {
            inputs: 0,
            outputs: 0,
        }),
        dependencies: dependencies.iter().map(|d| (*d).to_string()).collect(),
        ..SceneDocument::default()
    };
    document_to_bytes(&document).expect("bytes")
}

#[test]
fn dependency_cycle_is_reported() {
    let mut store = MemoryStore::new();
    store
        .save(&key("me/a/1"), &component_document(&["me/b/1"]))
        .expect("save");
    store
        .save(&key("me/b/1"), &component_document(&["me/a/1"]))
        .expect("save");
    let mut registry = Registry::new(Box::new(store));

    assert!(matches!(
        registry.resolve("me/a/1"),
        Err(GateworkError::DependencyCycle(_))
    ));
    assert!(!registry.contains("me/a/1"));
    assert!(!registry.contains("me/b/1"));
}

#[test]
fn parent_directory_dependency_is_refused() {
    let temp = tempdir().expect("temp dir");
    let fetches = Rc::new(Cell::new(0));
    let remote = CountingRemote {
        documents: BTreeMap::from([
            (
                "alice/top/1".to_string(),
                component_document(&["../escaped/1"]),
            ),
            ("../escaped/1".to_string(), component_document(&[])),
        ]),
        fetches: Rc::clone(&fetches),
    };
    let mut registry = Registry::new(Box::new(DirectoryStore::new(temp.path().join("lib"))))
        .with_remote(Box::new(remote));

    assert!(matches!(
        registry.resolve("alice/top/1"),
        Err(GateworkError::InvalidDependencyFormat(_))
    ));
    assert_eq!(fetches.get(), 1);
    assert!(!temp.path().join("escaped").exists());
    assert!(!temp.path().join("lib").join("alice").exists());
}

#[test]
fn stored_plain_scene_is_not_a_component() {
    let mut store = MemoryStore::new();
    store
        .save(
            &key("me/plain/1"),
            &document_to_bytes(&SceneDocument::default()).expect("bytes"),
        )
        .expect("save");
    let mut registry = Registry::new(Box::new(store));
    assert!(matches!(
        registry.resolve("me/plain/1"),
        Err(GateworkError::NotAComponent)
    ));
}

#[test]
fn redb_backed_registry() {
    let temp = tempdir().expect("temp dir");
    let path = temp.path().join("library.redb");
    {
        let store = RedbStore::open(&path).expect("open");
        let mut registry = Registry::new(Box::new(store));
        registry.publish("local/buf/1", &buffer()).expect("publish");
        registry
            .publish("local/wrap/1", &wrapper("local/buf/1", buffer()))
            .expect("publish");
    }

    let store = RedbStore::open(&path).expect("reopen");
    assert_eq!(store.len().expect("len"), 2);
    let mut registry = Registry::new(Box::new(store));
    let mut wrap = registry.resolve("local/wrap/1").expect("resolve").clone();
    assert_eq!(wrap.execute(1, 0).expect("execute"), 1);
    assert_eq!(wrap.execute(0, 0).expect("execute"), 0);
}

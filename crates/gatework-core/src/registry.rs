//! # Component Registry
//!
//! Resolves dependency strings to component scenes.
//!
//! Lookup order for [`Registry::resolve`]:
//! 1. scenes already held in memory (preloaded, published or resolved)
//! 2. the [`ComponentStore`] backend (never for `@name` keys)
//! 3. the optional [`RemoteSource`] (only for published `author/...` keys);
//!    a fetched document is cached into the store once it decodes
//!
//! Loading a document resolves its own dependencies first, through the same
//! registry. A key met again while it is still loading is a
//! [`DependencyCycle`](GateworkError::DependencyCycle).

use crate::formats::{decode_document, document_to_scene, scene_to_bytes};
use crate::storage::{ComponentStore, DirectoryStore, MemoryStore};
use crate::{DependencyKey, DependencySource, GateworkError, Scene};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// RESOLUTION SEAMS
// =============================================================================

/// Supplies dependency scenes while a document is being loaded.
pub trait DependencyResolver {
    /// An owned copy of the component scene stored under `key`.
    fn resolve_dependency(&mut self, key: &str) -> Result<Scene, GateworkError>;
}

impl<R: DependencyResolver + ?Sized> DependencyResolver for &mut R {
    fn resolve_dependency(&mut self, key: &str) -> Result<Scene, GateworkError> {
        (**self).resolve_dependency(key)
    }
}

/// Resolver for documents that must not have dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

impl DependencyResolver for NoDependencies {
    fn resolve_dependency(&mut self, key: &str) -> Result<Scene, GateworkError> {
        Err(GateworkError::UndefinedDependency(key.to_string()))
    }
}

/// A source of published component documents beyond the local store.
///
/// The engine ships no network client; front ends plug one in here.
pub trait RemoteSource {
    /// Encoded document for `key`, or `None` if the source does not have it.
    fn fetch(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError>;
}

/// A read-only library directory, such as a shared mount, used as a remote.
impl RemoteSource for DirectoryStore {
    fn fetch(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError> {
        self.load(key)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// In-memory component cache backed by a store and an optional remote.
pub struct Registry {
    scenes: BTreeMap<String, Scene>,
    store: Box<dyn ComponentStore>,
    remote: Option<Box<dyn RemoteSource>>,
    /// Keys currently being loaded, for cycle detection.
    loading: BTreeSet<String>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("cached", &self.scenes.len())
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a registry over `store`, without a remote source.
    pub fn new(store: Box<dyn ComponentStore>) -> Self {
        Self {
            scenes: BTreeMap::new(),
            store,
            remote: None,
            loading: BTreeSet::new(),
        }
    }

    /// Create a registry over a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Attach a remote source for published components.
    #[must_use]
    pub fn with_remote(mut self, remote: Box<dyn RemoteSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &dyn ComponentStore {
        &*self.store
    }

    /// Whether `key` is held in memory.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        DependencyKey::parse(key).is_ok_and(|k| self.scenes.contains_key(&k.to_string()))
    }

    /// Keys held in memory, ascending.
    pub fn cached_keys(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }

    /// Hold a component scene in memory under `key` without storing it.
    ///
    /// This is how `@name` standard-library components are provided.
    pub fn insert(&mut self, key: &str, scene: Scene) -> Result<(), GateworkError> {
        let key = DependencyKey::parse(key)?;
        if !scene.is_component() {
            return Err(GateworkError::NotAComponent);
        }
        self.scenes.insert(key.to_string(), scene);
        Ok(())
    }

    /// Encode a component scene, write it to the store and hold it in memory.
    pub fn publish(&mut self, key: &str, scene: &Scene) -> Result<(), GateworkError> {
        let key = DependencyKey::parse(key)?;
        if !scene.is_component() {
            return Err(GateworkError::NotAComponent);
        }
        let bytes = scene_to_bytes(scene)?;
        self.store.save(&key, &bytes)?;
        tracing::debug!(target: "gatework_core::registry", "published {} ({} bytes)", key, bytes.len());
        self.scenes.insert(key.to_string(), scene.clone());
        Ok(())
    }

    /// The component scene for `key`, loading it on first use.
    pub fn resolve(&mut self, key: &str) -> Result<&Scene, GateworkError> {
        let key = DependencyKey::parse(key)?;
        let name = key.to_string();
        if !self.scenes.contains_key(&name) {
            let scene = self.load(&key)?;
            self.scenes.insert(name.clone(), scene);
        }
        self.scenes
            .get(&name)
            .ok_or(GateworkError::ComponentNotFound(name))
    }

    /// Drop every scene held in memory. The store is left untouched.
    pub fn shutdown(&mut self) {
        tracing::debug!(target: "gatework_core::registry", "dropping {} cached components", self.scenes.len());
        self.scenes.clear();
        self.loading.clear();
    }

    fn load(&mut self, key: &DependencyKey) -> Result<Scene, GateworkError> {
        let name = key.to_string();
        if !self.loading.insert(name.clone()) {
            return Err(GateworkError::DependencyCycle(name));
        }
        let result = self.load_uncached(key);
        self.loading.remove(&name);
        result
    }

    fn load_uncached(&mut self, key: &DependencyKey) -> Result<Scene, GateworkError> {
        let (bytes, fetched) = match key.source() {
            DependencySource::Std => (None, false),
            DependencySource::Local => (self.store.load(key)?, false),
            DependencySource::Remote => match self.store.load(key)? {
                Some(bytes) => (Some(bytes), false),
                None => (self.fetch_remote(key)?, true),
            },
        };
        let bytes = bytes.ok_or_else(|| GateworkError::ComponentNotFound(key.to_string()))?;

        let document = decode_document(&bytes)?;
        let scene = document_to_scene(document, &mut *self)?;
        if !scene.is_component() {
            return Err(GateworkError::NotAComponent);
        }

        if fetched {
            self.store.save(key, &bytes)?;
            tracing::debug!(target: "gatework_core::registry", "cached remote component {}", key);
        }
        tracing::debug!(
            target: "gatework_core::registry",
            "loaded {} ({} nodes, {} dependencies)",
            key,
            scene.node_count(),
            scene.dependencies().len()
        );
        Ok(scene)
    }

    fn fetch_remote(&self, key: &DependencyKey) -> Result<Option<Vec<u8>>, GateworkError> {
        match &self.remote {
            Some(remote) => remote.fetch(key),
            None => Ok(None),
        }
    }
}

impl DependencyResolver for Registry {
    fn resolve_dependency(&mut self, key: &str) -> Result<Scene, GateworkError> {
        self.resolve(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComponentContext, Gate, GateType};

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

    #[test]
    fn std_components_come_from_memory() {
        let mut registry = Registry::in_memory();
        assert!(matches!(
            registry.resolve("@buf"),
            Err(GateworkError::ComponentNotFound(_))
        ));
        registry.insert("@buf", buffer()).expect("insert");
        assert!(registry.resolve("@buf").is_ok());
        assert!(registry.contains("@buf"));
    }

    #[test]
    fn publish_then_resolve_after_shutdown() {
        let mut registry = Registry::in_memory();
        registry.publish("local/buf/1", &buffer()).expect("publish");
        registry.shutdown();
        assert!(!registry.contains("local/buf/1"));

        let scene = registry.resolve("local/buf/1").expect("resolve");
        assert!(scene.is_component());
    }

    #[test]
    fn plain_scene_rejected() {
        let mut registry = Registry::in_memory();
        let mut plain = Scene::new();
        plain.add_node(Gate::new(GateType::And)).expect("gate");
        assert!(matches!(
            registry.publish("me/plain/1", &plain),
            Err(GateworkError::NotAComponent)
        ));
        assert!(matches!(
            registry.insert("@plain", plain),
            Err(GateworkError::NotAComponent)
        ));
    }

    #[test]
    fn std_keys_cannot_be_published() {
        let mut registry = Registry::in_memory();
        assert!(matches!(
            registry.publish("@buf", &buffer()),
            Err(GateworkError::InvalidDependencyFormat(_))
        ));
    }

    #[test]
    fn bad_key_rejected() {
        let mut registry = Registry::in_memory();
        assert!(matches!(
            registry.resolve("not a key"),
            Err(GateworkError::InvalidDependencyFormat(_))
        ));
    }

    #[test]
    fn no_dependencies_resolver() {
        assert!(matches!(
            NoDependencies.resolve_dependency("@x"),
            Err(GateworkError::UndefinedDependency(_))
        ));
    }
}

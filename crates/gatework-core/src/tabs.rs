//! # Tab Manager
//!
//! The set of scenes a front end has open, owned explicitly instead of
//! living in process-wide state. Each tab remembers the file it came from
//! and whether it changed since the last save.
//!
//! File format on save follows the extension: `.json` writes the JSON
//! document, anything else the binary format.

use crate::formats::{decode_document, document_to_scene, scene_to_bytes, scene_to_json};
use crate::registry::DependencyResolver;
use crate::{GateworkError, Scene};
use std::path::{Path, PathBuf};

/// One open scene.
#[derive(Debug, Clone, Default)]
pub struct Tab {
    scene: Scene,
    path: Option<PathBuf>,
    dirty: bool,
}

impl Tab {
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable access. Marks the tab as modified.
    pub fn scene_mut(&mut self) -> &mut Scene {
        self.dirty = true;
        &mut self.scene
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Display title: scene name, then file stem, then "untitled".
    #[must_use]
    pub fn title(&self) -> String {
        if !self.scene.meta().name.is_empty() {
            return self.scene.meta().name.clone();
        }
        self.path
            .as_deref()
            .and_then(Path::file_stem)
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string()
    }
}

/// Read a scene file in either format.
pub fn read_scene_file<R: DependencyResolver + ?Sized>(
    path: &Path,
    resolver: &mut R,
) -> Result<Scene, GateworkError> {
    let bytes = std::fs::read(path)
        .map_err(|e| GateworkError::IoError(format!("{}: {}", path.display(), e)))?;
    document_to_scene(decode_document(&bytes)?, resolver)
}

/// Write a scene file, choosing the format from the extension.
pub fn write_scene_file(path: &Path, scene: &Scene) -> Result<(), GateworkError> {
    let bytes = if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
        scene_to_json(scene)?.into_bytes()
    } else {
        scene_to_bytes(scene)?
    };
    std::fs::write(path, bytes)
        .map_err(|e| GateworkError::IoError(format!("{}: {}", path.display(), e)))
}

/// Owned collection of open scenes with one active tab.
#[derive(Debug, Default)]
pub struct TabManager {
    tabs: Vec<Tab>,
    active: Option<usize>,
}

impl TabManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tab> {
        self.tabs.iter()
    }

    /// Open an unsaved scene and make it active. Returns its tab index.
    pub fn open_scene(&mut self, scene: Scene) -> usize {
        self.tabs.push(Tab {
            scene,
            path: None,
            dirty: true,
        });
        let index = self.tabs.len() - 1;
        self.active = Some(index);
        index
    }

    /// Load a scene file into a new active tab.
    ///
    /// A file that is already open is activated instead of loaded twice.
    pub fn open_file<R: DependencyResolver + ?Sized>(
        &mut self,
        path: impl AsRef<Path>,
        resolver: &mut R,
    ) -> Result<usize, GateworkError> {
        let path = path.as_ref();
        if let Some(index) = self.tabs.iter().position(|t| t.path() == Some(path)) {
            self.active = Some(index);
            return Ok(index);
        }
        let scene = read_scene_file(path, resolver)?;
        tracing::debug!(target: "gatework_core::tabs", "opened {}", path.display());
        self.tabs.push(Tab {
            scene,
            path: Some(path.to_path_buf()),
            dirty: false,
        });
        let index = self.tabs.len() - 1;
        self.active = Some(index);
        Ok(index)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Tab> {
        self.tabs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Tab> {
        self.tabs.get_mut(index)
    }

    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    #[must_use]
    pub fn active(&self) -> Option<&Tab> {
        self.active.and_then(|i| self.tabs.get(i))
    }

    pub fn active_mut(&mut self) -> Option<&mut Tab> {
        self.active.and_then(|i| self.tabs.get_mut(i))
    }

    /// Switch the active tab. Returns false for an unknown index.
    pub fn activate(&mut self, index: usize) -> bool {
        if index < self.tabs.len() {
            self.active = Some(index);
            true
        } else {
            false
        }
    }

    /// Close a tab, returning it. The tab to its left becomes active.
    pub fn close(&mut self, index: usize) -> Option<Tab> {
        if index >= self.tabs.len() {
            return None;
        }
        let tab = self.tabs.remove(index);
        self.active = match self.active {
            _ if self.tabs.is_empty() => None,
            Some(active) if active > index => Some(active - 1),
            Some(active) if active == index => Some(index.saturating_sub(1)),
            other => other,
        };
        Some(tab)
    }

    /// Write a tab back to its file.
    pub fn save(&mut self, index: usize) -> Result<(), GateworkError> {
        let tab = self
            .tabs
            .get_mut(index)
            .ok_or_else(|| GateworkError::IoError(format!("no tab {index}")))?;
        let path = tab
            .path
            .clone()
            .ok_or_else(|| GateworkError::IoError(format!("tab {index} has no file")))?;
        write_scene_file(&path, &tab.scene)?;
        tab.dirty = false;
        Ok(())
    }

    /// Write a tab to `path` and remember it as the tab's file.
    pub fn save_as(&mut self, index: usize, path: impl Into<PathBuf>) -> Result<(), GateworkError> {
        let tab = self
            .tabs
            .get_mut(index)
            .ok_or_else(|| GateworkError::IoError(format!("no tab {index}")))?;
        let path = path.into();
        write_scene_file(&path, &tab.scene)?;
        tab.path = Some(path);
        tab.dirty = false;
        Ok(())
    }
}

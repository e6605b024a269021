//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Commands print their results; the computations behind them
//! (`simulate_scene`, `truth_table_rows`, `dependency_report`) return data
//! so they can be tested without capturing stdout.

use super::Context;
use crate::config::FileFormat;
use gatework_core::formats::{decode_document, document_hash};
use gatework_core::{
    DependencyKey, GateworkError, NodeId, NodeType, Registry, Scene, State, TabManager,
    document_to_scene, scene_to_bytes, scene_to_json,
};
use serde_json::json;
use std::path::{Path, PathBuf};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum scene file size accepted by the CLI (128 MB).
///
/// JSON documents are larger than their binary form, so this is twice the
/// binary payload limit.
const MAX_SCENE_FILE_SIZE: u64 = 128 * 1024 * 1024;

/// Widest component `truth-table` will enumerate.
pub const MAX_TRUTH_TABLE_INPUTS: usize = 16;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), GateworkError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GateworkError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(GateworkError::DeserializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve a scene file path to a canonical regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, GateworkError> {
    let canonical = path.canonicalize().map_err(|e| {
        GateworkError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(GateworkError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Registry over the configured component store.
pub fn open_registry(ctx: &Context) -> Result<Registry, GateworkError> {
    Ok(Registry::new(ctx.config.open_store()?))
}

/// Read and decode a scene file, resolving dependencies through `registry`.
pub fn load_scene(path: &Path, registry: &mut Registry) -> Result<Scene, GateworkError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_SCENE_FILE_SIZE)?;
    let bytes = std::fs::read(&path)
        .map_err(|e| GateworkError::IoError(format!("{}: {}", path.display(), e)))?;
    document_to_scene(decode_document(&bytes)?, registry)
}

/// Encoding to write: explicit flag, then file extension, then config.
pub fn output_format(ctx: &Context, path: &Path, explicit: Option<FileFormat>) -> FileFormat {
    explicit
        .or_else(|| FileFormat::from_path(path))
        .unwrap_or(ctx.config.default_format)
}

/// Encode and write a scene.
pub fn write_scene(path: &Path, scene: &Scene, format: FileFormat) -> Result<(), GateworkError> {
    let bytes = match format {
        FileFormat::Json => scene_to_json(scene)?.into_bytes(),
        FileFormat::Binary => scene_to_bytes(scene)?,
    };
    std::fs::write(path, bytes)
        .map_err(|e| GateworkError::IoError(format!("{}: {}", path.display(), e)))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Values of every output node, in id order.
pub fn output_values(scene: &Scene) -> Vec<(NodeId, State)> {
    scene
        .ids_of(NodeType::Output)
        .into_iter()
        .map(|id| (id, scene.get(id, 0)))
        .collect()
}

fn states_to_string(states: &[(NodeId, State)]) -> String {
    states.iter().map(|(_, s)| s.to_string()).collect()
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create a new scene file, optionally with a component boundary.
pub fn cmd_init(
    ctx: &Context,
    path: &Path,
    name: Option<String>,
    inputs: Option<u8>,
    outputs: Option<u8>,
    format: Option<FileFormat>,
    force: bool,
) -> Result<(), GateworkError> {
    if path.exists() && !force {
        return Err(GateworkError::IoError(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }

    let mut scene = if inputs.is_some() || outputs.is_some() {
        Scene::component(
            inputs.unwrap_or(0) as usize,
            outputs.unwrap_or(0) as usize,
        )?
    } else {
        Scene::new()
    };
    if let Some(name) = name {
        scene.set_name(name)?;
    }

    let format = output_format(ctx, path, format);
    write_scene(path, &scene, format)?;
    tracing::info!("created {} ({:?})", path.display(), format);

    if ctx.json_mode {
        print_json(&json!({
            "path": path.to_string_lossy(),
            "component": scene.is_component(),
            "format": format!("{:?}", format).to_lowercase(),
        }));
    } else {
        println!("Initialized new scene at {}", path.display());
    }
    Ok(())
}

// =============================================================================
// INFO COMMAND
// =============================================================================

/// Show a scene summary.
pub fn cmd_info(ctx: &Context, path: &Path) -> Result<(), GateworkError> {
    let mut registry = open_registry(ctx)?;
    let scene = load_scene(path, &mut registry)?;
    let meta = scene.meta();
    let boundary = scene
        .context()
        .map(|c| (c.input_count(), c.output_count()));
    let counts = [
        NodeType::Gate,
        NodeType::Input,
        NodeType::Output,
        NodeType::Component,
    ]
    .map(|ty| (ty, scene.ids_of(ty).len()));
    let outputs = output_values(&scene);

    if ctx.json_mode {
        let nodes: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(ty, n)| (ty.to_string(), json!(n)))
            .collect();
        print_json(&json!({
            "name": meta.name,
            "author": meta.author,
            "description": meta.description,
            "version": meta.version,
            "component": boundary.map(|(i, o)| json!({ "inputs": i, "outputs": o })),
            "nodes": nodes,
            "relations": scene.relation_count(),
            "dependencies": scene.dependencies().iter().map(|d| d.key.clone()).collect::<Vec<_>>(),
            "outputs": states_to_string(&outputs),
            "stable": scene.is_stable(),
        }));
        return Ok(());
    }

    println!("Gatework Scene");
    println!("==============");
    println!("File:        {}", path.display());
    println!("Name:        {}", meta.name);
    if !meta.author.is_empty() {
        println!("Author:      {}", meta.author);
    }
    println!("Version:     {}", meta.version);
    if let Some((inputs, outputs)) = boundary {
        println!("Component:   {} inputs, {} outputs", inputs, outputs);
    }
    println!();
    for (ty, n) in counts {
        println!("{:<12} {}", format!("{}s:", ty), n);
    }
    println!("{:<12} {}", "relations:", scene.relation_count());
    for dep in scene.dependencies() {
        println!("dependency:  {}", dep.key);
    }
    if !outputs.is_empty() {
        println!();
        println!("Outputs:     {}", states_to_string(&outputs));
    }
    Ok(())
}

// =============================================================================
// CONVERT COMMAND
// =============================================================================

/// Re-encode a scene file.
pub fn cmd_convert(
    ctx: &Context,
    input: &Path,
    output: &Path,
    format: Option<FileFormat>,
) -> Result<(), GateworkError> {
    let mut registry = open_registry(ctx)?;
    let scene = load_scene(input, &mut registry)?;
    let format = output_format(ctx, output, format);
    write_scene(output, &scene, format)?;

    if ctx.json_mode {
        print_json(&json!({
            "input": input.to_string_lossy(),
            "output": output.to_string_lossy(),
            "format": format!("{:?}", format).to_lowercase(),
        }));
    } else {
        println!("Converted {} -> {} ({:?})", input.display(), output.display(), format);
    }
    Ok(())
}

// =============================================================================
// SIMULATE COMMAND
// =============================================================================

/// Parse `SLOT=VALUE` where VALUE is 0/1/true/false.
pub fn parse_assignment(text: &str) -> Result<(u16, bool), GateworkError> {
    let invalid = || GateworkError::InvalidNode(format!("bad assignment '{text}', expected SLOT=0|1"));
    let (slot, value) = text.split_once('=').ok_or_else(invalid)?;
    let slot = slot.trim().parse::<u16>().map_err(|_| invalid())?;
    let value = match value.trim() {
        "1" | "true" => true,
        "0" | "false" => false,
        _ => return Err(invalid()),
    };
    Ok((slot, value))
}

/// Apply input assignments, run `ticks` clock steps and read the outputs.
pub fn simulate_scene(
    scene: &mut Scene,
    assignments: &[(u16, bool)],
    ticks: u64,
) -> Result<Vec<(NodeId, State)>, GateworkError> {
    for &(slot, value) in assignments {
        scene.set_input(NodeId::new(NodeType::Input, slot), value)?;
    }
    for _ in 0..ticks {
        scene.step();
    }
    if !scene.is_stable() {
        tracing::warn!("scene did not settle at frame {}", scene.frame());
    }
    Ok(output_values(scene))
}

/// Drive a scene file and print its outputs.
pub fn cmd_simulate(
    ctx: &Context,
    path: &Path,
    assignments: &[String],
    ticks: u64,
    save: bool,
) -> Result<(), GateworkError> {
    let assignments = assignments
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<Result<Vec<_>, _>>()?;

    let mut registry = open_registry(ctx)?;
    validate_file_size(&validate_file_path(path)?, MAX_SCENE_FILE_SIZE)?;
    let mut tabs = TabManager::new();
    let index = tabs.open_file(path, &mut registry)?;
    let tab = tabs
        .get_mut(index)
        .ok_or_else(|| GateworkError::IoError(format!("{} did not open", path.display())))?;
    let scene = tab.scene_mut();
    let outputs = simulate_scene(scene, &assignments, ticks)?;
    let (frame, stable) = (scene.frame(), scene.is_stable());

    if save {
        tabs.save(index)?;
    }

    if ctx.json_mode {
        let values: Vec<serde_json::Value> = outputs
            .iter()
            .map(|(id, state)| json!({ "output": id.index, "value": state.as_bool() }))
            .collect();
        print_json(&json!({
            "frame": frame,
            "stable": stable,
            "outputs": values,
        }));
        return Ok(());
    }

    println!("frame {}{}", frame, if stable { "" } else { " (unstable)" });
    for (id, state) in &outputs {
        println!("{:<10} {}", id.to_string(), state);
    }
    Ok(())
}

// =============================================================================
// TRUTH TABLE COMMAND
// =============================================================================

/// Packed `(input, output)` for every input combination of a component.
pub fn truth_table_rows(scene: &mut Scene) -> Result<Vec<(u64, u64)>, GateworkError> {
    let inputs = scene
        .context()
        .ok_or(GateworkError::NotAComponent)?
        .input_count();
    if inputs > MAX_TRUTH_TABLE_INPUTS {
        return Err(GateworkError::SocketLimit(inputs));
    }
    (0..1u64 << inputs)
        .map(|packed| Ok((packed, scene.execute(packed, 0)?)))
        .collect()
}

/// Bits of `word`, socket 0 first.
fn bits(word: u64, count: usize) -> String {
    (0..count)
        .map(|bit| if (word >> bit) & 1 == 1 { '1' } else { '0' })
        .collect()
}

/// Print a component's truth table.
pub fn cmd_truth_table(ctx: &Context, path: &Path) -> Result<(), GateworkError> {
    let mut registry = open_registry(ctx)?;
    let mut scene = load_scene(path, &mut registry)?;
    let rows = truth_table_rows(&mut scene)?;
    let (inputs, outputs) = scene
        .context()
        .map_or((0, 0), |c| (c.input_count(), c.output_count()));

    if ctx.json_mode {
        let rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|(i, o)| json!({ "input": i, "output": o }))
            .collect();
        print_json(&json!({
            "inputs": inputs,
            "outputs": outputs,
            "rows": rows,
        }));
        return Ok(());
    }

    println!("{:<width$} | out", "in", width = inputs.max(2));
    for (input, output) in rows {
        println!(
            "{:<width$} | {}",
            bits(input, inputs),
            bits(output, outputs),
            width = inputs.max(2)
        );
    }
    Ok(())
}

// =============================================================================
// PUBLISH COMMAND
// =============================================================================

/// Store a component scene in the library under `key`.
pub fn cmd_publish(ctx: &Context, path: &Path, key: &str) -> Result<(), GateworkError> {
    let mut registry = open_registry(ctx)?;
    let scene = load_scene(path, &mut registry)?;
    registry.publish(key, &scene)?;
    tracing::info!("published {} as {}", path.display(), key);

    if ctx.json_mode {
        print_json(&json!({ "key": key, "library": ctx.config.library_dir.to_string_lossy() }));
    } else {
        println!("Published {} as {}", path.display(), key);
    }
    Ok(())
}

// =============================================================================
// DEPS COMMAND
// =============================================================================

/// One dependency of a scene file and how it resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    pub key: String,
    pub source: Option<String>,
    pub result: Result<usize, String>,
}

/// Resolve each dependency string of a scene file independently.
///
/// The file itself is only decoded, so a broken dependency is reported
/// instead of aborting the listing.
pub fn dependency_report(
    path: &Path,
    registry: &mut Registry,
) -> Result<Vec<DependencyStatus>, GateworkError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_SCENE_FILE_SIZE)?;
    let bytes = std::fs::read(&path)
        .map_err(|e| GateworkError::IoError(format!("{}: {}", path.display(), e)))?;
    let document = decode_document(&bytes)?;

    Ok(document
        .dependencies
        .into_iter()
        .map(|key| {
            let source = DependencyKey::parse(&key)
                .ok()
                .map(|k| format!("{:?}", k.source()).to_lowercase());
            let result = registry
                .resolve(&key)
                .map(Scene::node_count)
                .map_err(|e| e.to_string());
            DependencyStatus {
                key,
                source,
                result,
            }
        })
        .collect())
}

/// List a scene's dependencies.
pub fn cmd_deps(ctx: &Context, path: &Path) -> Result<(), GateworkError> {
    let mut registry = open_registry(ctx)?;
    let report = dependency_report(path, &mut registry)?;

    if ctx.json_mode {
        let entries: Vec<serde_json::Value> = report
            .iter()
            .map(|d| {
                json!({
                    "key": d.key,
                    "source": d.source,
                    "resolved": d.result.is_ok(),
                    "nodes": d.result.as_ref().ok(),
                    "error": d.result.as_ref().err(),
                })
            })
            .collect();
        print_json(&json!({ "dependencies": entries }));
        return Ok(());
    }

    if report.is_empty() {
        println!("{} has no dependencies", path.display());
    }
    for dep in &report {
        match &dep.result {
            Ok(nodes) => println!("{:<32} ok ({} nodes)", dep.key, nodes),
            Err(e) => println!("{:<32} error: {}", dep.key, e),
        }
    }
    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Compute the BLAKE3 hash of a scene's binary encoding.
pub fn cmd_hash(ctx: &Context, path: &Path) -> Result<(), GateworkError> {
    let mut registry = open_registry(ctx)?;
    let scene = load_scene(path, &mut registry)?;
    let hash = document_hash(&scene)?;

    if ctx.json_mode {
        print_json(&json!({ "file": path.to_string_lossy(), "blake3": hash }));
    } else {
        println!("BLAKE3: {}", hash);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_parse() {
        assert_eq!(parse_assignment("0=1").expect("parse"), (0, true));
        assert_eq!(parse_assignment(" 3 = false").expect("parse"), (3, false));
        assert!(parse_assignment("3").is_err());
        assert!(parse_assignment("x=1").is_err());
        assert!(parse_assignment("1=2").is_err());
    }

    #[test]
    fn bits_are_socket_ordered() {
        assert_eq!(bits(0b001, 3), "100");
        assert_eq!(bits(0b110, 3), "011");
        assert_eq!(bits(0, 0), "");
    }
}

//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use knot_bundler::Compilation;
use knot_bundler::graph::ModuleId;

/// Write a file under `dir`, creating parent directories.
pub fn write_file(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Find the one module whose identifier ends with `suffix`.
pub fn module_by_suffix(compilation: &Compilation, suffix: &str) -> ModuleId {
    let matches: Vec<ModuleId> = compilation
        .module_graph
        .module_ids_sorted()
        .into_iter()
        .filter(|id| id.as_str().ends_with(suffix))
        .collect();
    assert_eq!(
        matches.len(),
        1,
        "expected exactly one module ending in {suffix:?}, got {matches:?}"
    );
    matches.into_iter().next().unwrap()
}

/// Rendered id of a module, as it appears in emitted code.
pub fn rendered_id(compilation: &Compilation, module: &ModuleId) -> String {
    compilation
        .chunk_graph
        .module_id(module)
        .expect("module has an id")
        .to_js()
}

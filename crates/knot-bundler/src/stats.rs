//! Aggregated build statistics.
//!
//! A [`Stats`] snapshot is what `run` returns and what the `done` hook
//! carries - including on failure, where it wraps the error. Module-level
//! problems live in `errors`/`warnings`; only infrastructure failures
//! travel through the `Result` channel.

use serde::Serialize;

use crate::assets::EmitSummary;
use crate::compilation::Compilation;
use crate::diagnostics::Severity;

/// Per-asset emit outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AssetStat {
    pub name: String,
    pub size: usize,
    /// Asset is part of the build output (always true for produced assets,
    /// whether or not the file needed rewriting).
    pub emitted: bool,
    /// File content was actually written this run.
    pub written: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub compiler_name: String,
    pub hash: String,
    pub module_count: usize,
    pub chunk_count: usize,
    pub assets: Vec<AssetStat>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Stats {
    /// Snapshot a finished compilation plus what emit did.
    pub fn from_compilation(compilation: &Compilation, emit: &EmitSummary) -> Self {
        let assets = compilation
            .assets
            .iter()
            .map(|(name, asset)| AssetStat {
                name: name.clone(),
                size: asset.size(),
                emitted: true,
                written: emit.was_written(name),
            })
            .collect();

        Self {
            compiler_name: compilation.name.clone(),
            hash: compilation.hash.clone(),
            module_count: compilation.module_graph.module_count(),
            chunk_count: compilation.chunk_graph.chunk_count(),
            assets,
            errors: diagnostics_to_strings(compilation, Severity::Error),
            warnings: diagnostics_to_strings(compilation, Severity::Warning),
        }
    }

    /// Stats for a run that failed before producing a compilation.
    pub fn from_failure(compiler_name: &str, error: &crate::Error) -> Self {
        Self {
            compiler_name: compiler_name.to_string(),
            errors: vec![error.to_string()],
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

fn diagnostics_to_strings(compilation: &Compilation, severity: Severity) -> Vec<String> {
    let list = match severity {
        Severity::Error => &compilation.errors,
        Severity::Warning => &compilation.warnings,
    };
    list.iter().map(ToString::to_string).collect()
}

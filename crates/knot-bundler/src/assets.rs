//! Emitted assets and the output writer.
//!
//! Writes are atomic (temp file + rename) and traversal-safe: every output
//! path is normalized and checked to stay inside the output directory.
//! Unchanged content is detected with a size fast-negative followed by a
//! byte-exact compare and skipped - the asset still counts as emitted, the
//! file is just not rewritten.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use knot_graph::ModuleId;
use path_clean::PathClean;
use tracing::debug;

use crate::{Error, Result};

/// Where an asset came from.
#[derive(Debug, Clone, Default)]
pub struct AssetInfo {
    /// Truncated content hash.
    pub content_hash: String,
    /// Name of the chunk this asset renders, if any.
    pub from_chunk: Option<String>,
    /// Asset-module origin, if any.
    pub from_module: Option<ModuleId>,
}

/// An immutable rendered artifact plus metadata.
#[derive(Debug, Clone)]
pub struct Asset {
    pub source: Arc<str>,
    pub info: AssetInfo,
}

impl Asset {
    pub fn size(&self) -> usize {
        self.source.len()
    }
}

/// Assets by output filename, in creation order.
pub type Assets = IndexMap<String, Asset>;

/// What one emit pass did.
#[derive(Debug, Clone, Default)]
pub struct EmitSummary {
    /// Filenames actually written this pass.
    pub written: Vec<String>,
    /// Filenames skipped because on-disk content already matched.
    pub skipped: Vec<String>,
}

impl EmitSummary {
    pub fn was_written(&self, name: &str) -> bool {
        self.written.iter().any(|n| n == name)
    }
}

/// Write every asset under `dir`, once per distinct content.
pub async fn emit_assets(dir: &Path, assets: &Assets) -> Result<EmitSummary> {
    let dir = normalize_dir(dir)?;
    tokio::fs::create_dir_all(&dir).await?;

    let mut summary = EmitSummary::default();
    for (name, asset) in assets {
        let target = validate_output_path(&dir, name)?;
        if content_matches(&target, asset.source.as_bytes()).await {
            debug!(asset = %name, "emit skipped, content unchanged");
            summary.skipped.push(name.clone());
            continue;
        }
        write_atomic(&target, asset.source.as_bytes()).await?;
        debug!(asset = %name, bytes = asset.size(), "asset written");
        summary.written.push(name.clone());
    }
    Ok(summary)
}

fn normalize_dir(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.clean();
    if cleaned.is_absolute() {
        return Ok(cleaned);
    }
    Ok(std::env::current_dir()?.join(cleaned).clean())
}

/// Reject filenames that would land outside the output directory.
fn validate_output_path(base_dir: &Path, filename: &str) -> Result<PathBuf> {
    if filename.contains('\0') {
        return Err(Error::InvalidConfig(format!(
            "asset filename {filename:?} contains a null byte"
        )));
    }
    let full = base_dir.join(Path::new(filename)).clean();
    if !full.starts_with(base_dir) {
        return Err(Error::InvalidConfig(format!(
            "asset filename {filename:?} escapes the output directory"
        )));
    }
    Ok(full)
}

/// Size fast-negative, then byte-exact compare.
async fn content_matches(target: &Path, content: &[u8]) -> bool {
    let Ok(meta) = tokio::fs::metadata(target).await else {
        return false;
    };
    if !meta.is_file() || meta.len() != content.len() as u64 {
        return false;
    }
    match tokio::fs::read(target).await {
        Ok(existing) => existing == content,
        Err(_) => false,
    }
}

/// Temp file + rename; readers never observe partial content.
async fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = target.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    if let Err(e) = tokio::fs::rename(&tmp, target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

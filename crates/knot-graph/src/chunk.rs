use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::module::SourceKind;

/// Stable key for a chunk inside one compilation's [`ChunkGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkUkey(pub u32);

/// An output grouping of modules sharing one emitted artifact.
///
/// Created during seal, one per entrypoint in this core (further splitting
/// is an extension point). The `id` is assigned deterministically after the
/// chunk graph is built; content hashes are filled by the hashing pass.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Configured name (the entry name for entry chunks).
    pub name: String,
    /// Rendered chunk id; `None` until id assignment ran.
    pub id: Option<String>,
    /// Chunk carries the bootstrap runtime.
    pub has_runtime: bool,
    /// Output filename template (`[name]`, `[id]`, `[contenthash]`).
    pub filename_template: String,
    /// Content hash per source kind, filled during seal.
    pub content_hashes: BTreeMap<SourceKind, String>,
}

impl Chunk {
    /// Create an entry chunk carrying the runtime.
    pub fn entry(name: impl Into<String>, filename_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            has_runtime: true,
            filename_template: filename_template.into(),
            content_hashes: BTreeMap::new(),
        }
    }

    /// The rendered id, falling back to the name before assignment.
    pub fn id_or_name(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// Expand the filename template with this chunk's values.
    pub fn rendered_filename(&self, compilation_hash: &str) -> String {
        let content_hash = self
            .content_hashes
            .get(&SourceKind::Javascript)
            .map(String::as_str)
            .unwrap_or("");
        self.filename_template
            .replace("[name]", &self.name)
            .replace("[id]", self.id_or_name())
            .replace("[contenthash]", content_hash)
            .replace("[hash]", compilation_hash)
    }
}

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexSet;
use rustc_hash::FxHashMap;

use crate::chunk::{Chunk, ChunkUkey};
use crate::module_id::ModuleId;
use crate::runtime::RuntimeRequirements;

/// Id a module renders under in emitted code.
///
/// Numeric ids enable the dense-array module map encoding; string ids are
/// used when records pin a non-numeric id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleCodeId {
    Num(u32),
    Str(String),
}

impl ModuleCodeId {
    /// Render as a JavaScript expression (object key / require argument).
    pub fn to_js(&self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Str(s) => serde_json::to_string(s).expect("string serializes"),
        }
    }

    pub fn as_num(&self) -> Option<u32> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for ModuleCodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Bidirectional index between chunks and modules, plus per-module rendered
/// id assignment and runtime requirement bookkeeping.
///
/// Owned by one compilation; built during seal, read during rendering.
/// Unlike the module graph it is single-threaded by construction, so plain
/// `&mut` mutation is fine.
#[derive(Default)]
pub struct ChunkGraph {
    chunks: Vec<Chunk>,
    chunk_modules: FxHashMap<ChunkUkey, IndexSet<ModuleId>>,
    module_chunks: FxHashMap<ModuleId, BTreeSet<ChunkUkey>>,
    module_ids: FxHashMap<ModuleId, ModuleCodeId>,
    chunk_requirements: FxHashMap<ChunkUkey, RuntimeRequirements>,
    module_requirements: FxHashMap<ModuleId, RuntimeRequirements>,
    /// Startup modules per chunk, in entry declaration order.
    entry_modules: FxHashMap<ChunkUkey, Vec<ModuleId>>,
}

impl ChunkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk(&mut self, chunk: Chunk) -> ChunkUkey {
        let ukey = ChunkUkey(self.chunks.len() as u32);
        self.chunks.push(chunk);
        ukey
    }

    pub fn chunk(&self, ukey: ChunkUkey) -> &Chunk {
        &self.chunks[ukey.0 as usize]
    }

    pub fn chunk_mut(&mut self, ukey: ChunkUkey) -> &mut Chunk {
        &mut self.chunks[ukey.0 as usize]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// All chunk keys, in creation (entry declaration) order.
    pub fn chunk_ukeys(&self) -> impl Iterator<Item = ChunkUkey> + '_ {
        (0..self.chunks.len() as u32).map(ChunkUkey)
    }

    pub fn chunk_by_name(&self, name: &str) -> Option<ChunkUkey> {
        self.chunks
            .iter()
            .position(|c| c.name == name)
            .map(|i| ChunkUkey(i as u32))
    }

    pub fn connect_chunk_and_module(&mut self, chunk: ChunkUkey, module: ModuleId) {
        self.chunk_modules
            .entry(chunk)
            .or_default()
            .insert(module.clone());
        self.module_chunks.entry(module).or_default().insert(chunk);
    }

    /// Member modules of a chunk, in discovery order.
    pub fn chunk_modules(&self, chunk: ChunkUkey) -> impl Iterator<Item = &ModuleId> + '_ {
        self.chunk_modules.get(&chunk).into_iter().flatten()
    }

    pub fn chunk_module_count(&self, chunk: ChunkUkey) -> usize {
        self.chunk_modules.get(&chunk).map_or(0, IndexSet::len)
    }

    pub fn is_module_in_chunk(&self, module: &ModuleId, chunk: ChunkUkey) -> bool {
        self.chunk_modules
            .get(&chunk)
            .is_some_and(|set| set.contains(module))
    }

    /// Chunks a module belongs to (ascending ukey order).
    pub fn module_chunks(&self, module: &ModuleId) -> impl Iterator<Item = ChunkUkey> + '_ {
        self.module_chunks
            .get(module)
            .into_iter()
            .flatten()
            .copied()
    }

    /// Number of chunks a module belongs to; ≥ 1 for every reachable module
    /// once sealed.
    pub fn module_chunk_count(&self, module: &ModuleId) -> usize {
        self.module_chunks.get(module).map_or(0, BTreeSet::len)
    }

    pub fn set_module_id(&mut self, module: ModuleId, id: ModuleCodeId) {
        self.module_ids.insert(module, id);
    }

    pub fn module_id(&self, module: &ModuleId) -> Option<&ModuleCodeId> {
        self.module_ids.get(module)
    }

    pub fn set_chunk_runtime_requirements(
        &mut self,
        chunk: ChunkUkey,
        requirements: RuntimeRequirements,
    ) {
        self.chunk_requirements.insert(chunk, requirements);
    }

    pub fn chunk_runtime_requirements(&self, chunk: ChunkUkey) -> RuntimeRequirements {
        self.chunk_requirements.get(&chunk).cloned().unwrap_or_default()
    }

    pub fn add_module_runtime_requirements(
        &mut self,
        module: &ModuleId,
        requirements: RuntimeRequirements,
    ) {
        self.module_requirements
            .entry(module.clone())
            .or_default()
            .extend(requirements);
    }

    pub fn module_runtime_requirements(&self, module: &ModuleId) -> RuntimeRequirements {
        self.module_requirements
            .get(module)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_entry_module(&mut self, chunk: ChunkUkey, module: ModuleId) {
        self.entry_modules.entry(chunk).or_default().push(module);
    }

    /// Startup modules of a chunk, in entry declaration order.
    pub fn entry_modules(&self, chunk: ChunkUkey) -> &[ModuleId] {
        self.entry_modules
            .get(&chunk)
            .map_or(&[], Vec::as_slice)
    }
}

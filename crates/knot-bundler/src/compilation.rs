//! One build attempt.
//!
//! A compilation owns its module graph, chunk graph, diagnostics and
//! assets. The compiler drives it through the fixed phase order: make
//! (graph construction), finish (diagnostics), seal (freeze, chunk, ids,
//! runtime requirements, codegen, render, hash).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use knot_graph::{
    BuildInfo, Chunk, ChunkGraph, ChunkUkey, DependencyOrigin, ModuleCodeId, ModuleGraph,
    ModuleId, RuntimeRequirement, RuntimeRequirements, SourceKind, expand_runtime_requirements,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::assets::{Asset, AssetInfo, Assets};
use crate::codegen::{CodegenResults, render_factory};
use crate::diagnostics::Diagnostic;
use crate::factory::{FactorizeOutcome, FactorizeRequest, NormalModuleFactory};
use crate::generator::{GenerateContext, asset_filename};
use crate::hash::short_hash;
use crate::hooks::{ChunkRuntimeRequirementsArgs, CompilationHooks};
use crate::options::CompilerOptions;
use crate::records::Records;
use crate::runtime_template::{ChunkRenderInput, RuntimeTemplate};
use crate::{Error, Result};

/// Render descriptor for one chunk, produced during seal and consumed by
/// emit.
#[derive(Debug, Clone)]
pub struct RenderManifestEntry {
    pub chunk: ChunkUkey,
    pub filename: String,
    pub source: Arc<str>,
    pub content_hash: String,
}

struct RenderedChunk {
    chunk: ChunkUkey,
    source: Arc<str>,
    content_hash: String,
}

/// Dedup/queue key for one factorize task: context, request, issuer.
type TaskKey = (PathBuf, String, Option<ModuleId>);

pub struct Compilation {
    pub name: String,
    pub options: Arc<CompilerOptions>,
    pub hooks: CompilationHooks,
    pub module_graph: ModuleGraph,
    pub chunk_graph: ChunkGraph,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub assets: Assets,
    pub codegen: CodegenResults,
    /// Aggregated file/missing/context path sets from every module build.
    pub build_info: BuildInfo,
    pub records: Records,
    pub manifest: Vec<RenderManifestEntry>,
    /// Compilation hash; empty until seal completes.
    pub hash: String,
}

impl Compilation {
    pub fn new(options: Arc<CompilerOptions>, records: Records) -> Self {
        Self {
            name: options.name.clone(),
            options,
            hooks: CompilationHooks::default(),
            module_graph: ModuleGraph::new(),
            chunk_graph: ChunkGraph::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            assets: Assets::new(),
            codegen: CodegenResults::default(),
            build_info: BuildInfo::default(),
            records,
            manifest: Vec::new(),
            hash: String::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Build the module graph from the entry set.
    ///
    /// Factorize tasks fan out on a `JoinSet` bounded by a semaphore; the
    /// graph is only touched from this driver loop, so completions are
    /// serialized. The phase ends when the outstanding task count returns
    /// to zero. A failing module records a diagnostic and its siblings
    /// keep building; the first infrastructure error stops scheduling new
    /// work but lets dispatched tasks settle.
    pub async fn make(&mut self, factory: &Arc<NormalModuleFactory>) -> Result<()> {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(8);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut join_set: JoinSet<(TaskKey, std::result::Result<FactorizeOutcome, Diagnostic>)> =
            JoinSet::new();
        let mut waiting: FxHashMap<TaskKey, Vec<(DependencyOrigin, usize)>> = FxHashMap::default();
        let mut finished: FxHashMap<TaskKey, Option<ModuleId>> = FxHashMap::default();
        let mut pending: Vec<(TaskKey, DependencyOrigin, usize)> = Vec::new();
        let mut fatal: Option<Error> = None;

        for (name, requests) in &self.options.entries {
            for (index, request) in requests.iter().enumerate() {
                pending.push((
                    (self.options.context.clone(), request.clone(), None),
                    DependencyOrigin::Entry(name.clone()),
                    index,
                ));
            }
        }
        debug!(entries = pending.len(), "make started");

        loop {
            while let Some((key, origin, index)) = pending.pop() {
                if let Some(done) = finished.get(&key) {
                    if let Some(id) = done {
                        if let Err(e) =
                            self.module_graph
                                .set_resolved_module(origin, index, id.clone())
                        {
                            fatal.get_or_insert(e.into());
                        }
                    }
                    continue;
                }
                if let Some(waiters) = waiting.get_mut(&key) {
                    waiters.push((origin, index));
                    continue;
                }
                if fatal.is_some() {
                    // Stop scheduling; in-flight work still settles below.
                    continue;
                }
                waiting.insert(key.clone(), vec![(origin, index)]);
                let factory = Arc::clone(factory);
                let semaphore = Arc::clone(&semaphore);
                let data = FactorizeRequest {
                    request: key.1.clone(),
                    context: key.0.clone(),
                    issuer: key.2.clone(),
                };
                join_set.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore closed unexpectedly");
                    let result = factory.create_and_build(&data).await;
                    (key, result)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (key, result) = match joined {
                Ok(completed) => completed,
                Err(join_error) => {
                    fatal.get_or_insert(Error::TaskPanic(join_error.to_string()));
                    continue;
                }
            };
            let waiters = waiting.remove(&key).unwrap_or_default();
            match result {
                Ok(FactorizeOutcome::Module { module, .. }) => {
                    let mut module = *module;
                    let id = module.id.clone();
                    let newly_added = !self.module_graph.has_module(&id);
                    if newly_added {
                        self.hooks.succeed_module.call(&mut module);
                    }
                    self.build_info.merge(&module.build_info);
                    let stored = match self.module_graph.add_module(module) {
                        Ok(stored) => stored,
                        Err(e) => {
                            fatal.get_or_insert(e.into());
                            continue;
                        }
                    };
                    for (origin, index) in waiters {
                        if let Err(e) =
                            self.module_graph
                                .set_resolved_module(origin, index, id.clone())
                        {
                            fatal.get_or_insert(e.into());
                        }
                    }
                    finished.insert(key, Some(id.clone()));
                    if newly_added {
                        let child_context = stored
                            .resource
                            .parent()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| self.options.context.clone());
                        for (index, dep) in stored.dependencies.iter().enumerate() {
                            if dep.request.is_empty() {
                                continue;
                            }
                            pending.push((
                                (child_context.clone(), dep.request.clone(), Some(id.clone())),
                                DependencyOrigin::Module(id.clone()),
                                index,
                            ));
                        }
                    }
                }
                Ok(FactorizeOutcome::Ignored) => {
                    finished.insert(key, None);
                }
                Err(diagnostic) => {
                    let mut diagnostic = diagnostic;
                    self.hooks.failed_module.call(&mut diagnostic);
                    self.errors.push(diagnostic);
                    finished.insert(key, None);
                }
            }
        }

        if let Some(error) = fatal {
            return Err(error);
        }
        info!(
            modules = self.module_graph.module_count(),
            connections = self.module_graph.connection_count(),
            errors = self.errors.len(),
            "make finished"
        );
        Ok(())
    }

    /// Post-make diagnostics pass: give the collected errors and warnings
    /// a deterministic order regardless of task completion order.
    pub fn finish(&mut self) {
        let sort_key = |d: &Diagnostic| {
            (
                d.module.as_ref().map(ToString::to_string),
                d.request.clone(),
                d.message.clone(),
            )
        };
        self.errors.sort_by_key(sort_key);
        self.warnings.sort_by_key(sort_key);
    }

    /// Freeze the graph and produce chunks, ids, runtime requirements,
    /// generated code, the render manifest and the compilation hash.
    pub fn seal(&mut self, factory: &NormalModuleFactory) -> Result<()> {
        debug!("seal started");
        self.module_graph.seal();

        self.build_chunk_graph();
        self.hooks.seal.call(&mut self.chunk_graph);

        self.assign_ids();
        self.run_codegen(factory)?;
        let rendered = self.render_chunks()?;

        // Compilation hash covers every chunk's content hash; filename
        // templates expand against it afterwards.
        let mut hash_input = String::new();
        for chunk in &rendered {
            hash_input.push_str(&chunk.content_hash);
        }
        self.hash = short_hash(hash_input.as_bytes(), self.options.output.hash_length);

        for chunk in rendered {
            let filename = self
                .chunk_graph
                .chunk(chunk.chunk)
                .rendered_filename(&self.hash);
            self.assets.insert(
                filename.clone(),
                Asset {
                    source: Arc::clone(&chunk.source),
                    info: AssetInfo {
                        content_hash: chunk.content_hash.clone(),
                        from_chunk: Some(self.chunk_graph.chunk(chunk.chunk).name.clone()),
                        from_module: None,
                    },
                },
            );
            self.manifest.push(RenderManifestEntry {
                chunk: chunk.chunk,
                filename,
                source: chunk.source,
                content_hash: chunk.content_hash,
            });
        }

        self.hooks.process_assets.call(&mut self.assets);
        info!(
            chunks = self.chunk_graph.chunk_count(),
            assets = self.assets.len(),
            hash = %self.hash,
            "seal finished"
        );
        Ok(())
    }

    /// One chunk per entry, each claiming the transitive closure of
    /// modules reachable from its entry modules. Shared modules land in
    /// every chunk that reaches them.
    fn build_chunk_graph(&mut self) {
        let entry_names: Vec<String> = self.options.entries.keys().cloned().collect();
        for name in entry_names {
            let ukey = self
                .chunk_graph
                .add_chunk(Chunk::entry(&name, &self.options.output.filename));
            let entry_modules = self.module_graph.entry_targets_for(&name);
            if entry_modules.is_empty() {
                self.warnings
                    .push(Diagnostic::warning(&name, "entry produced no modules"));
            }
            for module in &entry_modules {
                self.chunk_graph.add_entry_module(ukey, module.clone());
            }

            let mut stack: Vec<ModuleId> = entry_modules.into_iter().rev().collect();
            while let Some(id) = stack.pop() {
                if self.chunk_graph.is_module_in_chunk(&id, ukey) {
                    continue;
                }
                self.chunk_graph.connect_chunk_and_module(ukey, id.clone());
                for target in self.module_graph.outgoing(&id).into_iter().rev() {
                    stack.push(target);
                }
            }
        }
    }

    /// Deterministic id assignment: records-pinned ids first, then fresh
    /// numeric ids in identifier order, skipping taken numbers.
    fn assign_ids(&mut self) {
        let reachable = self.reachable_modules();
        let compiler = self.name.clone();

        let mut taken_numeric: FxHashSet<u32> = FxHashSet::default();
        let mut assignments: Vec<(ModuleId, ModuleCodeId)> = Vec::new();
        let mut unassigned: Vec<ModuleId> = Vec::new();
        for id in &reachable {
            match self.records.recorded_module_id(&compiler, id.as_str()) {
                Some(code) => {
                    if let Some(n) = code.as_num() {
                        taken_numeric.insert(n);
                    }
                    assignments.push((id.clone(), code));
                }
                None => unassigned.push(id.clone()),
            }
        }
        let mut next = 0u32;
        for id in unassigned {
            while taken_numeric.contains(&next) {
                next += 1;
            }
            taken_numeric.insert(next);
            assignments.push((id, ModuleCodeId::Num(next)));
        }
        for (id, code) in assignments {
            self.records.set_module_id(&compiler, id.as_str(), &code);
            self.chunk_graph.set_module_id(id, code);
        }

        for ukey in self.chunk_graph.chunk_ukeys().collect::<Vec<_>>() {
            let name = self.chunk_graph.chunk(ukey).name.clone();
            let id = self
                .records
                .recorded_chunk_id(&compiler, &name)
                .unwrap_or_else(|| name.clone());
            self.records.set_chunk_id(&compiler, &name, &id);
            self.chunk_graph.chunk_mut(ukey).id = Some(id);
        }
    }

    /// Modules assigned to at least one chunk, sorted by identifier.
    fn reachable_modules(&self) -> BTreeSet<ModuleId> {
        let mut reachable = BTreeSet::new();
        for ukey in self.chunk_graph.chunk_ukeys() {
            reachable.extend(self.chunk_graph.chunk_modules(ukey).cloned());
        }
        reachable
    }

    /// Generate once per module per required source kind; asset-kind
    /// results register their emitted file immediately.
    fn run_codegen(&mut self, factory: &NormalModuleFactory) -> Result<()> {
        for id in self.reachable_modules() {
            let module = self
                .module_graph
                .module(&id)
                .ok_or_else(|| Error::Render {
                    module: id.to_string(),
                    message: "module vanished before codegen".into(),
                })?;
            for kind in module.module_type.source_kinds() {
                if self.codegen.contains(&id, *kind) {
                    continue;
                }
                let generator = factory.generator_for(module.module_type, &module.generator_options);
                let generated = {
                    let ctx = GenerateContext {
                        module_graph: &self.module_graph,
                        chunk_graph: &self.chunk_graph,
                        output: &self.options.output,
                        source_kind: *kind,
                    };
                    generator.generate(&module, &ctx)?
                };
                match kind {
                    SourceKind::Javascript => {
                        self.chunk_graph.add_module_runtime_requirements(
                            &id,
                            generated.runtime_requirements.clone(),
                        );
                    }
                    SourceKind::Asset => {
                        let filename = asset_filename(&module, &self.options.output);
                        let content_hash =
                            short_hash(generated.source.as_bytes(), self.options.output.hash_length);
                        self.assets.insert(
                            filename,
                            Asset {
                                source: Arc::from(generated.source.as_str()),
                                info: AssetInfo {
                                    content_hash,
                                    from_chunk: None,
                                    from_module: Some(id.clone()),
                                },
                            },
                        );
                    }
                }
                self.codegen.insert(id.clone(), *kind, generated);
            }
        }
        Ok(())
    }

    /// The inlining optimization preconditions, computed per chunk.
    fn can_inline_entry(
        &self,
        requirements: &RuntimeRequirements,
        entry_modules: &[ModuleId],
    ) -> bool {
        if entry_modules.len() != 1 {
            return false;
        }
        if requirements.contains(&RuntimeRequirement::ModuleFactories)
            || requirements.contains(&RuntimeRequirement::ModuleCacheExposed)
            || requirements.contains(&RuntimeRequirement::InterceptModuleExecution)
            || requirements.contains(&RuntimeRequirement::ReturnExportsFromRuntime)
        {
            return false;
        }
        let entry = &entry_modules[0];
        if self.module_graph.incoming_module_count(entry) > 0 {
            return false;
        }
        let Some(module) = self.module_graph.module(entry) else {
            return false;
        };
        !(module.build_meta.uses_module
            || module.build_meta.uses_exports
            || !module.build_meta.exports.is_empty())
    }

    /// Propagate runtime requirements per chunk and render each chunk.
    fn render_chunks(&mut self) -> Result<Vec<RenderedChunk>> {
        let template = RuntimeTemplate::from_output(&self.options.output);
        let mut rendered = Vec::new();

        for ukey in self.chunk_graph.chunk_ukeys().collect::<Vec<_>>() {
            let members: Vec<ModuleId> = self.chunk_graph.chunk_modules(ukey).cloned().collect();

            // Union of member requirements, then the extension hook, then
            // template-implied additions and the implication closure.
            let mut requirements = RuntimeRequirements::new();
            for member in &members {
                requirements.extend(self.chunk_graph.module_runtime_requirements(member));
            }
            let chunk_name = self.chunk_graph.chunk(ukey).name.clone();
            let mut hook_args = ChunkRuntimeRequirementsArgs {
                chunk_name,
                requirements,
            };
            self.hooks
                .additional_chunk_runtime_requirements
                .call(&mut hook_args);
            let mut requirements = hook_args.requirements;

            let entry_modules: Vec<ModuleId> = self.chunk_graph.entry_modules(ukey).to_vec();
            let inline = self.can_inline_entry(&requirements, &entry_modules);
            if !inline && !entry_modules.is_empty() {
                requirements.insert(RuntimeRequirement::StartupEntrypoint);
            }
            expand_runtime_requirements(&mut requirements);
            self.chunk_graph
                .set_chunk_runtime_requirements(ukey, requirements.clone());

            let mut factories = Vec::new();
            let mut all_strict = !members.is_empty();
            let mut inlined_entry = None;
            for member in &members {
                let module = self.module_graph.module(member).ok_or_else(|| {
                    Error::Render {
                        module: member.to_string(),
                        message: "module vanished before render".into(),
                    }
                })?;
                if !module.build_meta.strict {
                    all_strict = false;
                }
                let generated = self
                    .codegen
                    .get(member, SourceKind::Javascript)
                    .ok_or_else(|| Error::Render {
                        module: member.to_string(),
                        message: "missing generated code".into(),
                    })?;
                if inline && entry_modules.first() == Some(member) {
                    inlined_entry = Some(generated.source.clone());
                    continue;
                }
                let member_requirements = self.chunk_graph.module_runtime_requirements(member);
                let id = self
                    .chunk_graph
                    .module_id(member)
                    .ok_or_else(|| Error::Render {
                        module: member.to_string(),
                        message: "module has no assigned id".into(),
                    })?
                    .clone();
                factories.push((
                    id,
                    render_factory(
                        &generated.source,
                        module.build_meta.uses_module,
                        module.build_meta.uses_exports || !module.build_meta.exports.is_empty(),
                        member_requirements.contains(&RuntimeRequirement::Require),
                    ),
                ));
            }

            let startup_ids = if inline {
                Vec::new()
            } else {
                entry_modules
                    .iter()
                    .map(|member| {
                        self.chunk_graph
                            .module_id(member)
                            .cloned()
                            .ok_or_else(|| Error::Render {
                                module: member.to_string(),
                                message: "entry module has no assigned id".into(),
                            })
                    })
                    .collect::<Result<Vec<_>>>()?
            };

            let source = template.render_chunk(&ChunkRenderInput {
                factories,
                requirements: &requirements,
                startup_ids,
                inlined_entry,
                all_strict,
            });
            let content_hash = short_hash(source.as_bytes(), self.options.output.hash_length);
            self.chunk_graph
                .chunk_mut(ukey)
                .content_hashes
                .insert(SourceKind::Javascript, content_hash.clone());
            rendered.push(RenderedChunk {
                chunk: ukey,
                source: Arc::from(source),
                content_hash,
            });
        }
        Ok(rendered)
    }
}

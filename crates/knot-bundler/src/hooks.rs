//! Hook points exposed by the compiler, compilation and module factory.
//!
//! One field per lifecycle transition, using the typed hook variants from
//! `knot-hooks`. Plugins register handlers before `run`; the structs are
//! plain fields so the whole surface is visible here.

use std::path::PathBuf;

use knot_graph::{ChunkGraph, Module, ModuleType, RuntimeRequirements};
use knot_hooks::{
    AsyncParallelHook, AsyncSeriesHook, SyncBailHook, SyncSeriesHook, SyncWaterfallHook,
};

use crate::assets::Assets;
use crate::compilation::Compilation;
use crate::diagnostics::Diagnostic;
use crate::factory::FactorizeRequest;
use crate::generator::Generator;
use crate::parser::Parser;
use crate::stats::Stats;

/// Argument of the compiler-level run hooks.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub compiler_name: String,
}

/// Argument of the compile-boundary hooks.
#[derive(Debug, Clone)]
pub struct CompilationParams {
    pub compiler_name: String,
}

/// Compiler lifecycle hooks, fired in the order they are declared.
#[derive(Default)]
pub struct CompilerHooks {
    pub before_run: AsyncSeriesHook<RunArgs>,
    pub run: AsyncSeriesHook<RunArgs>,
    pub before_compile: AsyncSeriesHook<CompilationParams>,
    pub compile: SyncSeriesHook<CompilationParams>,
    /// First shot at a fresh compilation; fired before `compilation`.
    pub this_compilation: SyncSeriesHook<Compilation>,
    pub compilation: SyncSeriesHook<Compilation>,
    /// Fired at the start of the make phase; handlers may seed extra state
    /// through the compilation's interior-mutable graph.
    pub make: AsyncParallelHook<Compilation>,
    pub finish_make: AsyncSeriesHook<Compilation>,
    pub after_compile: AsyncSeriesHook<Compilation>,
    pub emit: AsyncSeriesHook<Compilation>,
    pub after_emit: AsyncSeriesHook<Compilation>,
    /// Always fired, success or failure, with the aggregated stats.
    pub done: SyncSeriesHook<Stats>,
    pub after_done: SyncSeriesHook<Stats>,
}

/// Per-chunk runtime requirement extension point.
#[derive(Debug, Clone)]
pub struct ChunkRuntimeRequirementsArgs {
    pub chunk_name: String,
    pub requirements: RuntimeRequirements,
}

/// Hooks owned by one compilation instance.
///
/// The compilation owns its extension table outright; nothing is keyed off
/// the compilation from the outside.
#[derive(Default)]
pub struct CompilationHooks {
    /// A module finished building, before it joins the graph.
    pub succeed_module: SyncSeriesHook<Module>,
    /// A module failed to build; the diagnostic is about to be collected.
    pub failed_module: SyncSeriesHook<Diagnostic>,
    /// The chunk graph was constructed from the entrypoints.
    pub seal: SyncSeriesHook<ChunkGraph>,
    /// Inject extra runtime requirements per chunk.
    pub additional_chunk_runtime_requirements: SyncSeriesHook<ChunkRuntimeRequirementsArgs>,
    /// Final chance to add/replace assets before emit.
    pub process_assets: SyncSeriesHook<Assets>,
}

/// Outcome a `before_resolve` handler can force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorizeDecision {
    /// Skip this dependency entirely; no module, no connection.
    Ignore,
}

/// Argument of the `resolve` bail hook.
#[derive(Debug, Clone)]
pub struct ResolveArgs {
    pub context: PathBuf,
    pub request: String,
}

/// Mutable view of a resolved request before the module is created.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub resource: PathBuf,
    pub query: String,
    pub loaders: Vec<String>,
    pub module_type: ModuleType,
}

/// Argument of the parser/generator creation hooks.
#[derive(Debug, Clone)]
pub struct ParserGeneratorArgs {
    pub module_type: ModuleType,
    pub options: serde_json::Value,
}

/// Module factory hooks, fired per factorize request.
#[derive(Default)]
pub struct FactoryHooks {
    /// Bail to ignore a request before any resolution work.
    pub before_resolve: SyncBailHook<FactorizeRequest, FactorizeDecision>,
    /// Bail to supply a finished module, short-circuiting the pipeline.
    pub factorize: SyncBailHook<FactorizeRequest, Module>,
    /// Bail to override resource resolution.
    pub resolve: SyncBailHook<ResolveArgs, PathBuf>,
    /// Adjust the resolved request before module creation.
    pub after_resolve: SyncSeriesHook<ResolvedRequest>,
    /// Bail to construct the module instance yourself.
    pub create_module: SyncBailHook<ResolvedRequest, Module>,
    /// Waterfall over the created module.
    pub module: SyncWaterfallHook<Module>,
    /// Bail to supply a parser for a `(type, options)` pair.
    pub create_parser: SyncBailHook<ParserGeneratorArgs, Box<dyn Parser>>,
    /// Observer fired when a parser was created.
    pub parser: SyncSeriesHook<ParserGeneratorArgs>,
    /// Bail to supply a generator for a `(type, options)` pair.
    pub create_generator: SyncBailHook<ParserGeneratorArgs, Box<dyn Generator>>,
    /// Observer fired when a generator was created.
    pub generator: SyncSeriesHook<ParserGeneratorArgs>,
}

//! # knot-bundler
//!
//! The knot bundler core: a plugin-driven compiler that resolves entry
//! requests into a module graph, groups modules into chunks and renders
//! self-executing output with a minimal module-loading runtime.
//!
//! ## Quick start
//!
//! ```no_run
//! use knot_bundler::{Compiler, CompilerOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = CompilerOptions::new("./project")
//!     .entry("main", "./src/index.js")
//!     .output_dir("dist");
//!
//! let compiler = Compiler::new(options)?;
//! let stats = compiler.run().await?;
//! for asset in &stats.assets {
//!     println!("{} ({} bytes, written: {})", asset.name, asset.size, asset.written);
//! }
//! # Ok(()) }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Compiler::run
//!   └─ Compilation::make      factory + resolver build the module graph
//!   └─ Compilation::finish    diagnostics ordering
//!   └─ Compilation::seal      freeze graph → chunk graph → ids →
//!                             runtime requirements → codegen → render
//!   └─ emit_assets            byte-compare + atomic writes
//! ```
//!
//! The module/chunk graph data structures live in `knot-graph`; the typed
//! hook primitives every lifecycle transition fires live in `knot-hooks`.
//! Resolution (`Resolver`) and loader execution (`LoaderRegistry`) are
//! collaborator seams with shipped default implementations.
//!
//! ## Error taxonomy
//!
//! Infrastructure failures (concurrent run, rule compilation, renders,
//! I/O) surface as [`Error`] through the `Result` channel. Per-module
//! build problems are collected as [`Diagnostic`]s on the compilation and
//! ride inside [`Stats`] - sibling modules keep building.

pub mod assets;
pub mod codegen;
pub mod compilation;
pub mod compiler;
pub mod diagnostics;
pub mod factory;
pub mod generator;
pub mod hash;
pub mod hooks;
pub mod loader;
pub mod options;
pub mod parser;
pub mod records;
pub mod request;
pub mod resolver;
pub mod rules;
pub mod runtime_template;
pub mod stats;

// Logging utilities (optional, enabled with the "logging" feature)
#[cfg(feature = "logging")]
pub mod logging;

#[cfg(feature = "logging")]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use assets::{Asset, AssetInfo, Assets, EmitSummary, emit_assets};
pub use compilation::{Compilation, RenderManifestEntry};
pub use compiler::Compiler;
pub use diagnostics::{Diagnostic, Severity};
pub use factory::{FactorizeOutcome, FactorizeRequest, NormalModuleFactory};
pub use generator::{GenerateContext, Generated, Generator};
pub use hooks::{
    ChunkRuntimeRequirementsArgs, CompilationHooks, CompilationParams, CompilerHooks,
    FactorizeDecision, FactoryHooks, ParserGeneratorArgs, ResolveArgs, ResolvedRequest, RunArgs,
};
pub use loader::{LoaderContext, LoaderRegistry, LoaderTransform};
pub use options::{
    CompilerOptions, LoaderEnforce, ModuleRule, OutputOptions, ResolveOptions, RuleLoader,
};
pub use parser::{ParseResult, Parser};
pub use records::Records;
pub use request::{ParsedRequest, parse_loader_request};
pub use resolver::{FsResolver, Resolution, ResolveError, Resolver};
pub use rules::{RuleEffects, RuleMatchInput, RuleSet};
pub use runtime_template::RuntimeTemplate;
pub use stats::{AssetStat, Stats};

// Re-export the foundation crates for downstream consumers.
pub use knot_graph as graph;
pub use knot_hooks as typed_hooks;

/// Infrastructure-level error for knot-bundler operations.
///
/// Per-module build failures are not errors at this level; they are
/// [`Diagnostic`]s collected on the [`Compilation`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A module rule could not be compiled.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A run or watch is already in flight on this compiler.
    #[error("concurrent compilation: another run is already in flight")]
    ConcurrentCompilation,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A hook handler failed.
    #[error("hook error: {0}")]
    Hook(String),

    /// A factorize task panicked.
    #[error("build task panicked: {0}")]
    TaskPanic(String),

    /// Code generation or chunk rendering failed for a module.
    #[error("render error in {module}: {message}")]
    Render { module: String, message: String },

    /// Module graph invariant violation.
    #[error(transparent)]
    Graph(#[from] knot_graph::GraphError),

    /// Records file could not be read or written.
    #[error("records error: {0}")]
    Records(String),
}

impl Error {
    pub(crate) fn from_hook(error: knot_hooks::BoxError) -> Self {
        Self::Hook(error.to_string())
    }
}

/// Result type alias for knot-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

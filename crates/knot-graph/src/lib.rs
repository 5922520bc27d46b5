//! # knot-graph
//!
//! Pure graph data structures for the knot bundler.
//!
//! This crate holds the data model one compilation builds and consumes:
//! modules as nodes, dependencies as directed, ordered edges, and the chunk
//! graph derived from it at seal time. It contains no I/O and no
//! resolution/parsing logic - the `knot-bundler` crate drives these
//! structures.
//!
//! ## Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 ModuleGraph                   │
//! │  modules (nodes) + connections (dep → module) │
//! └───────────────┬───────────────────────────────┘
//!                 │  seal
//!                 ▼
//! ┌───────────────────────────────────────────────┐
//! │                 ChunkGraph                    │
//! │  chunk ↔ module index, rendered ids,          │
//! │  runtime requirements                         │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Thread safety
//!
//! [`ModuleGraph`] keeps its state behind a `parking_lot::RwLock`, so the
//! make phase can link modules from many completion callbacks while readers
//! query concurrently. Modules are stored as `Arc<Module>` - cloning a
//! lookup result is cheap. Once [`ModuleGraph::seal`] has run, every
//! mutating call fails with [`GraphError::Sealed`].

pub mod chunk;
pub mod chunk_graph;
pub mod dependency;
pub mod graph;
pub mod module;
pub mod module_id;
pub mod runtime;
pub mod span;

pub use chunk::{Chunk, ChunkUkey};
pub use chunk_graph::{ChunkGraph, ModuleCodeId};
pub use dependency::{Dependency, DependencyKind};
pub use graph::{Connection, DependencyOrigin, ModuleGraph};
pub use module::{BuildInfo, BuildMeta, Module, ModuleBuilder, ModuleType, Replacement, SourceKind};
pub use module_id::ModuleId;
pub use runtime::{RuntimeRequirement, RuntimeRequirements, expand_runtime_requirements};
pub use span::ReplacementSpan;

/// Error type for graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Mutation attempted after the graph was sealed.
    #[error("module graph is sealed; cannot {0}")]
    Sealed(&'static str),

    /// A connection referenced a module that was never added.
    #[error("unknown module: {0}")]
    UnknownModule(ModuleId),

    /// A connection referenced a dependency index the origin does not have.
    #[error("module {module} has no dependency at index {index}")]
    UnknownDependency { module: ModuleId, index: usize },
}

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

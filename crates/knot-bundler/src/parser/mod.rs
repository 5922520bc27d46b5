//! Per-type source parsers.
//!
//! A parser walks a module's transformed source and emits typed, ordered
//! [`Dependency`] records plus static rewrites - nothing else about
//! parsing is visible to the rest of the core. Parsers are created lazily
//! by the factory, once per distinct options object.

mod javascript;

use knot_graph::{BuildMeta, Dependency, Replacement};

pub use javascript::JavascriptParser;

/// What a parser learned from one source.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// Discovered dependencies in source-appearance order.
    pub dependencies: Vec<Dependency>,
    /// Graph-independent rewrites (export lowering, markers).
    pub replacements: Vec<Replacement>,
    pub build_meta: BuildMeta,
}

/// Walks transformed source and emits dependencies.
pub trait Parser: Send + Sync {
    fn parse(&self, source: &str) -> std::result::Result<ParseResult, String>;
}

/// Validates JSON sources; the generator exposes them via `module.exports`.
#[derive(Debug, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, source: &str) -> std::result::Result<ParseResult, String> {
        serde_json::from_str::<serde_json::Value>(source)
            .map_err(|e| format!("invalid JSON: {e}"))?;
        Ok(ParseResult {
            build_meta: BuildMeta {
                uses_module: true,
                ..BuildMeta::default()
            },
            ..ParseResult::default()
        })
    }
}

/// Asset sources carry no dependencies; the generator re-exports a URL.
#[derive(Debug, Default)]
pub struct AssetParser;

impl Parser for AssetParser {
    fn parse(&self, _source: &str) -> std::result::Result<ParseResult, String> {
        Ok(ParseResult {
            build_meta: BuildMeta {
                uses_module: true,
                ..BuildMeta::default()
            },
            ..ParseResult::default()
        })
    }
}

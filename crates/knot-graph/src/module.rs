use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dependency::Dependency;
use crate::module_id::ModuleId;
use crate::span::ReplacementSpan;

/// Module type assigned by the rule engine.
///
/// Determines which parser and generator handle the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    /// JavaScript, CommonJS and ESM syntax auto-detected.
    JavascriptAuto,
    /// JSON data exposed as `module.exports`.
    Json,
    /// File emitted as a separate asset, module re-exports its public URL.
    AssetResource,
}

impl ModuleType {
    /// Parse the rule-config spelling (`type: "asset/resource"`, ...).
    pub fn from_config(value: &str) -> Option<Self> {
        match value {
            "javascript/auto" => Some(Self::JavascriptAuto),
            "json" => Some(Self::Json),
            "asset/resource" => Some(Self::AssetResource),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JavascriptAuto => "javascript/auto",
            Self::Json => "json",
            Self::AssetResource => "asset/resource",
        }
    }

    /// The output source kinds this module type generates code for.
    pub fn source_kinds(&self) -> &'static [SourceKind] {
        match self {
            Self::JavascriptAuto | Self::Json => &[SourceKind::Javascript],
            Self::AssetResource => &[SourceKind::Javascript, SourceKind::Asset],
        }
    }
}

/// Output source kind a generator can produce for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// The module's factory body in the chunk's module map.
    Javascript,
    /// A standalone emitted file (asset modules).
    Asset,
}

/// Facts about a module's code established during build, consumed by
/// code generation and optimization passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMeta {
    /// Module executes in strict mode (`"use strict"` prologue or ESM syntax).
    pub strict: bool,
    /// Exported names discovered by the parser, in declaration order.
    pub exports: Vec<String>,
    /// Side-effect flag from rule settings; `None` means unknown.
    pub side_effect_free: Option<bool>,
    /// Module references `module` (e.g. `module.exports`).
    pub uses_module: bool,
    /// Module references the `exports` object directly.
    pub uses_exports: bool,
}

/// Paths touched while building a module, handed to the caller for cache
/// invalidation and watching. All three sets are deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub file_dependencies: BTreeSet<PathBuf>,
    pub missing_dependencies: BTreeSet<PathBuf>,
    pub context_dependencies: BTreeSet<PathBuf>,
}

impl BuildInfo {
    /// Merge another module's path sets into this one.
    pub fn merge(&mut self, other: &BuildInfo) {
        self.file_dependencies
            .extend(other.file_dependencies.iter().cloned());
        self.missing_dependencies
            .extend(other.missing_dependencies.iter().cloned());
        self.context_dependencies
            .extend(other.context_dependencies.iter().cloned());
    }
}

/// A parser-recorded static rewrite: replace `span` with `text`.
///
/// Used for rewrites whose replacement does not depend on the sealed graph
/// (export statement lowering); dependency sites are spliced separately by
/// the generator once module ids exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub span: ReplacementSpan,
    pub text: String,
}

impl Replacement {
    pub fn new(span: ReplacementSpan, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }
}

/// A built unit of code: one node in the module graph.
///
/// Created by the module factory, filled in during build (source read,
/// loaders applied, parsed for dependencies), then frozen along with the
/// graph at seal. Identity is the canonical identifier string - see
/// [`ModuleId`].
#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    /// Absolute resource path (without query).
    pub resource: PathBuf,
    /// Resource query including the leading `?`, or empty.
    pub query: String,
    /// The original, unresolved request string.
    pub raw_request: String,
    /// Resolved loader paths in canonical application order.
    pub loaders: Vec<String>,
    pub module_type: ModuleType,
    /// Transformed source after the loader chain ran; `None` until built.
    pub source: Option<Arc<str>>,
    /// Outgoing dependencies in parse order.
    pub dependencies: Vec<Dependency>,
    /// Static rewrites recorded by the parser.
    pub replacements: Vec<Replacement>,
    pub build_meta: BuildMeta,
    pub build_info: BuildInfo,
    /// Effective parser options merged from matching rules.
    pub parser_options: serde_json::Value,
    /// Effective generator options merged from matching rules.
    pub generator_options: serde_json::Value,
}

impl Module {
    /// Create a module builder with empty build state.
    pub fn builder(id: ModuleId, resource: PathBuf, module_type: ModuleType) -> ModuleBuilder {
        ModuleBuilder {
            module: Self {
                id,
                resource,
                query: String::new(),
                raw_request: String::new(),
                loaders: Vec::new(),
                module_type,
                source: None,
                dependencies: Vec::new(),
                replacements: Vec::new(),
                build_meta: BuildMeta::default(),
                build_info: BuildInfo::default(),
                parser_options: serde_json::Value::Null,
                generator_options: serde_json::Value::Null,
            },
        }
    }

    /// Readable name for diagnostics: the raw request if present, else the id.
    pub fn name_for_diagnostics(&self) -> &str {
        if self.raw_request.is_empty() {
            self.id.as_str()
        } else {
            &self.raw_request
        }
    }

    /// The transformed source, or empty if the module never built.
    pub fn source_or_empty(&self) -> &str {
        self.source.as_deref().unwrap_or("")
    }

    /// Dependencies that reference another module request (entry roots and
    /// rewrite-only records excluded).
    pub fn outgoing_requests(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| !d.request.is_empty())
    }
}

/// Builder for [`Module`] to avoid long constructor argument lists.
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.module.query = query.into();
        self
    }

    pub fn raw_request(mut self, raw_request: impl Into<String>) -> Self {
        self.module.raw_request = raw_request.into();
        self
    }

    pub fn loaders(mut self, loaders: Vec<String>) -> Self {
        self.module.loaders = loaders;
        self
    }

    pub fn source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.module.source = Some(source.into());
        self
    }

    pub fn dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.module.dependencies = dependencies;
        self
    }

    pub fn replacements(mut self, replacements: Vec<Replacement>) -> Self {
        self.module.replacements = replacements;
        self
    }

    pub fn build_meta(mut self, build_meta: BuildMeta) -> Self {
        self.module.build_meta = build_meta;
        self
    }

    pub fn build_info(mut self, build_info: BuildInfo) -> Self {
        self.module.build_info = build_info;
        self
    }

    pub fn parser_options(mut self, options: serde_json::Value) -> Self {
        self.module.parser_options = options;
        self
    }

    pub fn generator_options(mut self, options: serde_json::Value) -> Self {
        self.module.generator_options = options;
        self
    }

    pub fn build(self) -> Module {
        self.module
    }
}

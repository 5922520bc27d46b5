use serde::{Deserialize, Serialize};

use crate::span::ReplacementSpan;

/// What kind of reference produced a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Synthetic root dependency seeding graph construction from an entry.
    Entry,
    /// `require("...")`.
    CjsRequire,
    /// `import ... from "..."` / `import "..."`.
    EsmImport,
    /// `export ... from "..."` re-export.
    EsmExportFrom,
    /// `import("...")`.
    DynamicImport,
    /// URL reference to an emitted asset.
    AssetUrl,
}

/// A typed, ordered reference from a module (or entry root) to a request.
///
/// `order` is assigned by the parser in source-appearance order and is the
/// tie-breaker that keeps side-effect ordering deterministic even though
/// factorization completes out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub request: String,
    pub kind: DependencyKind,
    pub span: Option<ReplacementSpan>,
    pub order: u32,
    /// Text emitted before the spliced require expression.
    ///
    /// The generator replaces `span` with
    /// `{rewrite_prefix}require(<id>){rewrite_suffix}`, which is how import
    /// statements lower to binding declarations without the parser knowing
    /// the final module id.
    pub rewrite_prefix: String,
    /// Text emitted after the spliced require expression.
    pub rewrite_suffix: String,
}

impl Dependency {
    pub fn new(request: impl Into<String>, kind: DependencyKind, order: u32) -> Self {
        Self {
            request: request.into(),
            kind,
            span: None,
            order,
            rewrite_prefix: String::new(),
            rewrite_suffix: String::new(),
        }
    }

    pub fn with_span(mut self, span: ReplacementSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_rewrite(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.rewrite_prefix = prefix.into();
        self.rewrite_suffix = suffix.into();
        self
    }

    /// Entry dependencies are synthetic roots, not declared in any source.
    pub fn entry(request: impl Into<String>) -> Self {
        Self::new(request, DependencyKind::Entry, 0)
    }
}

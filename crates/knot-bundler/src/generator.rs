//! Per-module code generation.
//!
//! A generator turns one built module into a source fragment for one
//! output kind, reporting the runtime capabilities the fragment needs.
//! Requirements are collected by inspecting the generated code itself -
//! a fragment that never mentions the require function never demands it.

use std::path::Path;

use knot_graph::{
    ChunkGraph, Module, ModuleGraph, Replacement, RuntimeRequirement, RuntimeRequirements,
    SourceKind,
};
use memchr::memmem;

use crate::hash::short_hash;
use crate::options::OutputOptions;
use crate::{Error, Result};

/// Everything a generator may consult.
pub struct GenerateContext<'a> {
    pub module_graph: &'a ModuleGraph,
    pub chunk_graph: &'a ChunkGraph,
    pub output: &'a OutputOptions,
    pub source_kind: SourceKind,
}

/// One generated fragment plus the capabilities it demands.
#[derive(Debug, Clone)]
pub struct Generated {
    pub source: String,
    pub runtime_requirements: RuntimeRequirements,
}

/// Produces a [`Generated`] fragment for a module and source kind.
pub trait Generator: Send + Sync {
    fn generate(&self, module: &Module, ctx: &GenerateContext<'_>) -> Result<Generated>;
}

fn render_error(module: &Module, message: impl Into<String>) -> Error {
    Error::Render {
        module: module.id.to_string(),
        message: message.into(),
    }
}

/// Splice `replacements` into `source`. Spans must not overlap; same-point
/// insertions keep their insertion order.
pub fn apply_replacements(source: &str, mut replacements: Vec<Replacement>) -> String {
    replacements.sort_by_key(|r| r.span.start);
    let mut out = source.to_string();
    for replacement in replacements.iter().rev() {
        let (start, end) = (replacement.span.start as usize, replacement.span.end as usize);
        out.replace_range(start..end, &replacement.text);
    }
    out
}

/// Derive runtime requirements from a generated body's actual needs.
fn scan_requirements(module: &Module, body: &str) -> RuntimeRequirements {
    let mut requirements = RuntimeRequirements::new();
    let bytes = body.as_bytes();
    if memmem::find(bytes, b"__knot_require__").is_some() {
        requirements.insert(RuntimeRequirement::Require);
    }
    if memmem::find(bytes, b"__knot_require__.p").is_some() {
        requirements.insert(RuntimeRequirement::PublicPath);
    }
    if memmem::find(bytes, b"__knot_require__.n").is_some() {
        requirements.insert(RuntimeRequirement::CompatGetDefaultExport);
    }
    if module.build_meta.uses_module {
        requirements.insert(RuntimeRequirement::Module);
    }
    if module.build_meta.uses_exports || !module.build_meta.exports.is_empty() {
        requirements.insert(RuntimeRequirement::Exports);
    }
    requirements
}

/// Generates JavaScript module bodies by splicing dependency sites.
#[derive(Debug, Default)]
pub struct JavascriptGenerator;

impl Generator for JavascriptGenerator {
    fn generate(&self, module: &Module, ctx: &GenerateContext<'_>) -> Result<Generated> {
        if ctx.source_kind != SourceKind::Javascript {
            return Err(render_error(
                module,
                format!("javascript generator cannot emit {:?}", ctx.source_kind),
            ));
        }

        let source = module.source_or_empty();
        let mut splices = module.replacements.clone();

        for (index, dep) in module.dependencies.iter().enumerate() {
            let Some(span) = dep.span else {
                continue;
            };
            let expr = match ctx.module_graph.resolved_module(&module.id, index) {
                Some(target) => {
                    let code_id = ctx.chunk_graph.module_id(&target).ok_or_else(|| {
                        render_error(module, format!("module {target} has no assigned id"))
                    })?;
                    format!("__knot_require__({})", code_id.to_js())
                }
                // The dependency failed to resolve; the error was already
                // collected, the call site throws at runtime.
                None => {
                    let message = serde_json::to_string(&format!(
                        "Cannot find module '{}'",
                        dep.request
                    ))
                    .expect("string serializes");
                    format!(
                        "(function() {{ var e = new Error({message}); e.code = \"MODULE_NOT_FOUND\"; throw e; }})()"
                    )
                }
            };
            splices.push(Replacement::new(
                span,
                format!("{}{}{}", dep.rewrite_prefix, expr, dep.rewrite_suffix),
            ));
        }

        let body = apply_replacements(source, splices);
        let runtime_requirements = scan_requirements(module, &body);
        Ok(Generated {
            source: body,
            runtime_requirements,
        })
    }
}

/// Exposes JSON data as `module.exports`.
#[derive(Debug, Default)]
pub struct JsonGenerator;

impl Generator for JsonGenerator {
    fn generate(&self, module: &Module, ctx: &GenerateContext<'_>) -> Result<Generated> {
        if ctx.source_kind != SourceKind::Javascript {
            return Err(render_error(
                module,
                format!("json generator cannot emit {:?}", ctx.source_kind),
            ));
        }
        let body = format!("module.exports = {};", module.source_or_empty().trim());
        Ok(Generated {
            source: body,
            runtime_requirements: RuntimeRequirements::from([RuntimeRequirement::Module]),
        })
    }
}

/// Emits the asset file and a module re-exporting its public URL.
#[derive(Debug, Default)]
pub struct AssetGenerator;

impl Generator for AssetGenerator {
    fn generate(&self, module: &Module, ctx: &GenerateContext<'_>) -> Result<Generated> {
        match ctx.source_kind {
            SourceKind::Asset => Ok(Generated {
                source: module.source_or_empty().to_string(),
                runtime_requirements: RuntimeRequirements::new(),
            }),
            SourceKind::Javascript => {
                let filename = asset_filename(module, ctx.output);
                let url = serde_json::to_string(&filename).expect("string serializes");
                let body = format!("module.exports = __knot_require__.p + {url};");
                let runtime_requirements = scan_requirements(module, &body);
                Ok(Generated {
                    source: body,
                    runtime_requirements,
                })
            }
        }
    }
}

/// Output filename for an asset module.
///
/// Template comes from the rule's generator options (`filename` key),
/// defaulting to `[contenthash][ext]`. Supported placeholders: `[name]`,
/// `[ext]` (with dot), `[contenthash]`.
pub fn asset_filename(module: &Module, output: &OutputOptions) -> String {
    let template = module
        .generator_options
        .get("filename")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("[contenthash][ext]");

    let path = Path::new(&module.resource);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("asset");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let content_hash = short_hash(module.source_or_empty().as_bytes(), output.hash_length);

    template
        .replace("[name]", stem)
        .replace("[ext]", &ext)
        .replace("[contenthash]", &content_hash)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use knot_graph::{
        ChunkGraph, Dependency, DependencyKind, ModuleCodeId, ModuleGraph, ModuleId, ModuleType,
        ReplacementSpan,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn apply_replacements_handles_same_point_insertions() {
        let replacements = vec![
            Replacement::new(ReplacementSpan::new(2, 2), " X"),
            Replacement::new(ReplacementSpan::new(2, 2), " Y"),
        ];
        assert_eq!(apply_replacements("AB", replacements), "AB X Y");
    }

    #[test]
    fn javascript_generator_splices_require_sites() {
        let source = r#"const b = require("./b"); module.exports = b;"#;
        let graph = ModuleGraph::new();
        let a = Module::builder(
            ModuleId::new("/src/a.js"),
            PathBuf::from("/src/a.js"),
            ModuleType::JavascriptAuto,
        )
        .source(source)
        .dependencies(vec![Dependency::new("./b", DependencyKind::CjsRequire, 0)
            .with_span(ReplacementSpan::new(10, 24))])
        .build();
        let b = Module::builder(
            ModuleId::new("/src/b.js"),
            PathBuf::from("/src/b.js"),
            ModuleType::JavascriptAuto,
        )
        .build();
        graph.add_module(a.clone()).unwrap();
        graph.add_module(b).unwrap();
        graph
            .set_resolved_module(
                knot_graph::DependencyOrigin::Module(a.id.clone()),
                0,
                ModuleId::new("/src/b.js"),
            )
            .unwrap();

        let mut chunk_graph = ChunkGraph::new();
        chunk_graph.set_module_id(ModuleId::new("/src/b.js"), ModuleCodeId::Num(1));

        let output = OutputOptions::default();
        let ctx = GenerateContext {
            module_graph: &graph,
            chunk_graph: &chunk_graph,
            output: &output,
            source_kind: SourceKind::Javascript,
        };

        // uses_module comes from the parser normally; set it here directly.
        let mut a = a;
        a.build_meta.uses_module = true;

        let generated = JavascriptGenerator.generate(&a, &ctx).unwrap();
        assert_eq!(
            generated.source,
            "const b = __knot_require__(1); module.exports = b;"
        );
        assert!(generated
            .runtime_requirements
            .contains(&RuntimeRequirement::Require));
        assert!(generated
            .runtime_requirements
            .contains(&RuntimeRequirement::Module));
    }

    #[test]
    fn unresolved_dependency_becomes_a_throwing_expression() {
        let source = r#"require("./gone");"#;
        let graph = ModuleGraph::new();
        let module = Module::builder(
            ModuleId::new("/src/a.js"),
            PathBuf::from("/src/a.js"),
            ModuleType::JavascriptAuto,
        )
        .source(source)
        .dependencies(vec![Dependency::new(
            "./gone",
            DependencyKind::CjsRequire,
            0,
        )
        .with_span(ReplacementSpan::new(0, 17))])
        .build();
        graph.add_module(module.clone()).unwrap();

        let chunk_graph = ChunkGraph::new();
        let output = OutputOptions::default();
        let ctx = GenerateContext {
            module_graph: &graph,
            chunk_graph: &chunk_graph,
            output: &output,
            source_kind: SourceKind::Javascript,
        };

        let generated = JavascriptGenerator.generate(&module, &ctx).unwrap();
        assert!(generated.source.contains("MODULE_NOT_FOUND"));
        assert!(generated.source.contains("Cannot find module './gone'"));
    }

    #[test]
    fn asset_filename_uses_generator_options_template() {
        let module = Module::builder(
            ModuleId::new("/src/logo.svg"),
            PathBuf::from("/src/logo.svg"),
            ModuleType::AssetResource,
        )
        .source("<svg/>")
        .generator_options(serde_json::json!({"filename": "static/[name].[contenthash][ext]"}))
        .build();

        let output = OutputOptions {
            hash_length: 8,
            ..OutputOptions::default()
        };
        let filename = asset_filename(&module, &output);
        assert!(filename.starts_with("static/logo."));
        assert!(filename.ends_with(".svg"));
    }

    #[test]
    fn asset_generator_emits_url_module_and_raw_asset() {
        let module = Module::builder(
            ModuleId::new("/src/note.txt"),
            PathBuf::from("/src/note.txt"),
            ModuleType::AssetResource,
        )
        .source("hello")
        .build();

        let graph = ModuleGraph::new();
        let chunk_graph = ChunkGraph::new();
        let output = OutputOptions::default();

        let js = AssetGenerator
            .generate(
                &module,
                &GenerateContext {
                    module_graph: &graph,
                    chunk_graph: &chunk_graph,
                    output: &output,
                    source_kind: SourceKind::Javascript,
                },
            )
            .unwrap();
        assert!(js.source.starts_with("module.exports = __knot_require__.p + "));
        assert!(js
            .runtime_requirements
            .contains(&RuntimeRequirement::PublicPath));

        let asset = AssetGenerator
            .generate(
                &module,
                &GenerateContext {
                    module_graph: &graph,
                    chunk_graph: &chunk_graph,
                    output: &output,
                    source_kind: SourceKind::Asset,
                },
            )
            .unwrap();
        assert_eq!(asset.source, "hello");
        assert!(asset.runtime_requirements.is_empty());
    }
}

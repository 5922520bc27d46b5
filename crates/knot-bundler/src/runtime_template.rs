//! Bootstrap rendering.
//!
//! Assembles a chunk's final text: the module map, then one bootstrap
//! piece per required runtime capability, then the startup sequence. Every
//! piece is conditional - a chunk whose modules never touch the require
//! function gets neither the function nor the cache.

use knot_graph::{ModuleCodeId, RuntimeRequirement, RuntimeRequirements};

use crate::codegen::render_module_map;
use crate::options::OutputOptions;

/// Host-target parameters for rendering.
#[derive(Debug, Clone)]
pub struct RuntimeTemplate {
    pub iife: bool,
    pub strict_error_handling: bool,
    pub public_path: String,
}

impl RuntimeTemplate {
    pub fn from_output(output: &OutputOptions) -> Self {
        Self {
            iife: output.iife,
            strict_error_handling: output.strict_module_error_handling,
            public_path: output.public_path.clone(),
        }
    }
}

/// Everything one chunk render needs.
pub struct ChunkRenderInput<'a> {
    /// `(id, wrapped factory)` pairs; excludes an inlined entry.
    pub factories: Vec<(ModuleCodeId, String)>,
    pub requirements: &'a RuntimeRequirements,
    /// Startup module ids in entry declaration order; empty when inlined.
    pub startup_ids: Vec<ModuleCodeId>,
    /// Entry body executed directly instead of through the startup
    /// indirection.
    pub inlined_entry: Option<String>,
    /// Every member module is strict.
    pub all_strict: bool,
}

impl RuntimeTemplate {
    /// Render one chunk to its final text.
    pub fn render_chunk(&self, input: &ChunkRenderInput<'_>) -> String {
        let reqs = input.requirements;
        let mut body = String::new();

        if !input.factories.is_empty() || reqs.contains(&RuntimeRequirement::Require) {
            body.push_str("var __knot_modules__ = ");
            body.push_str(&render_module_map(&input.factories));
            body.push_str(";\n");
        }
        if reqs.contains(&RuntimeRequirement::ModuleCache) {
            body.push_str("var __knot_module_cache__ = {};\n");
        }
        if reqs.contains(&RuntimeRequirement::Require) {
            body.push_str(&self.render_require_fn(reqs));
        }
        if reqs.contains(&RuntimeRequirement::ModuleFactories) {
            body.push_str("__knot_require__.m = __knot_modules__;\n");
        }
        if reqs.contains(&RuntimeRequirement::ModuleCacheExposed) {
            body.push_str("__knot_require__.c = __knot_module_cache__;\n");
        }
        if reqs.contains(&RuntimeRequirement::CompatGetDefaultExport) {
            body.push_str(
                "__knot_require__.n = function(module) {\n  \
                 var getter = module && module.__esModule\n    \
                 ? function() { return module[\"default\"]; }\n    \
                 : function() { return module; };\n  \
                 return getter;\n};\n",
            );
        }
        if reqs.contains(&RuntimeRequirement::PublicPath) {
            let path = serde_json::to_string(&self.public_path).expect("string serializes");
            body.push_str(&format!("__knot_require__.p = {path};\n"));
        }
        if reqs.contains(&RuntimeRequirement::InterceptModuleExecution) {
            body.push_str("__knot_require__.i = [];\n");
        }

        if let Some(entry_body) = &input.inlined_entry {
            body.push_str(entry_body);
            if !entry_body.ends_with('\n') {
                body.push('\n');
            }
        } else if !input.startup_ids.is_empty() {
            body.push_str("var __knot_exports__ = {};\n");
            for id in &input.startup_ids {
                body.push_str(&format!("__knot_exports__ = __knot_require__({});\n", id.to_js()));
            }
            if self.iife && reqs.contains(&RuntimeRequirement::ReturnExportsFromRuntime) {
                body.push_str("return __knot_exports__;\n");
            }
        }

        let prologue = if input.all_strict {
            "\"use strict\";\n"
        } else {
            ""
        };
        if self.iife {
            format!("(() => {{\n{prologue}{body}}})();\n")
        } else {
            format!("{prologue}{body}")
        }
    }

    fn render_require_fn(&self, reqs: &RuntimeRequirements) -> String {
        let execute = if reqs.contains(&RuntimeRequirement::InterceptModuleExecution) {
            "var execOptions = { id: moduleId, module: module, \
             factory: __knot_modules__[moduleId], require: __knot_require__ };\n\
             __knot_require__.i.forEach(function(handler) { handler(execOptions); });\n\
             execOptions.factory.call(module.exports, execOptions.module, \
             execOptions.module.exports, execOptions.require);\n"
        } else {
            "__knot_modules__[moduleId](module, module.exports, __knot_require__);\n"
        };

        let mut out = String::from(
            "function __knot_require__(moduleId) {\n  \
             var cached = __knot_module_cache__[moduleId];\n  \
             if (cached !== undefined) {\n    \
             return cached.exports;\n  \
             }\n  \
             var module = (__knot_module_cache__[moduleId] = { exports: {} });\n",
        );
        if self.strict_error_handling {
            out.push_str("  var threw = true;\n  try {\n");
            for line in execute.trim_end().lines() {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(
                "    threw = false;\n  } finally {\n    \
                 if (threw) delete __knot_module_cache__[moduleId];\n  }\n",
            );
        } else {
            for line in execute.trim_end().lines() {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str("  return module.exports;\n}\n");
        out
    }
}

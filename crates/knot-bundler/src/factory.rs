//! The normal module factory.
//!
//! Turns one dependency request into one built module: request parsing,
//! resource resolution, rule matching, loader resolution (with the
//! `-loader` guidance fallback), identifier construction, parser/generator
//! lookup and the build itself (read, transform, parse). Failures here are
//! per-module diagnostics - the caller records them and keeps going.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use knot_graph::{BuildMeta, Module, ModuleId, ModuleType};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::diagnostics::Diagnostic;
use crate::generator::{AssetGenerator, Generator, JavascriptGenerator, JsonGenerator};
use crate::hooks::{
    FactoryHooks, FactorizeDecision, ParserGeneratorArgs, ResolveArgs, ResolvedRequest,
};
use crate::loader::LoaderRegistry;
use crate::options::CompilerOptions;
use crate::parser::{AssetParser, JavascriptParser, JsonParser, Parser};
use crate::request::{parse_loader_request, split_query};
use crate::resolver::Resolver;
use crate::rules::{RuleMatchInput, RuleSet};
use crate::Result;

/// One factorization request.
#[derive(Debug, Clone)]
pub struct FactorizeRequest {
    pub request: String,
    /// Directory the request resolves against.
    pub context: PathBuf,
    /// Identifier of the issuing module, `None` for entry roots.
    pub issuer: Option<ModuleId>,
}

/// What factorization produced.
#[derive(Debug)]
pub enum FactorizeOutcome {
    Module {
        module: Box<Module>,
        /// The module already carries source and dependencies.
        built: bool,
    },
    /// A hook decided this request produces no module at all.
    Ignored,
}

type ComponentCache<T> = Mutex<FxHashMap<(ModuleType, String), Arc<T>>>;

/// Builds modules for dependency requests.
///
/// Shared (via `Arc`) by every concurrent factorize task of a compilation;
/// the parser/generator caches and the opt-in unsafe dedup cache live here.
pub struct NormalModuleFactory {
    compiler_name: String,
    options: Arc<CompilerOptions>,
    rules: RuleSet,
    resolver: Arc<dyn Resolver>,
    loaders: Arc<LoaderRegistry>,
    pub hooks: FactoryHooks,
    parser_cache: ComponentCache<dyn Parser>,
    generator_cache: ComponentCache<dyn Generator>,
    /// Dependency-identity keyed result cache; opt-in, never invalidated
    /// mid-build.
    unsafe_cache: DashMap<(PathBuf, String), Module>,
}

impl NormalModuleFactory {
    /// Compile the rule set and construct the factory. Malformed rules
    /// fail here, before any build starts.
    pub fn new(
        options: Arc<CompilerOptions>,
        resolver: Arc<dyn Resolver>,
        loaders: Arc<LoaderRegistry>,
    ) -> Result<Self> {
        let rules = RuleSet::compile(&options.rules)?;
        Ok(Self {
            compiler_name: options.name.clone(),
            options,
            rules,
            resolver,
            loaders,
            hooks: FactoryHooks::default(),
            parser_cache: Mutex::new(FxHashMap::default()),
            generator_cache: Mutex::new(FxHashMap::default()),
            unsafe_cache: DashMap::new(),
        })
    }

    /// Factorize and build in one step; the task-facing entry point.
    pub async fn create_and_build(
        &self,
        data: &FactorizeRequest,
    ) -> std::result::Result<FactorizeOutcome, Diagnostic> {
        match self.create(data).await? {
            FactorizeOutcome::Module { mut module, built } => {
                if !built {
                    self.build_module(&mut module).await?;
                    if self.options.unsafe_cache {
                        self.unsafe_cache.insert(
                            (data.context.clone(), data.request.clone()),
                            (*module).clone(),
                        );
                    }
                }
                Ok(FactorizeOutcome::Module {
                    module,
                    built: true,
                })
            }
            FactorizeOutcome::Ignored => Ok(FactorizeOutcome::Ignored),
        }
    }

    /// Steps 1–6 of the pipeline: produce an unbuilt module.
    pub async fn create(
        &self,
        data: &FactorizeRequest,
    ) -> std::result::Result<FactorizeOutcome, Diagnostic> {
        if let Some(FactorizeDecision::Ignore) = self.hooks.before_resolve.call(data) {
            trace!(request = %data.request, "request ignored by before_resolve");
            return Ok(FactorizeOutcome::Ignored);
        }
        if let Some(module) = self.hooks.factorize.call(data) {
            return Ok(FactorizeOutcome::Module {
                module: Box::new(module),
                built: true,
            });
        }
        if self.options.unsafe_cache {
            let key = (data.context.clone(), data.request.clone());
            if let Some(hit) = self.unsafe_cache.get(&key) {
                trace!(request = %data.request, "unsafe cache hit");
                return Ok(FactorizeOutcome::Module {
                    module: Box::new(hit.clone()),
                    built: true,
                });
            }
        }

        let parsed = parse_loader_request(&data.request);
        let match_resource_split: Option<(String, String)> = parsed
            .match_resource
            .as_ref()
            .map(|mr| {
                let (path, query) = split_query(mr);
                (path.to_string(), query.to_string())
            });

        if parsed.resource.is_empty()
            && parsed.query.is_empty()
            && match_resource_split.is_none()
        {
            return Err(Diagnostic::error(&data.request, "no request: empty resource"));
        }

        // Query-only requests skip resolution; the literal stands in.
        let (resource_path, resolution) = if parsed.resource.is_empty() {
            (PathBuf::new(), None)
        } else {
            let resolve_args = ResolveArgs {
                context: data.context.clone(),
                request: parsed.resource.clone(),
            };
            match self.hooks.resolve.call(&resolve_args) {
                Some(path) => (path, None),
                None => match self.resolver.resolve(&data.context, &parsed.resource).await {
                    Ok(resolution) => (resolution.path.clone(), Some(resolution)),
                    Err(e) => return Err(Diagnostic::error(&data.request, e.to_string())),
                },
            }
        };

        let real_resource = resource_path.to_string_lossy().into_owned();
        let (rule_resource, rule_query) = match &match_resource_split {
            Some((path, query)) => (path.as_str(), query.as_str()),
            None => (real_resource.as_str(), parsed.query.as_str()),
        };
        let effects = self.rules.match_request(RuleMatchInput {
            resource: rule_resource,
            real_resource: &real_resource,
            resource_query: rule_query,
            issuer: data.issuer.as_ref().map(|id| id.as_str()),
            compiler_name: &self.compiler_name,
        });

        // Canonical loader order: post, inline, normal, pre - with the
        // request prefixes suppressing their automatic classes.
        let mut references = Vec::new();
        if !parsed.no_post_auto_loaders {
            references.extend(effects.loaders_post.iter().cloned());
        }
        references.extend(parsed.inline_loaders.iter().cloned());
        if !parsed.no_normal_auto_loaders {
            references.extend(effects.loaders_normal.iter().cloned());
        }
        if !parsed.no_pre_auto_loaders {
            references.extend(effects.loaders_pre.iter().cloned());
        }

        let mut loaders = Vec::with_capacity(references.len());
        for reference in &references {
            match self.resolve_loader(reference) {
                Ok(resolved) => loaders.push(resolved),
                Err(message) => return Err(Diagnostic::error(&data.request, message)),
            }
        }

        let module_type = effects.module_type.unwrap_or_else(|| {
            let type_source = match &match_resource_split {
                Some((path, _)) => path.as_str(),
                None => real_resource.as_str(),
            };
            if type_source.ends_with(".json") {
                ModuleType::Json
            } else {
                ModuleType::JavascriptAuto
            }
        });

        let mut resolved = ResolvedRequest {
            resource: resource_path,
            query: parsed.query.clone(),
            loaders,
            module_type,
        };
        self.hooks.after_resolve.call(&mut resolved);

        let identifier = build_identifier(
            parsed.match_resource.as_deref(),
            &resolved.loaders,
            &resolved.resource,
            &resolved.query,
        );
        debug!(request = %data.request, identifier = %identifier, "factorized");

        let module = match self.hooks.create_module.call(&resolved) {
            Some(module) => module,
            None => {
                let mut builder = Module::builder(
                    ModuleId::new(&identifier),
                    resolved.resource.clone(),
                    resolved.module_type,
                )
                .query(resolved.query.clone())
                .raw_request(data.request.clone())
                .loaders(resolved.loaders.clone())
                .parser_options(effects.parser_options.clone())
                .generator_options(effects.generator_options.clone())
                .build_meta(BuildMeta {
                    side_effect_free: effects.side_effects.map(|has_effects| !has_effects),
                    ..BuildMeta::default()
                });
                if let Some(resolution) = &resolution {
                    let mut info = knot_graph::BuildInfo::default();
                    info.file_dependencies
                        .extend(resolution.file_dependencies.iter().cloned());
                    info.missing_dependencies
                        .extend(resolution.missing_dependencies.iter().cloned());
                    info.context_dependencies
                        .extend(resolution.context_dependencies.iter().cloned());
                    builder = builder.build_info(info);
                }
                builder.build()
            }
        };
        let module = self.hooks.module.call(module);

        Ok(FactorizeOutcome::Module {
            module: Box::new(module),
            built: false,
        })
    }

    /// Read, transform and parse a factorized module in place.
    pub async fn build_module(
        &self,
        module: &mut Module,
    ) -> std::result::Result<(), Diagnostic> {
        let content = if module.resource.as_os_str().is_empty() {
            String::new()
        } else {
            match tokio::fs::read_to_string(&module.resource).await {
                Ok(content) => {
                    module
                        .build_info
                        .file_dependencies
                        .insert(module.resource.clone());
                    content
                }
                Err(e) => {
                    return Err(Diagnostic::error(
                        &module.raw_request,
                        format!("cannot read {}: {e}", module.resource.display()),
                    )
                    .for_module(module.id.clone()));
                }
            }
        };

        // Loaders run right-to-left relative to the identifier order.
        let mut chain = module.loaders.clone();
        chain.reverse();
        let resource = module.resource.to_string_lossy().into_owned();
        let transformed = self
            .loaders
            .run_chain(&chain, &resource, content)
            .map_err(|message| {
                Diagnostic::error(&module.raw_request, message).for_module(module.id.clone())
            })?;

        let parser = self.parser_for(module.module_type, &module.parser_options);
        let parse_result = parser.parse(&transformed).map_err(|message| {
            Diagnostic::error(&module.raw_request, message).for_module(module.id.clone())
        })?;

        module.source = Some(Arc::from(transformed));
        module.dependencies = parse_result.dependencies;
        module.replacements = parse_result.replacements;
        let rule_side_effects = module.build_meta.side_effect_free;
        module.build_meta = parse_result.build_meta;
        if module.build_meta.side_effect_free.is_none() {
            module.build_meta.side_effect_free = rule_side_effects;
        }
        trace!(module = %module.id, deps = module.dependencies.len(), "module built");
        Ok(())
    }

    /// Resolve a loader reference through the registry, applying the
    /// `-loader` guidance fallback on failure.
    fn resolve_loader(&self, reference: &str) -> std::result::Result<String, String> {
        let (name, query) = split_query(reference);
        if let Some(resolved) = self.loaders.resolve(reference) {
            return Ok(format!("{resolved}{query}"));
        }
        if !name.ends_with("-loader") && !name.contains('/') && !name.contains('.') {
            let suffixed = format!("{name}-loader");
            if self.loaders.resolve(&suffixed).is_some() {
                return Err(format!(
                    "cannot resolve loader {name:?}: omitting the \"-loader\" suffix is not \
                     supported; use {suffixed:?} instead"
                ));
            }
        }
        Err(format!("cannot resolve loader {name:?}"))
    }

    /// Parser for a `(type, options)` pair, created lazily once per
    /// distinct options value.
    pub fn parser_for(
        &self,
        module_type: ModuleType,
        options: &serde_json::Value,
    ) -> Arc<dyn Parser> {
        let key = (module_type, options.to_string());
        if let Some(parser) = self.parser_cache.lock().get(&key) {
            return Arc::clone(parser);
        }

        let args = ParserGeneratorArgs {
            module_type,
            options: options.clone(),
        };
        let parser: Arc<dyn Parser> = match self.hooks.create_parser.call(&args) {
            Some(custom) => Arc::from(custom),
            None => match module_type {
                ModuleType::JavascriptAuto => Arc::new(JavascriptParser::new(options)),
                ModuleType::Json => Arc::new(JsonParser),
                ModuleType::AssetResource => Arc::new(AssetParser),
            },
        };
        let mut observer_args = args;
        self.hooks.parser.call(&mut observer_args);
        self.parser_cache.lock().insert(key, Arc::clone(&parser));
        parser
    }

    /// Generator for a `(type, options)` pair, cached like parsers.
    pub fn generator_for(
        &self,
        module_type: ModuleType,
        options: &serde_json::Value,
    ) -> Arc<dyn Generator> {
        let key = (module_type, options.to_string());
        if let Some(generator) = self.generator_cache.lock().get(&key) {
            return Arc::clone(generator);
        }

        let args = ParserGeneratorArgs {
            module_type,
            options: options.clone(),
        };
        let generator: Arc<dyn Generator> = match self.hooks.create_generator.call(&args) {
            Some(custom) => Arc::from(custom),
            None => match module_type {
                ModuleType::JavascriptAuto => Arc::new(JavascriptGenerator),
                ModuleType::Json => Arc::new(JsonGenerator),
                ModuleType::AssetResource => Arc::new(AssetGenerator),
            },
        };
        let mut observer_args = args;
        self.hooks.generator.call(&mut observer_args);
        self.generator_cache
            .lock()
            .insert(key, Arc::clone(&generator));
        generator
    }
}

/// Canonical identifier: `match!=!loader0!loader1!resource?query`.
fn build_identifier(
    match_resource: Option<&str>,
    loaders: &[String],
    resource: &std::path::Path,
    query: &str,
) -> String {
    let mut identifier = String::new();
    if let Some(mr) = match_resource {
        identifier.push_str(mr);
        identifier.push_str("!=!");
    }
    if !loaders.is_empty() {
        identifier.push_str(&loaders.join("!"));
        identifier.push('!');
    }
    identifier.push_str(&resource.to_string_lossy());
    identifier.push_str(query);
    identifier
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::loader::LoaderContext;
    use crate::options::{LoaderEnforce, ModuleRule};
    use crate::resolver::FsResolver;

    fn factory_for(options: CompilerOptions) -> NormalModuleFactory {
        let options = Arc::new(options);
        let resolver = Arc::new(FsResolver::new(options.resolve.clone()));
        let mut registry = LoaderRegistry::new();
        registry.register("upper-loader", |content: String, _: &LoaderContext<'_>| {
            Ok(content.to_uppercase())
        });
        registry.register("mark-loader", |content: String, _: &LoaderContext<'_>| {
            Ok(format!("/*mark*/{content}"))
        });
        NormalModuleFactory::new(options, resolver, Arc::new(registry)).unwrap()
    }

    fn request(dir: &TempDir, request: &str) -> FactorizeRequest {
        FactorizeRequest {
            request: request.into(),
            context: dir.path().to_path_buf(),
            issuer: None,
        }
    }

    async fn build(factory: &NormalModuleFactory, data: &FactorizeRequest) -> Module {
        match factory.create_and_build(data).await.unwrap() {
            FactorizeOutcome::Module { module, .. } => *module,
            FactorizeOutcome::Ignored => panic!("unexpected ignore"),
        }
    }

    #[tokio::test]
    async fn builds_a_plain_javascript_module() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "module.exports = 1;").unwrap();

        let factory = factory_for(CompilerOptions::new(dir.path()));
        let module = build(&factory, &request(&dir, "./a.js")).await;

        assert_eq!(module.module_type, ModuleType::JavascriptAuto);
        assert_eq!(module.source_or_empty(), "module.exports = 1;");
        assert!(module.build_meta.uses_module);
        assert!(module
            .build_info
            .file_dependencies
            .contains(&dir.path().join("a.js")));
    }

    #[tokio::test]
    async fn rule_loaders_apply_and_shape_the_identifier() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "x").unwrap();

        let options = CompilerOptions::new(dir.path())
            .rule(ModuleRule::test(r"\.js$").loader("upper-loader"));
        let factory = factory_for(options);
        let module = build(&factory, &request(&dir, "./a.js")).await;

        assert_eq!(module.loaders, vec!["upper-loader"]);
        assert_eq!(module.source_or_empty(), "X");
        assert!(module.id.as_str().starts_with("upper-loader!"));
    }

    #[tokio::test]
    async fn double_bang_bypasses_automatic_loaders() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "x").unwrap();

        let options = CompilerOptions::new(dir.path()).rule(
            ModuleRule::test(r"\.js$")
                .loader("mark-loader")
                .loader_enforced("mark-loader", LoaderEnforce::Pre),
        );
        let factory = factory_for(options);
        let module = build(&factory, &request(&dir, "!!upper-loader!./a.js")).await;

        // Only the inline loader survived.
        assert_eq!(module.loaders, vec!["upper-loader"]);
        assert_eq!(module.source_or_empty(), "X");
    }

    #[tokio::test]
    async fn loader_suffix_fallback_rewrites_the_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "x").unwrap();

        let factory = factory_for(CompilerOptions::new(dir.path()));
        let err = factory
            .create_and_build(&request(&dir, "upper!./a.js"))
            .await
            .unwrap_err();
        assert!(err.message.contains("\"upper-loader\""));

        let err = factory
            .create_and_build(&request(&dir, "never!./a.js"))
            .await
            .unwrap_err();
        assert!(err.message.contains("cannot resolve loader \"never\""));
    }

    #[tokio::test]
    async fn json_module_type_is_inferred_from_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.json"), r#"{"k": 1}"#).unwrap();

        let factory = factory_for(CompilerOptions::new(dir.path()));
        let module = build(&factory, &request(&dir, "./data.json")).await;
        assert_eq!(module.module_type, ModuleType::Json);
    }

    #[tokio::test]
    async fn unsafe_cache_reuses_built_modules() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "x").unwrap();

        let factory = factory_for(CompilerOptions::new(dir.path()).unsafe_cache(true));
        let data = request(&dir, "./a.js");
        let first = build(&factory, &data).await;

        // Remove the file; the cache must still answer.
        fs::remove_file(dir.path().join("a.js")).unwrap();
        let second = build(&factory, &data).await;
        assert_eq!(first.id, second.id);
        assert_eq!(second.source_or_empty(), "x");
    }

    #[tokio::test]
    async fn before_resolve_can_ignore_requests() {
        let dir = TempDir::new().unwrap();
        let mut factory = factory_for(CompilerOptions::new(dir.path()));
        factory
            .hooks
            .before_resolve
            .tap("ignore-virtual", |data: &FactorizeRequest| {
                data.request.starts_with("virtual:").then_some(FactorizeDecision::Ignore)
            });

        let outcome = factory
            .create_and_build(&request(&dir, "virtual:nothing"))
            .await
            .unwrap();
        assert!(matches!(outcome, FactorizeOutcome::Ignored));
    }

    #[tokio::test]
    async fn parsers_are_cached_per_options_identity() {
        let dir = TempDir::new().unwrap();
        let factory = factory_for(CompilerOptions::new(dir.path()));

        let a = factory.parser_for(ModuleType::JavascriptAuto, &serde_json::Value::Null);
        let b = factory.parser_for(ModuleType::JavascriptAuto, &serde_json::Value::Null);
        assert!(Arc::ptr_eq(&a, &b));

        let c = factory.parser_for(
            ModuleType::JavascriptAuto,
            &serde_json::json!({"requires": false}),
        );
        assert!(!Arc::ptr_eq(&a, &c));
    }
}

//! Programmatic compiler configuration.
//!
//! Config-file loading and schema validation live outside this crate; hosts
//! construct [`CompilerOptions`] directly with the fluent builder methods
//! and hand it to [`crate::Compiler::new`], which validates once and fails
//! fast on malformed rules.

use std::path::PathBuf;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Where and how output artifacts are written.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Output directory, resolved against the compiler context if relative.
    pub dir: PathBuf,
    /// Chunk filename template. Placeholders: `[name]`, `[id]`,
    /// `[contenthash]`, `[hash]`.
    pub filename: String,
    /// Public URL prefix exposed to asset modules via the runtime.
    pub public_path: String,
    /// Wrap each chunk in an immediately-invoked closure.
    pub iife: bool,
    /// Evict a module from the cache when its factory throws.
    pub strict_module_error_handling: bool,
    /// Hex digits kept from content hashes in filenames and stats.
    pub hash_length: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dist"),
            filename: String::from("[name].js"),
            public_path: String::new(),
            iife: true,
            strict_module_error_handling: false,
            hash_length: 16,
        }
    }
}

/// Resolution rules consumed by the shipped filesystem resolver.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Extensions probed for extensionless requests, in order.
    pub extensions: Vec<String>,
    /// Exact-prefix aliases applied before resolution.
    pub alias: FxHashMap<String, String>,
    /// Directory names probed for bare specifiers, walking up from the
    /// issuer (`node_modules` by default).
    pub modules: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            extensions: vec![".js".into(), ".json".into(), ".mjs".into()],
            alias: FxHashMap::default(),
            modules: vec!["node_modules".into()],
        }
    }
}

/// Which automatic loader class a rule-matched loader belongs to.
///
/// Classes control both application order (post, inline, normal, pre) and
/// which inline prefix (`!`, `!!`, `-!`) suppresses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoaderEnforce {
    Pre,
    #[default]
    Normal,
    Post,
}

/// A loader reference inside a rule.
#[derive(Debug, Clone)]
pub struct RuleLoader {
    /// Loader request, optionally with a `?options` query.
    pub loader: String,
    pub enforce: LoaderEnforce,
}

impl RuleLoader {
    pub fn new(loader: impl Into<String>) -> Self {
        Self {
            loader: loader.into(),
            enforce: LoaderEnforce::Normal,
        }
    }

    pub fn enforce(mut self, enforce: LoaderEnforce) -> Self {
        self.enforce = enforce;
        self
    }
}

/// One entry of the ordered module rule set.
///
/// All matchers are regular expressions compiled once at factory
/// construction; a rule with no matchers matches nothing and is rejected
/// there. Later-matching rules deep-merge object-valued settings and
/// override scalar ones.
#[derive(Debug, Clone, Default)]
pub struct ModuleRule {
    /// Matched against the resource path (no query).
    pub test: Option<String>,
    /// Matched against the resource query (including `?`).
    pub resource_query: Option<String>,
    /// Matched against the issuing module's identifier.
    pub issuer: Option<String>,
    /// Matched against the compiler name.
    pub compiler: Option<String>,
    pub loaders: Vec<RuleLoader>,
    /// Module type in config spelling (`"asset/resource"`, ...).
    pub module_type: Option<String>,
    /// Parser options; object values deep-merge across matching rules.
    pub parser_options: serde_json::Value,
    /// Generator options; object values deep-merge across matching rules.
    pub generator_options: serde_json::Value,
    pub side_effects: Option<bool>,
}

impl ModuleRule {
    pub fn test(pattern: impl Into<String>) -> Self {
        Self {
            test: Some(pattern.into()),
            parser_options: serde_json::Value::Null,
            generator_options: serde_json::Value::Null,
            ..Self::default()
        }
    }

    pub fn resource_query(mut self, pattern: impl Into<String>) -> Self {
        self.resource_query = Some(pattern.into());
        self
    }

    pub fn issuer(mut self, pattern: impl Into<String>) -> Self {
        self.issuer = Some(pattern.into());
        self
    }

    pub fn compiler(mut self, pattern: impl Into<String>) -> Self {
        self.compiler = Some(pattern.into());
        self
    }

    pub fn loader(mut self, loader: impl Into<String>) -> Self {
        self.loaders.push(RuleLoader::new(loader));
        self
    }

    pub fn loader_enforced(mut self, loader: impl Into<String>, enforce: LoaderEnforce) -> Self {
        self.loaders.push(RuleLoader::new(loader).enforce(enforce));
        self
    }

    pub fn module_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = Some(module_type.into());
        self
    }

    pub fn parser_options(mut self, options: serde_json::Value) -> Self {
        self.parser_options = options;
        self
    }

    pub fn generator_options(mut self, options: serde_json::Value) -> Self {
        self.generator_options = options;
        self
    }

    pub fn side_effects(mut self, side_effects: bool) -> Self {
        self.side_effects = Some(side_effects);
        self
    }
}

/// Full configuration for one compiler.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Compiler name; keys the records file and is matchable by rules.
    pub name: String,
    /// Base directory entry requests resolve against.
    pub context: PathBuf,
    /// Entry name → ordered request list. Declaration order is startup
    /// order and chunk creation order.
    pub entries: IndexMap<String, Vec<String>>,
    pub output: OutputOptions,
    pub rules: Vec<ModuleRule>,
    pub resolve: ResolveOptions,
    /// Reuse prior factorization results keyed by dependency identity.
    pub unsafe_cache: bool,
    /// Optional id-stability records file.
    pub records_path: Option<PathBuf>,
}

impl CompilerOptions {
    pub fn new(context: impl Into<PathBuf>) -> Self {
        Self {
            name: String::from("knot"),
            context: context.into(),
            entries: IndexMap::new(),
            output: OutputOptions::default(),
            rules: Vec::new(),
            resolve: ResolveOptions::default(),
            unsafe_cache: false,
            records_path: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add one request to a named entry, creating the entry if new.
    pub fn entry(mut self, name: impl Into<String>, request: impl Into<String>) -> Self {
        self.entries
            .entry(name.into())
            .or_default()
            .push(request.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.dir = dir.into();
        self
    }

    pub fn filename(mut self, template: impl Into<String>) -> Self {
        self.output.filename = template.into();
        self
    }

    pub fn public_path(mut self, public_path: impl Into<String>) -> Self {
        self.output.public_path = public_path.into();
        self
    }

    pub fn iife(mut self, iife: bool) -> Self {
        self.output.iife = iife;
        self
    }

    pub fn strict_module_error_handling(mut self, enabled: bool) -> Self {
        self.output.strict_module_error_handling = enabled;
        self
    }

    pub fn rule(mut self, rule: ModuleRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolve.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.resolve.alias.insert(from.into(), to.into());
        self
    }

    pub fn unsafe_cache(mut self, enabled: bool) -> Self {
        self.unsafe_cache = enabled;
        self
    }

    pub fn records_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.records_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_requests_accumulate_in_order() {
        let options = CompilerOptions::new("/project")
            .entry("main", "./a.js")
            .entry("main", "./b.js")
            .entry("admin", "./admin.js");

        assert_eq!(options.entries["main"], vec!["./a.js", "./b.js"]);
        assert_eq!(
            options.entries.keys().collect::<Vec<_>>(),
            ["main", "admin"]
        );
    }

    #[test]
    fn rule_builder_collects_loaders_with_enforce() {
        let rule = ModuleRule::test(r"\.txt$")
            .loader("raw-loader")
            .loader_enforced("trace-loader", LoaderEnforce::Pre)
            .module_type("asset/resource");

        assert_eq!(rule.loaders.len(), 2);
        assert_eq!(rule.loaders[1].enforce, LoaderEnforce::Pre);
        assert_eq!(rule.module_type.as_deref(), Some("asset/resource"));
    }
}

//! Loader execution seam.
//!
//! Real loader execution is an external concern - this core only needs an
//! opaque "transform raw source before parsing" step. [`LoaderRegistry`]
//! doubles as the loader-specific resolver (names resolve against its
//! registrations) and as the runner that applies a resolved chain.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::request::split_query;

/// What a loader sees about the module being transformed.
#[derive(Debug, Clone, Copy)]
pub struct LoaderContext<'a> {
    /// Absolute resource path of the module.
    pub resource: &'a str,
    /// Query of this loader reference (including `?`), or empty.
    pub query: &'a str,
}

/// An opaque source transform.
pub trait LoaderTransform: Send + Sync {
    fn transform(
        &self,
        content: String,
        ctx: &LoaderContext<'_>,
    ) -> std::result::Result<String, String>;
}

impl<F> LoaderTransform for F
where
    F: Fn(String, &LoaderContext<'_>) -> std::result::Result<String, String> + Send + Sync,
{
    fn transform(
        &self,
        content: String,
        ctx: &LoaderContext<'_>,
    ) -> std::result::Result<String, String> {
        self(content, ctx)
    }
}

/// In-process loader registrations, keyed by canonical loader name.
#[derive(Default)]
pub struct LoaderRegistry {
    by_name: FxHashMap<String, Arc<dyn LoaderTransform>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        transform: impl LoaderTransform + 'static,
    ) -> &mut Self {
        self.by_name.insert(name.into(), Arc::new(transform));
        self
    }

    /// Resolve a loader reference (query stripped) to its canonical name.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        let (name, _query) = split_query(reference);
        self.by_name.contains_key(name).then(|| name.to_string())
    }

    /// Apply a resolved loader chain to `content`, left to right.
    ///
    /// Chain entries may carry a `?query`; the loader sees its own query
    /// only. An unregistered entry fails the whole chain.
    pub fn run_chain(
        &self,
        chain: &[String],
        resource: &str,
        mut content: String,
    ) -> std::result::Result<String, String> {
        for reference in chain {
            let (name, query) = split_query(reference);
            let Some(transform) = self.by_name.get(name) else {
                return Err(format!("loader {name:?} is not registered"));
            };
            let ctx = LoaderContext { resource, query };
            content = transform
                .transform(content, &ctx)
                .map_err(|message| format!("loader {name:?} failed: {message}"))?;
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LoaderRegistry {
        let mut registry = LoaderRegistry::new();
        registry.register("upper-loader", |content: String, _ctx: &LoaderContext<'_>| {
            Ok(content.to_uppercase())
        });
        registry.register("tag-loader", |content: String, ctx: &LoaderContext<'_>| {
            Ok(format!("/*{}*/{content}", ctx.query))
        });
        registry
    }

    #[test]
    fn resolve_ignores_query() {
        let registry = registry();
        assert_eq!(
            registry.resolve("tag-loader?label=x").as_deref(),
            Some("tag-loader")
        );
        assert_eq!(registry.resolve("missing-loader"), None);
    }

    #[test]
    fn chain_applies_left_to_right_with_per_loader_query() {
        let registry = registry();
        let out = registry
            .run_chain(
                &["upper-loader".into(), "tag-loader?v=1".into()],
                "/src/a.js",
                "abc".into(),
            )
            .unwrap();
        assert_eq!(out, "/*?v=1*/ABC");
    }

    #[test]
    fn unregistered_loader_fails_the_chain() {
        let registry = registry();
        let err = registry
            .run_chain(&["nope-loader".into()], "/src/a.js", "x".into())
            .unwrap_err();
        assert!(err.contains("nope-loader"));
    }
}

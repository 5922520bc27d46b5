//! Request resolution.
//!
//! The resolver is an external collaborator behind the [`Resolver`] trait;
//! [`FsResolver`] is the shipped filesystem implementation covering
//! relative/absolute requests, alias rewriting, extension probing,
//! directory `main`/index resolution and a `node_modules`-style walk for
//! bare specifiers. Results (including failures) are kept in a shared
//! concurrent cache - the resolver is read-mostly and shared across a whole
//! compiler.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use path_clean::PathClean;

use crate::options::ResolveOptions;

/// A successful resolution plus the paths touched while probing.
///
/// The path sets feed cache invalidation and watching on the caller side:
/// `file_dependencies` are paths whose content mattered,
/// `missing_dependencies` are probes that did not exist (their appearance
/// would change the result), `context_dependencies` are directories whose
/// listing mattered.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub path: PathBuf,
    pub file_dependencies: BTreeSet<PathBuf>,
    pub missing_dependencies: BTreeSet<PathBuf>,
    pub context_dependencies: BTreeSet<PathBuf>,
}

/// Resolution failure for one request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cannot resolve {request:?} in {}: {message}", base.display())]
pub struct ResolveError {
    pub request: String,
    pub base: PathBuf,
    pub message: String,
}

/// Maps a request string plus base directory to an absolute file path.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, base: &Path, request: &str)
    -> std::result::Result<Resolution, ResolveError>;
}

/// Filesystem resolver with a shared result cache.
pub struct FsResolver {
    options: ResolveOptions,
    cache: DashMap<(PathBuf, String), std::result::Result<Resolution, ResolveError>>,
}

impl FsResolver {
    pub fn new(options: ResolveOptions) -> Self {
        Self {
            options,
            cache: DashMap::new(),
        }
    }

    /// Apply the first matching alias (exact or segment-prefix).
    fn apply_alias(&self, request: &str) -> String {
        for (from, to) in &self.options.alias {
            if request == from {
                return to.clone();
            }
            if let Some(rest) = request.strip_prefix(from) {
                if rest.starts_with('/') {
                    return format!("{to}{rest}");
                }
            }
        }
        request.to_string()
    }

    /// Probe `candidate` as a file: as-is, then with each extension.
    async fn probe_file(&self, candidate: &Path, resolution: &mut Resolution) -> Option<PathBuf> {
        if is_file(candidate).await {
            return Some(candidate.to_path_buf());
        }
        resolution.missing_dependencies.insert(candidate.to_path_buf());

        let Some(name) = candidate.file_name().and_then(|n| n.to_str()) else {
            return None;
        };
        for ext in &self.options.extensions {
            let with_ext = candidate.with_file_name(format!("{name}{ext}"));
            if is_file(&with_ext).await {
                return Some(with_ext);
            }
            resolution.missing_dependencies.insert(with_ext);
        }
        None
    }

    /// Probe `dir` as a directory target: package.json `main`, then index.
    async fn probe_dir(&self, dir: &Path, resolution: &mut Resolution) -> Option<PathBuf> {
        resolution.context_dependencies.insert(dir.to_path_buf());

        let manifest = dir.join("package.json");
        if let Ok(text) = tokio::fs::read_to_string(&manifest).await {
            resolution.file_dependencies.insert(manifest.clone());
            if let Some(main) = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|pkg| pkg.get("main").and_then(|m| m.as_str().map(String::from)))
            {
                let target = dir.join(main).clean();
                if let Some(found) = self.probe_file(&target, resolution).await {
                    return Some(found);
                }
                if let Some(found) = Box::pin(self.probe_dir(&target, resolution)).await {
                    return Some(found);
                }
            }
        } else {
            resolution.missing_dependencies.insert(manifest);
        }

        self.probe_file(&dir.join("index"), resolution).await
    }

    async fn probe(&self, candidate: &Path, resolution: &mut Resolution) -> Option<PathBuf> {
        if let Some(found) = self.probe_file(candidate, resolution).await {
            return Some(found);
        }
        if is_dir(candidate).await {
            return self.probe_dir(candidate, resolution).await;
        }
        None
    }

    /// Candidate base paths for a request, most specific first.
    fn candidates(&self, base: &Path, request: &str) -> Vec<PathBuf> {
        let path = Path::new(request);
        if path.is_absolute() {
            return vec![path.to_path_buf().clean()];
        }
        if request.starts_with("./") || request.starts_with("../") {
            return vec![base.join(path).clean()];
        }

        // Bare specifier: walk up from the base directory.
        let mut candidates = Vec::new();
        let mut current = Some(base);
        while let Some(dir) = current {
            for modules_dir in &self.options.modules {
                candidates.push(dir.join(modules_dir).join(path).clean());
            }
            current = dir.parent();
        }
        candidates
    }
}

#[async_trait]
impl Resolver for FsResolver {
    async fn resolve(
        &self,
        base: &Path,
        request: &str,
    ) -> std::result::Result<Resolution, ResolveError> {
        let key = (base.to_path_buf(), request.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let aliased = self.apply_alias(request);
        let mut resolution = Resolution::default();

        let mut found = None;
        for candidate in self.candidates(base, &aliased) {
            if let Some(path) = self.probe(&candidate, &mut resolution).await {
                found = Some(path);
                break;
            }
        }

        let result = match found {
            Some(path) => {
                resolution.file_dependencies.insert(path.clone());
                resolution.path = path;
                Ok(resolution)
            }
            None => Err(ResolveError {
                request: request.to_string(),
                base: base.to_path_buf(),
                message: String::from("no matching file found"),
            }),
        };

        self.cache.insert(key, result.clone());
        result
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn resolver() -> FsResolver {
        FsResolver::new(ResolveOptions::default())
    }

    #[tokio::test]
    async fn resolves_relative_request_with_extension_probing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("util.js"), "module.exports = 1;").unwrap();

        let resolution = resolver().resolve(dir.path(), "./util").await.unwrap();
        assert_eq!(resolution.path, dir.path().join("util.js"));
        // The extensionless probe was recorded as missing.
        assert!(resolution
            .missing_dependencies
            .contains(&dir.path().join("util")));
    }

    #[tokio::test]
    async fn exact_file_wins_over_extension_probes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data"), "raw").unwrap();
        fs::write(dir.path().join("data.js"), "module.exports = 1;").unwrap();

        let resolution = resolver().resolve(dir.path(), "./data").await.unwrap();
        assert_eq!(resolution.path, dir.path().join("data"));
    }

    #[tokio::test]
    async fn resolves_directory_through_package_main_and_index() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("package.json"), r#"{"main": "./entry.js"}"#).unwrap();
        fs::write(lib.join("entry.js"), "").unwrap();

        let resolution = resolver().resolve(dir.path(), "./lib").await.unwrap();
        assert_eq!(resolution.path, lib.join("entry.js"));

        let plain = dir.path().join("plain");
        fs::create_dir_all(&plain).unwrap();
        fs::write(plain.join("index.js"), "").unwrap();

        let resolution = resolver().resolve(dir.path(), "./plain").await.unwrap();
        assert_eq!(resolution.path, plain.join("index.js"));
    }

    #[tokio::test]
    async fn bare_specifier_walks_up_modules_dirs() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("node_modules/leftpad");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("index.js"), "").unwrap();
        let nested = dir.path().join("src/deep");
        fs::create_dir_all(&nested).unwrap();

        let resolution = resolver().resolve(&nested, "leftpad").await.unwrap();
        assert_eq!(resolution.path, pkg.join("index.js"));
    }

    #[tokio::test]
    async fn alias_rewrites_before_resolution() {
        let dir = TempDir::new().unwrap();
        let shared = dir.path().join("shared");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("api.js"), "").unwrap();

        let mut options = ResolveOptions::default();
        options.alias.insert(
            "@shared".into(),
            shared.to_string_lossy().into_owned(),
        );
        let resolver = FsResolver::new(options);

        let resolution = resolver.resolve(dir.path(), "@shared/api").await.unwrap();
        assert_eq!(resolution.path, shared.join("api.js"));
    }

    #[tokio::test]
    async fn failure_is_cached_and_reported() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver();

        let err = resolver.resolve(dir.path(), "./missing").await.unwrap_err();
        assert!(err.to_string().contains("./missing"));
        // Second lookup hits the cache and fails identically.
        let err2 = resolver.resolve(dir.path(), "./missing").await.unwrap_err();
        assert_eq!(err.to_string(), err2.to_string());
    }
}

//! The top-level compiler.
//!
//! Owns the options, the hook surface and the module factory, and drives
//! one compilation per `run`: records read → compile (make/finish/seal) →
//! asset emission → records write → `done`. A compiler rejects overlapping
//! runs instead of queueing them; sequential runs reuse its shared caches.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::assets::emit_assets;
use crate::compilation::Compilation;
use crate::factory::NormalModuleFactory;
use crate::hooks::{CompilationParams, CompilerHooks, FactoryHooks, RunArgs};
use crate::loader::LoaderRegistry;
use crate::options::CompilerOptions;
use crate::records::Records;
use crate::resolver::{FsResolver, Resolver};
use crate::stats::Stats;
use crate::{Error, Result};

pub struct Compiler {
    options: Arc<CompilerOptions>,
    pub hooks: CompilerHooks,
    factory: Arc<NormalModuleFactory>,
    running: AtomicBool,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler").finish_non_exhaustive()
    }
}

impl Compiler {
    /// Construct with the shipped filesystem resolver and an empty loader
    /// registry.
    pub fn new(options: CompilerOptions) -> Result<Self> {
        let resolver = Arc::new(FsResolver::new(options.resolve.clone()));
        Self::with_collaborators(options, resolver, Arc::new(LoaderRegistry::new()))
    }

    /// Construct with explicit resolver and loader collaborators.
    ///
    /// Configuration is validated and rules are compiled here - a
    /// malformed setup never starts a build.
    pub fn with_collaborators(
        options: CompilerOptions,
        resolver: Arc<dyn Resolver>,
        loaders: Arc<LoaderRegistry>,
    ) -> Result<Self> {
        validate_options(&options)?;
        let options = Arc::new(options);
        let factory = Arc::new(NormalModuleFactory::new(
            Arc::clone(&options),
            resolver,
            loaders,
        )?);
        Ok(Self {
            options,
            hooks: CompilerHooks::default(),
            factory,
            running: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Factory hook registration point; available until the first run
    /// shares the factory with worker tasks.
    pub fn factory_hooks_mut(&mut self) -> Option<&mut FactoryHooks> {
        Arc::get_mut(&mut self.factory).map(|factory| &mut factory.hooks)
    }

    fn output_dir(&self) -> PathBuf {
        let dir = &self.options.output.dir;
        if dir.is_absolute() {
            dir.clone()
        } else {
            self.options.context.join(dir)
        }
    }

    fn records_path(&self) -> Option<PathBuf> {
        self.options.records_path.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.options.context.join(path)
            }
        })
    }

    /// Run one full build: compile, emit, records, stats.
    ///
    /// The `done`/`after_done` hooks always fire, carrying either the real
    /// stats or a failure snapshot. Module-level errors do not fail the
    /// run; they ride inside the returned stats.
    pub async fn run(&self) -> Result<Stats> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::ConcurrentCompilation);
        }
        let result = self.run_inner().await;
        self.running.store(false, Ordering::SeqCst);

        match result {
            Ok(mut stats) => {
                self.hooks.done.call(&mut stats);
                self.hooks.after_done.call(&mut stats);
                Ok(stats)
            }
            Err(error) => {
                let mut stats = Stats::from_failure(&self.options.name, &error);
                self.hooks.done.call(&mut stats);
                self.hooks.after_done.call(&mut stats);
                Err(error)
            }
        }
    }

    async fn run_inner(&self) -> Result<Stats> {
        info!(compiler = %self.options.name, "run started");
        let mut run_args = RunArgs {
            compiler_name: self.options.name.clone(),
        };
        self.hooks
            .before_run
            .call(&mut run_args)
            .await
            .map_err(Error::from_hook)?;
        self.hooks
            .run
            .call(&mut run_args)
            .await
            .map_err(Error::from_hook)?;

        let mut compilation = self.compile().await?;

        self.hooks
            .emit
            .call(&mut compilation)
            .await
            .map_err(Error::from_hook)?;
        let summary = emit_assets(&self.output_dir(), &compilation.assets).await?;
        self.hooks
            .after_emit
            .call(&mut compilation)
            .await
            .map_err(Error::from_hook)?;

        if let Some(path) = self.records_path() {
            compilation.records.write(&path)?;
        }

        let stats = Stats::from_compilation(&compilation, &summary);
        info!(
            compiler = %self.options.name,
            assets = stats.assets.len(),
            written = summary.written.len(),
            errors = stats.errors.len(),
            "run finished"
        );
        Ok(stats)
    }

    /// Run one compilation without emitting: the make → finish → seal
    /// sequence with every lifecycle hook.
    pub async fn compile(&self) -> Result<Compilation> {
        let records = match self.records_path() {
            Some(path) => Records::read(&path)?,
            None => Records::new(),
        };

        let mut params = CompilationParams {
            compiler_name: self.options.name.clone(),
        };
        self.hooks
            .before_compile
            .call(&mut params)
            .await
            .map_err(Error::from_hook)?;
        self.hooks.compile.call(&mut params);

        let mut compilation = Compilation::new(Arc::clone(&self.options), records);
        self.hooks.this_compilation.call(&mut compilation);
        self.hooks.compilation.call(&mut compilation);

        self.hooks
            .make
            .call(&compilation)
            .await
            .map_err(Error::from_hook)?;
        compilation.make(&self.factory).await?;
        self.hooks
            .finish_make
            .call(&mut compilation)
            .await
            .map_err(Error::from_hook)?;

        compilation.finish();
        compilation.seal(&self.factory)?;

        self.hooks
            .after_compile
            .call(&mut compilation)
            .await
            .map_err(Error::from_hook)?;
        Ok(compilation)
    }

    /// Release the compiler. Records are written per run, so there is
    /// nothing further to flush; shared caches drop with the instance.
    pub async fn close(self) -> Result<()> {
        info!(compiler = %self.options.name, "compiler closed");
        Ok(())
    }
}

fn validate_options(options: &CompilerOptions) -> Result<()> {
    if options.entries.is_empty() {
        return Err(Error::InvalidConfig(
            "at least one entry is required".into(),
        ));
    }
    if options.entries.values().any(|requests| requests.is_empty()) {
        return Err(Error::InvalidConfig(
            "every entry needs at least one request".into(),
        ));
    }
    if !(4..=64).contains(&options.output.hash_length) {
        return Err(Error::InvalidConfig(format!(
            "hash_length must be between 4 and 64, got {}",
            options.output.hash_length
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entry_set_is_rejected() {
        let err = Compiler::new(CompilerOptions::new("/tmp/p")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn malformed_rules_fail_at_construction() {
        let options = CompilerOptions::new("/tmp/p")
            .entry("main", "./a.js")
            .rule(crate::options::ModuleRule::test(r"(\unclosed"));
        let err = Compiler::new(options).unwrap_err();
        assert!(matches!(err, Error::InvalidRule(_)));
    }

    #[tokio::test]
    async fn concurrent_runs_are_rejected() {
        // The guard flips before any async work, so a second run started
        // while the flag is held must fail fast.
        let options = CompilerOptions::new("/tmp/does-not-matter").entry("main", "./a.js");
        let compiler = Compiler::new(options).unwrap();
        compiler.running.store(true, Ordering::SeqCst);

        let err = compiler.run().await.unwrap_err();
        assert!(matches!(err, Error::ConcurrentCompilation));
    }
}

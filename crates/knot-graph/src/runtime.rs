use std::collections::BTreeSet;

/// A named bootstrap capability a chunk's code depends on.
///
/// Each variant maps to one conditionally emitted piece of the bootstrap;
/// a capability is emitted only if at least one reachable module or the
/// runtime template itself demands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuntimeRequirement {
    /// The `__knot_require__` function.
    Require,
    /// The module instance cache object.
    ModuleCache,
    /// `__knot_require__.m` exposing the module factory map.
    ModuleFactories,
    /// `__knot_require__.c` exposing the module cache.
    ModuleCacheExposed,
    /// Factory needs the `module` parameter (`module.exports` use).
    Module,
    /// Factory needs the `exports` parameter.
    Exports,
    /// `__knot_require__.p`, the configured public path.
    PublicPath,
    /// `__knot_require__.n`, the default-export compat getter.
    CompatGetDefaultExport,
    /// The rendered chunk evaluates to the entry's exports.
    ReturnExportsFromRuntime,
    /// `__knot_require__.i`, the module execution interception array.
    InterceptModuleExecution,
    /// Generic startup indirection invoking each entry module.
    StartupEntrypoint,
}

/// Ordered requirement set; `BTreeSet` keeps iteration deterministic.
pub type RuntimeRequirements = BTreeSet<RuntimeRequirement>;

/// Close a requirement set over its implications.
///
/// Capabilities pull in what their emitted code uses: everything hanging
/// off the require function needs the function itself, and the require
/// function keeps instances in the module cache.
pub fn expand_runtime_requirements(requirements: &mut RuntimeRequirements) {
    loop {
        let mut additions = RuntimeRequirements::new();
        for requirement in requirements.iter() {
            match requirement {
                RuntimeRequirement::Require => {
                    additions.insert(RuntimeRequirement::ModuleCache);
                }
                RuntimeRequirement::ModuleFactories
                | RuntimeRequirement::ModuleCacheExposed
                | RuntimeRequirement::PublicPath
                | RuntimeRequirement::CompatGetDefaultExport
                | RuntimeRequirement::InterceptModuleExecution
                | RuntimeRequirement::StartupEntrypoint => {
                    additions.insert(RuntimeRequirement::Require);
                }
                RuntimeRequirement::ModuleCache
                | RuntimeRequirement::Module
                | RuntimeRequirement::Exports
                | RuntimeRequirement::ReturnExportsFromRuntime => {}
            }
        }
        let before = requirements.len();
        requirements.extend(additions);
        if requirements.len() == before {
            return;
        }
    }
}

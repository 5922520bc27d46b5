use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::module::Module;
use crate::module_id::ModuleId;
use crate::{GraphError, Result};

/// Where a dependency edge originates: a synthetic entry root or a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyOrigin {
    /// Entry name as configured.
    Entry(String),
    /// Declaring module.
    Module(ModuleId),
}

/// A resolved dependency: `(origin, dep_index)` points at `module`.
///
/// `dep_index` indexes into the origin module's `dependencies` vec; entry
/// origins always use index 0 (one synthetic dependency per entry request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub origin: DependencyOrigin,
    pub dep_index: usize,
    pub module: ModuleId,
}

#[derive(Default)]
struct GraphInner {
    modules: FxHashMap<ModuleId, Arc<Module>>,
    connections: Vec<Connection>,
    /// Per-origin-module resolved targets, keyed by dependency index.
    outgoing: FxHashMap<ModuleId, FxHashMap<usize, ModuleId>>,
    /// Modules referencing a target module (entry origins not included).
    incoming: FxHashMap<ModuleId, FxHashSet<ModuleId>>,
    /// Targets of entry connections.
    entry_targets: FxHashSet<ModuleId>,
    sealed: bool,
}

/// The module graph: modules as nodes plus dependency → module connections.
///
/// Invariants:
/// - one node per canonical identifier (adding an existing id returns the
///   stored instance - the dedup invariant);
/// - every non-ignored dependency has at most one connection;
/// - cycles are allowed, the runtime breaks them lazily.
///
/// All methods take `&self`; state lives behind an `RwLock` so the make
/// phase can link from concurrent completion callbacks.
#[derive(Default)]
pub struct ModuleGraph {
    inner: RwLock<GraphInner>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, deduplicating by identifier.
    ///
    /// Returns the stored instance: the given module if the id was new, the
    /// previously stored one otherwise.
    pub fn add_module(&self, module: Module) -> Result<Arc<Module>> {
        let mut inner = self.inner.write();
        if inner.sealed {
            return Err(GraphError::Sealed("add module"));
        }
        let id = module.id.clone();
        let stored = inner
            .modules
            .entry(id)
            .or_insert_with(|| Arc::new(module));
        Ok(Arc::clone(stored))
    }

    pub fn has_module(&self, id: &ModuleId) -> bool {
        self.inner.read().modules.contains_key(id)
    }

    pub fn module(&self, id: &ModuleId) -> Option<Arc<Module>> {
        self.inner.read().modules.get(id).cloned()
    }

    pub fn module_count(&self) -> usize {
        self.inner.read().modules.len()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// All module ids, sorted by identifier for deterministic iteration.
    pub fn module_ids_sorted(&self) -> Vec<ModuleId> {
        let inner = self.inner.read();
        let mut ids: Vec<ModuleId> = inner.modules.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Record that `(origin, dep_index)` resolved to `module`.
    ///
    /// A second call for the same `(origin, dep_index)` is ignored - a
    /// dependency has at most one resolution.
    pub fn set_resolved_module(
        &self,
        origin: DependencyOrigin,
        dep_index: usize,
        module: ModuleId,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.sealed {
            return Err(GraphError::Sealed("connect dependency"));
        }
        if !inner.modules.contains_key(&module) {
            return Err(GraphError::UnknownModule(module));
        }

        match &origin {
            DependencyOrigin::Module(origin_id) => {
                let Some(origin_module) = inner.modules.get(origin_id) else {
                    return Err(GraphError::UnknownModule(origin_id.clone()));
                };
                if dep_index >= origin_module.dependencies.len() {
                    return Err(GraphError::UnknownDependency {
                        module: origin_id.clone(),
                        index: dep_index,
                    });
                }
                let targets = inner.outgoing.entry(origin_id.clone()).or_default();
                if targets.contains_key(&dep_index) {
                    return Ok(());
                }
                targets.insert(dep_index, module.clone());
                let origin_id = origin_id.clone();
                inner
                    .incoming
                    .entry(module.clone())
                    .or_default()
                    .insert(origin_id);
            }
            DependencyOrigin::Entry(_) => {
                inner.entry_targets.insert(module.clone());
            }
        }

        inner.connections.push(Connection {
            origin,
            dep_index,
            module,
        });
        Ok(())
    }

    /// The module a specific dependency of `origin` resolved to.
    pub fn resolved_module(&self, origin: &ModuleId, dep_index: usize) -> Option<ModuleId> {
        self.inner
            .read()
            .outgoing
            .get(origin)
            .and_then(|targets| targets.get(&dep_index))
            .cloned()
    }

    /// Resolved targets of a module's dependencies, in dependency order.
    ///
    /// Unresolved (failed or ignored) dependencies are skipped.
    pub fn outgoing(&self, origin: &ModuleId) -> Vec<ModuleId> {
        let inner = self.inner.read();
        let Some(targets) = inner.outgoing.get(origin) else {
            return Vec::new();
        };
        let mut by_index: Vec<(usize, ModuleId)> = targets
            .iter()
            .map(|(index, id)| (*index, id.clone()))
            .collect();
        by_index.sort_by_key(|(index, _)| *index);
        by_index.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of distinct modules referencing `target` (entries excluded).
    pub fn incoming_module_count(&self, target: &ModuleId) -> usize {
        self.inner
            .read()
            .incoming
            .get(target)
            .map_or(0, FxHashSet::len)
    }

    /// True when an entry connection points at `target`.
    pub fn is_entry_target(&self, target: &ModuleId) -> bool {
        self.inner.read().entry_targets.contains(target)
    }

    /// Resolved modules of a named entry, in request declaration order.
    pub fn entry_targets_for(&self, entry_name: &str) -> Vec<ModuleId> {
        let inner = self.inner.read();
        let mut targets: Vec<(usize, ModuleId)> = inner
            .connections
            .iter()
            .filter(|c| matches!(&c.origin, DependencyOrigin::Entry(name) if name == entry_name))
            .map(|c| (c.dep_index, c.module.clone()))
            .collect();
        targets.sort_by_key(|(index, _)| *index);
        targets.into_iter().map(|(_, id)| id).collect()
    }

    /// Snapshot of all connections, in insertion order.
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.read().connections.clone()
    }

    /// Freeze the graph. Later mutations fail with [`GraphError::Sealed`].
    pub fn seal(&self) {
        self.inner.write().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.read().sealed
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::dependency::{Dependency, DependencyKind};
    use crate::module::ModuleType;

    fn module_with_deps(id: &str, requests: &[&str]) -> Module {
        let dependencies = requests
            .iter()
            .enumerate()
            .map(|(i, r)| Dependency::new(*r, DependencyKind::CjsRequire, i as u32))
            .collect();
        Module::builder(
            ModuleId::new(id),
            PathBuf::from(id),
            ModuleType::JavascriptAuto,
        )
        .dependencies(dependencies)
        .build()
    }

    #[test]
    fn add_module_deduplicates_by_identifier() {
        let graph = ModuleGraph::new();
        let first = graph.add_module(module_with_deps("/src/a.js", &[])).unwrap();
        let second = graph.add_module(module_with_deps("/src/a.js", &["./b"])).unwrap();

        // Second insert returned the stored instance, not the new one.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(graph.module_count(), 1);
    }

    #[test]
    fn connections_keep_dependency_order() {
        let graph = ModuleGraph::new();
        graph
            .add_module(module_with_deps("/src/a.js", &["./c", "./b"]))
            .unwrap();
        graph.add_module(module_with_deps("/src/b.js", &[])).unwrap();
        graph.add_module(module_with_deps("/src/c.js", &[])).unwrap();

        let a = ModuleId::new("/src/a.js");
        // Resolve out of order; outgoing() must restore dependency order.
        graph
            .set_resolved_module(
                DependencyOrigin::Module(a.clone()),
                1,
                ModuleId::new("/src/b.js"),
            )
            .unwrap();
        graph
            .set_resolved_module(
                DependencyOrigin::Module(a.clone()),
                0,
                ModuleId::new("/src/c.js"),
            )
            .unwrap();

        assert_eq!(
            graph.outgoing(&a),
            vec![ModuleId::new("/src/c.js"), ModuleId::new("/src/b.js")]
        );
    }

    #[test]
    fn duplicate_resolution_is_ignored() {
        let graph = ModuleGraph::new();
        graph
            .add_module(module_with_deps("/src/a.js", &["./b"]))
            .unwrap();
        graph.add_module(module_with_deps("/src/b.js", &[])).unwrap();
        graph.add_module(module_with_deps("/src/c.js", &[])).unwrap();

        let a = ModuleId::new("/src/a.js");
        let origin = DependencyOrigin::Module(a.clone());
        graph
            .set_resolved_module(origin.clone(), 0, ModuleId::new("/src/b.js"))
            .unwrap();
        graph
            .set_resolved_module(origin, 0, ModuleId::new("/src/c.js"))
            .unwrap();

        assert_eq!(graph.outgoing(&a), vec![ModuleId::new("/src/b.js")]);
    }

    #[test]
    fn sealed_graph_rejects_mutation() {
        let graph = ModuleGraph::new();
        graph.add_module(module_with_deps("/src/a.js", &[])).unwrap();
        graph.seal();

        let err = graph
            .add_module(module_with_deps("/src/b.js", &[]))
            .unwrap_err();
        assert!(matches!(err, GraphError::Sealed(_)));
    }

    #[test]
    fn entry_targets_do_not_count_as_incoming_modules() {
        let graph = ModuleGraph::new();
        graph.add_module(module_with_deps("/src/a.js", &[])).unwrap();

        let a = ModuleId::new("/src/a.js");
        graph
            .set_resolved_module(DependencyOrigin::Entry("main".into()), 0, a.clone())
            .unwrap();

        assert!(graph.is_entry_target(&a));
        assert_eq!(graph.incoming_module_count(&a), 0);
    }
}

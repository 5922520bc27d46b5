//! Chunk-level code assembly helpers.
//!
//! Holds the per-compilation codegen result cache, the module-map encoding
//! heuristic and the factory wrapper. The bootstrap itself is rendered by
//! [`crate::runtime_template::RuntimeTemplate`].

use std::sync::Arc;

use knot_graph::{ModuleCodeId, ModuleId, SourceKind};
use rustc_hash::FxHashMap;

use crate::generator::Generated;

/// Cache of generated fragments, one per module per source kind.
///
/// Shared by every chunk render, which is why a module's generated body is
/// byte-identical wherever it appears.
#[derive(Default)]
pub struct CodegenResults {
    map: FxHashMap<(ModuleId, SourceKind), Arc<Generated>>,
}

impl CodegenResults {
    pub fn insert(&mut self, module: ModuleId, kind: SourceKind, generated: Generated) {
        self.map.insert((module, kind), Arc::new(generated));
    }

    pub fn get(&self, module: &ModuleId, kind: SourceKind) -> Option<Arc<Generated>> {
        self.map.get(&(module.clone(), kind)).cloned()
    }

    pub fn contains(&self, module: &ModuleId, kind: SourceKind) -> bool {
        self.map.contains_key(&(module.clone(), kind))
    }
}

/// Module map shape for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleMapEncoding {
    /// `{ id: factory, ... }`
    Object,
    /// `[factory, , factory]` with holes for unused ids.
    Array,
}

fn digit_len(mut n: u32) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// Pick the smaller encoding for a set of module ids.
///
/// Any string id forces the object form. For numeric ids the array pays
/// one hole marker per unused slot while the object pays the key and
/// separator per entry; whichever estimate is smaller wins.
pub fn choose_module_map_encoding(ids: &[ModuleCodeId]) -> ModuleMapEncoding {
    let mut numeric = Vec::with_capacity(ids.len());
    for id in ids {
        match id.as_num() {
            Some(n) => numeric.push(n),
            None => return ModuleMapEncoding::Object,
        }
    }
    let Some(&max) = numeric.iter().max() else {
        return ModuleMapEncoding::Object;
    };

    let array_overhead = (max as usize + 1) - numeric.len();
    let object_overhead: usize = numeric.iter().map(|&n| digit_len(n) + 2).sum();
    if array_overhead < object_overhead {
        ModuleMapEncoding::Array
    } else {
        ModuleMapEncoding::Object
    }
}

/// Wrap a module body in a factory with the minimal parameter list.
///
/// Parameters are positional, so the list keeps everything up to the last
/// one the body needs and drops the rest.
pub fn render_factory(
    body: &str,
    needs_module: bool,
    needs_exports: bool,
    needs_require: bool,
) -> String {
    const PARAMS: [&str; 3] = ["module", "exports", "__knot_require__"];
    let needed = [needs_module, needs_exports, needs_require];
    let params = match needed.iter().rposition(|&n| n) {
        Some(last) => PARAMS[..=last].join(", "),
        None => String::new(),
    };
    format!("(function({params}) {{\n{body}\n}})")
}

/// Render a chunk's module map from `(id, wrapped factory)` pairs.
pub fn render_module_map(factories: &[(ModuleCodeId, String)]) -> String {
    let mut entries: Vec<&(ModuleCodeId, String)> = factories.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let ids: Vec<ModuleCodeId> = entries.iter().map(|(id, _)| id.clone()).collect();
    match choose_module_map_encoding(&ids) {
        ModuleMapEncoding::Object => {
            let body = entries
                .iter()
                .map(|(id, factory)| format!("{}: {}", id.to_js(), factory))
                .collect::<Vec<_>>()
                .join(",\n");
            format!("({{\n{body}\n}})")
        }
        ModuleMapEncoding::Array => {
            let max = entries
                .iter()
                .filter_map(|(id, _)| id.as_num())
                .max()
                .unwrap_or(0);
            let mut slots = vec![String::new(); max as usize + 1];
            for (id, factory) in entries {
                if let Some(n) = id.as_num() {
                    slots[n as usize] = factory.clone();
                }
            }
            format!("([{}])", slots.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn nums(ids: &[u32]) -> Vec<ModuleCodeId> {
        ids.iter().copied().map(ModuleCodeId::Num).collect()
    }

    #[test]
    fn contiguous_numeric_ids_prefer_the_array() {
        assert_eq!(
            choose_module_map_encoding(&nums(&[0, 1, 2, 3])),
            ModuleMapEncoding::Array
        );
    }

    #[test]
    fn sparse_numeric_ids_prefer_the_object() {
        assert_eq!(
            choose_module_map_encoding(&nums(&[0, 500])),
            ModuleMapEncoding::Object
        );
    }

    #[test]
    fn string_ids_force_the_object() {
        let ids = vec![ModuleCodeId::Num(0), ModuleCodeId::Str("./a.js".into())];
        assert_eq!(choose_module_map_encoding(&ids), ModuleMapEncoding::Object);
    }

    #[test]
    fn small_gaps_still_beat_object_keys() {
        // 4 ids over 5 slots: 1 hole vs 12 bytes of object keys.
        assert_eq!(
            choose_module_map_encoding(&nums(&[0, 1, 3, 4])),
            ModuleMapEncoding::Array
        );
    }

    #[test]
    fn factory_params_keep_only_the_needed_prefix() {
        assert_eq!(
            render_factory("x", true, true, true),
            "(function(module, exports, __knot_require__) {\nx\n})"
        );
        assert_eq!(
            render_factory("x", true, false, false),
            "(function(module) {\nx\n})"
        );
        // A require-only factory still needs the positional placeholders.
        assert_eq!(
            render_factory("x", false, false, true),
            "(function(module, exports, __knot_require__) {\nx\n})"
        );
        assert_eq!(render_factory("x", false, false, false), "(function() {\nx\n})");
    }

    #[test]
    fn array_map_renders_holes() {
        let factories = vec![
            (ModuleCodeId::Num(0), "A".to_string()),
            (ModuleCodeId::Num(2), "C".to_string()),
            (ModuleCodeId::Num(1), "B".to_string()),
        ];
        assert_eq!(render_module_map(&factories), "([A, B, C])");
    }

    #[test]
    fn object_map_sorts_by_id() {
        let factories = vec![
            (ModuleCodeId::Str("./b".into()), "B".to_string()),
            (ModuleCodeId::Str("./a".into()), "A".to_string()),
        ];
        assert_eq!(
            render_module_map(&factories),
            "({\n\"./a\": A,\n\"./b\": B\n})"
        );
    }
}

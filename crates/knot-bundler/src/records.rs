//! Id-stability records.
//!
//! A records file is a JSON object keyed by compiler name; under each
//! compiler, `moduleIds` maps module identifiers to their rendered ids and
//! `chunkIds` maps chunk names likewise. Recorded ids are reused on later
//! builds so unchanged inputs keep their ids even when new modules appear.
//! Keys are written sorted, so the file diffs cleanly. Unknown keys are
//! preserved on rewrite.

use std::path::Path;

use knot_graph::ModuleCodeId;
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Records {
    root: Value,
}

impl Records {
    pub fn new() -> Self {
        Self { root: Value::Null }
    }

    /// Read records from disk; a missing file yields empty records.
    pub fn read(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let root: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Records(format!("malformed records file: {e}")))?;
        if !root.is_object() {
            return Err(Error::Records("records file must hold an object".into()));
        }
        Ok(Self { root })
    }

    /// Write records with deterministically sorted keys.
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.root)
            .map_err(|e| Error::Records(format!("cannot serialize records: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn section(&self, compiler: &str, table: &str) -> Option<&serde_json::Map<String, Value>> {
        self.root.get(compiler)?.get(table)?.as_object()
    }

    fn section_mut(&mut self, compiler: &str, table: &str) -> &mut serde_json::Map<String, Value> {
        if !self.root.is_object() {
            self.root = Value::Object(Default::default());
        }
        let root = self.root.as_object_mut().expect("checked above");
        let compiler_entry = root
            .entry(compiler.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if !compiler_entry.is_object() {
            *compiler_entry = Value::Object(Default::default());
        }
        let table_entry = compiler_entry
            .as_object_mut()
            .expect("checked above")
            .entry(table.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if !table_entry.is_object() {
            *table_entry = Value::Object(Default::default());
        }
        table_entry.as_object_mut().expect("checked above")
    }

    pub fn recorded_module_id(&self, compiler: &str, identifier: &str) -> Option<ModuleCodeId> {
        value_to_code_id(self.section(compiler, "moduleIds")?.get(identifier)?)
    }

    pub fn set_module_id(&mut self, compiler: &str, identifier: &str, id: &ModuleCodeId) {
        self.section_mut(compiler, "moduleIds")
            .insert(identifier.to_string(), code_id_to_value(id));
    }

    pub fn recorded_chunk_id(&self, compiler: &str, chunk_name: &str) -> Option<String> {
        let value = self.section(compiler, "chunkIds")?.get(chunk_name)?;
        value.as_str().map(str::to_string)
    }

    pub fn set_chunk_id(&mut self, compiler: &str, chunk_name: &str, id: &str) {
        self.section_mut(compiler, "chunkIds")
            .insert(chunk_name.to_string(), Value::String(id.to_string()));
    }
}

fn value_to_code_id(value: &Value) -> Option<ModuleCodeId> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| ModuleCodeId::Num(n as u32)),
        Value::String(s) => Some(ModuleCodeId::Str(s.clone())),
        _ => None,
    }
}

fn code_id_to_value(id: &ModuleCodeId) -> Value {
    match id {
        ModuleCodeId::Num(n) => Value::Number((*n).into()),
        ModuleCodeId::Str(s) => Value::String(s.clone()),
    }
}

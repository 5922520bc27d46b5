//! Per-module diagnostics collected on a compilation.
//!
//! Infrastructure failures travel through `crate::Error`; everything that
//! concerns a single module lands here so sibling modules keep building.

use std::fmt;

use knot_graph::ModuleId;
use serde::Serialize;

/// Severity of a collected diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A build problem attached to (at most) one module.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Module the problem belongs to, when it got far enough to have one.
    pub module: Option<ModuleId>,
    /// The request that was being processed.
    pub request: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(request: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            module: None,
            request: request.into(),
            message: message.into(),
        }
    }

    pub fn warning(request: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            module: None,
            request: request.into(),
            message: message.into(),
        }
    }

    pub fn for_module(mut self, module: ModuleId) -> Self {
        self.module = Some(module);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}: {}", module, self.message),
            None if !self.request.is_empty() => write!(f, "{}: {}", self.request, self.message),
            None => f.write_str(&self.message),
        }
    }
}

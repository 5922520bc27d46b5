use serde::{Deserialize, Serialize};

/// Byte range in a module's transformed source, end exclusive.
///
/// Recorded by parsers at dependency sites and statement rewrites so the
/// generator can splice replacement text without re-parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementSpan {
    pub start: u32,
    pub end: u32,
}

impl ReplacementSpan {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

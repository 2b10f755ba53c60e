//! Compiled predicate

use std::fmt;

use serde_json::Value;

/// Database-native boolean expression produced by the compiler.
///
/// Holds both the document and its canonical JSON text. Key order follows
/// construction order, so equal inputs render byte-identical text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    text: String,
    document: Value,
}

impl CompiledPredicate {
    /// Wrap a predicate document
    pub fn new(document: Value) -> Self {
        Self {
            text: document.to_string(),
            document,
        }
    }

    /// Canonical JSON text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Predicate document
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Consume into the predicate document
    pub fn into_document(self) -> Value {
        self.document
    }
}

impl fmt::Display for CompiledPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

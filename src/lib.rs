//! Language server backend for the PEARL real-time language.
//!
//! The core is a single-pass lexer with an integrated preprocessor
//! (`lexer`) feeding a scope-stack semantic analyzer (`analysis`). One
//! analysis result per document version backs diagnostics, hover,
//! go-to-definition, folding and semantic tokens; the `server` module wires
//! it all into tower-lsp.

pub mod analysis;
pub mod builtins;
pub mod client;
pub mod diagnostics;
pub mod folding;
pub mod hover;
pub mod include;
pub mod keywords;
pub mod lexer;
pub mod semantic_tokens;
pub mod server;
pub mod token;

use std::collections::HashMap;

pub use include::IncludeCache;
pub use lexer::{IncludeMode, LexConfig};

/// Configuration shared across handlers.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Macro names/values seeded into the preprocessor before lexing.
    pub defines: HashMap<String, String>,
    /// How `#include` paths are resolved.
    pub include_mode: IncludeMode,
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for `ServerConfig` with fluent API.
#[derive(Default)]
pub struct ServerConfigBuilder {
    defines: HashMap<String, String>,
    include_mode: Option<IncludeMode>,
}

impl ServerConfigBuilder {
    /// Predefine one preprocessor macro.
    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    /// Set how `#include` paths are resolved.
    pub fn include_mode(mut self, mode: IncludeMode) -> Self {
        self.include_mode = Some(mode);
        self
    }

    pub fn build(self) -> ServerConfig {
        ServerConfig {
            defines: self.defines,
            include_mode: self.include_mode.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_default_config() {
        let built = ServerConfig::builder().build();
        assert!(built.defines.is_empty());
        assert_eq!(built.include_mode, IncludeMode::FileRelative);
    }

    #[test]
    fn builder_sets_defines_and_mode() {
        let built = ServerConfig::builder()
            .define("DEBUG", "1")
            .include_mode(IncludeMode::WorkspaceRelative)
            .build();
        assert_eq!(built.defines.get("DEBUG").map(String::as_str), Some("1"));
        assert_eq!(built.include_mode, IncludeMode::WorkspaceRelative);
    }
}

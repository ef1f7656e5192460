//! Compiler configuration.
//!
//! `CompilerConfig` is the in-process analogue of the CLI flags: the CLI
//! parses `argv` into one of these, and library consumers who'd rather skip
//! argument parsing can build one directly.
//!
//! ```
//! use toyc::CompilerConfig;
//!
//! let config = CompilerConfig::new()
//!     .with_macro("DEBUG", Some("1"))
//!     .with_include_path("/usr/local/include");
//! ```

use crate::backend::OutputKind;
use std::path::PathBuf;

/// Configuration for one compilation.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// `-D NAME[=VALUE]`, in the order given; a bare `-D NAME` predefines it
    /// as `1`.
    pub predefined_macros: Vec<(String, Option<String>)>,
    /// `-I <path>`, searched in the order given for `#include "..."` and
    /// `#include <...>` alike.
    pub include_paths: Vec<PathBuf>,
    /// Whether to emit textual IR (`-l`) or compile through to a linked
    /// executable (the default).
    pub output_kind: OutputKind,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            predefined_macros: Vec::new(),
            include_paths: Vec::new(),
            output_kind: OutputKind::Executable,
        }
    }
}

impl CompilerConfig {
    /// An empty configuration: no predefined macros, no extra include
    /// paths, compiling to an executable.
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Predefines a macro (builder pattern), as if from `-D NAME[=VALUE]`.
    pub fn with_macro(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.predefined_macros
            .push((name.into(), value.map(str::to_string)));
        self
    }

    /// Adds an include search path (builder pattern), as if from `-I`.
    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    /// Sets whether to emit textual IR instead of a linked executable.
    pub fn with_output_kind(mut self, kind: OutputKind) -> Self {
        self.output_kind = kind;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_an_executable() {
        let config = CompilerConfig::new();
        assert!(config.predefined_macros.is_empty());
        assert!(config.include_paths.is_empty());
        assert_eq!(config.output_kind, OutputKind::Executable);
    }

    #[test]
    fn builder_accumulates_macros_and_include_paths() {
        let config = CompilerConfig::new()
            .with_macro("DEBUG", Some("1"))
            .with_macro("RELEASE", None)
            .with_include_path("/usr/local/include")
            .with_output_kind(OutputKind::TextualIr);

        assert_eq!(
            config.predefined_macros,
            vec![
                ("DEBUG".to_string(), Some("1".to_string())),
                ("RELEASE".to_string(), None),
            ]
        );
        assert_eq!(
            config.include_paths,
            vec![PathBuf::from("/usr/local/include")]
        );
        assert_eq!(config.output_kind, OutputKind::TextualIr);
    }
}
